// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use nas_contracts::{CommandOutput, FilesystemAdapter, HostTools, OperationContext, Result};
use nas_types::{
    CheckOptions, CheckResult, FilesystemState, FilesystemSupport, FormatOptions,
    FsMagicSignature, MountFlag,
};

use crate::base::{Capability, ToolSet, label_args, run_tool, run_tool_checked};
use crate::flags::{ownership_flags, valued};

const TOOLS: ToolSet = ToolSet {
    name: "exfat",
    description: "Extended File Allocation Table",
    linux_module: "exfat",
    package: "exfatprogs",
    mkfs: "mkfs.exfat",
    fsck: "fsck.exfat",
    label: "exfatlabel",
    state: "fsck.exfat",
};

pub struct ExfatAdapter {
    host: Arc<dyn HostTools>,
    signatures: Vec<FsMagicSignature>,
}

impl ExfatAdapter {
    pub fn new(host: Arc<dyn HostTools>) -> Self {
        Self {
            host,
            signatures: vec![FsMagicSignature::new(3, b"EXFAT   ")],
        }
    }
}

// fsck.exfat: 0 clean, 1 corrected, 4 left uncorrected
fn exfat_check_result(output: &CommandOutput) -> CheckResult {
    let (success, errors_found, errors_fixed) = match output.exit_code {
        0 => (true, false, false),
        1 => (true, true, true),
        _ => (false, true, false),
    };
    CheckResult {
        success,
        errors_found,
        errors_fixed,
        exit_code: output.exit_code,
        message: output.combined(),
    }
}

#[async_trait]
impl FilesystemAdapter for ExfatAdapter {
    fn name(&self) -> &str {
        TOOLS.name
    }

    fn description(&self) -> &str {
        TOOLS.description
    }

    fn mount_flags(&self) -> Vec<MountFlag> {
        let mut flags = ownership_flags();
        flags.extend([
            valued(
                "umask",
                "Set umask (octal)",
                "Octal permission mask (e.g., 0022)",
                "^[0-7]{3,4}$",
            ),
            valued(
                "iocharset",
                "I/O character set (e.g., utf8)",
                "Character set name (e.g., utf8)",
                "^[a-zA-Z0-9_-]+$",
            ),
        ]);
        flags
    }

    fn signatures(&self) -> &[FsMagicSignature] {
        &self.signatures
    }

    async fn is_supported(&self, _ctx: &OperationContext) -> Result<FilesystemSupport> {
        Ok(TOOLS.probe(self.host.as_ref()).await)
    }

    async fn format(
        &self,
        ctx: &OperationContext,
        device: &str,
        options: &FormatOptions,
    ) -> Result<()> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::Format)?;
        let mut args = label_args("-n", &options.label);
        args.extend(options.additional_options.iter().cloned());
        args.push(device.to_string());

        run_tool_checked(self.host.as_ref(), ctx, device, tool, args).await?;
        Ok(())
    }

    async fn check(
        &self,
        ctx: &OperationContext,
        device: &str,
        options: &CheckOptions,
    ) -> Result<CheckResult> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::Check)?;
        let mut args = vec![if options.auto_fix { "-y" } else { "-n" }.to_string()];
        if options.verbose {
            args.push("-v".to_string());
        }
        args.push(device.to_string());

        let output = run_tool(self.host.as_ref(), ctx, device, tool, args).await?;
        Ok(exfat_check_result(&output))
    }

    async fn get_label(&self, ctx: &OperationContext, device: &str) -> Result<String> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::Label)?;
        let output =
            run_tool_checked(self.host.as_ref(), ctx, device, tool, vec![device.to_string()])
                .await?;
        let label = output.stdout.trim();
        // exfatlabel prints "label: NAME" on newer releases
        Ok(label
            .strip_prefix("label:")
            .map(str::trim)
            .unwrap_or(label)
            .to_string())
    }

    async fn set_label(&self, ctx: &OperationContext, device: &str, label: &str) -> Result<()> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::Label)?;
        let args = vec![device.to_string(), label.to_string()];
        run_tool_checked(self.host.as_ref(), ctx, device, tool, args).await?;
        Ok(())
    }

    async fn get_state(&self, ctx: &OperationContext, device: &str) -> Result<FilesystemState> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::State)?;
        let args = vec!["-n".to_string(), device.to_string()];
        let output = run_tool(self.host.as_ref(), ctx, device, tool, args).await?;

        let (is_clean, has_errors, description) = match output.exit_code {
            0 => (true, false, "Clean"),
            1 | 4 => (false, true, "Has errors"),
            _ => (false, false, "Unknown"),
        };
        let mut state = FilesystemState {
            is_clean,
            has_errors,
            state_description: description.to_string(),
            ..Default::default()
        };
        state
            .additional_info
            .insert("fsck_output".into(), output.combined());
        state.is_mounted = self.host.is_device_mounted(device).await?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::testing::FakeHost;

    #[test]
    fn exit_four_is_uncorrected() {
        let out = CommandOutput {
            exit_code: 4,
            ..Default::default()
        };
        let result = exfat_check_result(&out);
        assert!(!result.success && result.errors_found && !result.errors_fixed);
    }

    #[tokio::test]
    async fn label_strips_prefix() {
        let host = Arc::new(FakeHost::with_tools("exfat", &["exfatlabel"]));
        host.respond("exfatlabel", 0, "label: CAMERA\n");
        let exfat = ExfatAdapter::new(host);
        let label = exfat
            .get_label(&OperationContext::new(), "/dev/sdg1")
            .await
            .expect("label");
        assert_eq!(label, "CAMERA");
    }

    #[tokio::test]
    async fn unknown_exit_is_unknown_state() {
        let host = Arc::new(FakeHost::with_tools("exfat", &["fsck.exfat"]));
        host.respond("fsck.exfat", 8, "");
        let exfat = ExfatAdapter::new(host);
        let state = exfat
            .get_state(&OperationContext::new(), "/dev/sdg1")
            .await
            .expect("state");
        assert_eq!(state.state_description, "Unknown");
        assert!(!state.is_clean && !state.has_errors);
    }
}
