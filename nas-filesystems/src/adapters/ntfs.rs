// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use nas_contracts::{CommandOutput, FilesystemAdapter, HostTools, OperationContext, Result};
use nas_types::{
    CheckOptions, CheckResult, FilesystemState, FilesystemSupport, FormatOptions,
    FsMagicSignature, MountFlag,
};

use crate::base::{Capability, ToolSet, label_args, run_tool, run_tool_checked};
use crate::flags::{ownership_flags, switch};

const TOOLS: ToolSet = ToolSet {
    name: "ntfs",
    description: "NTFS Filesystem",
    // in-kernel ntfs3 driver
    linux_module: "ntfs3",
    package: "ntfs-3g-progs",
    mkfs: "mkfs.ntfs",
    fsck: "ntfsfix",
    label: "ntfslabel",
    state: "ntfsfix",
};

pub struct NtfsAdapter {
    host: Arc<dyn HostTools>,
    signatures: Vec<FsMagicSignature>,
}

impl NtfsAdapter {
    pub fn new(host: Arc<dyn HostTools>) -> Self {
        Self {
            host,
            signatures: vec![FsMagicSignature::new(3, b"NTFS    ")],
        }
    }
}

/// ntfsfix exits 0 whether or not it repaired something; the output tells
fn ntfsfix_result(output: &CommandOutput) -> CheckResult {
    let text = output.combined();
    let lower = text.to_ascii_lowercase();
    let (success, errors_found, errors_fixed) = if output.success() {
        let repaired = lower.contains("repaired") || lower.contains("fixed");
        (true, repaired, repaired)
    } else {
        (false, true, false)
    };
    CheckResult {
        success,
        errors_found,
        errors_fixed,
        exit_code: output.exit_code,
        message: text,
    }
}

#[async_trait]
impl FilesystemAdapter for NtfsAdapter {
    fn name(&self) -> &str {
        TOOLS.name
    }

    fn description(&self) -> &str {
        TOOLS.description
    }

    fn linux_fs_module(&self) -> &str {
        TOOLS.linux_module
    }

    fn mount_flags(&self) -> Vec<MountFlag> {
        let mut flags = ownership_flags();
        flags.extend([
            switch("permissions", "Respect NTFS permissions"),
            switch("acl", "Enable POSIX Access Control Lists support"),
            switch("exec", "Allow executing files"),
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
        // Quick format; a full zeroing pass takes hours on large disks
        let mut args = vec!["-Q".to_string()];
        if options.force {
            args.push("-F".to_string());
        }
        args.extend(label_args("-L", &options.label));
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
        let mut args = Vec::new();
        if !options.auto_fix {
            args.push("-n".to_string());
        }
        args.push(device.to_string());

        let output = run_tool(self.host.as_ref(), ctx, device, tool, args).await?;
        Ok(ntfsfix_result(&output))
    }

    async fn get_label(&self, ctx: &OperationContext, device: &str) -> Result<String> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::Label)?;
        let output =
            run_tool_checked(self.host.as_ref(), ctx, device, tool, vec![device.to_string()])
                .await?;
        Ok(output.stdout.trim().to_string())
    }

    async fn set_label(&self, ctx: &OperationContext, device: &str, label: &str) -> Result<()> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::Label)?;
        let args = vec![device.to_string(), label.to_string()];
        run_tool_checked(self.host.as_ref(), ctx, device, tool, args).await?;
        Ok(())
    }

    async fn get_state(&self, ctx: &OperationContext, device: &str) -> Result<FilesystemState> {
        if self.host.is_device_mounted(device).await? {
            // ntfsfix refuses to inspect a mounted volume
            return Ok(FilesystemState {
                is_mounted: true,
                state_description: "Mounted (state cannot be determined)".to_string(),
                ..Default::default()
            });
        }

        let tool = TOOLS.require(self.host.as_ref(), Capability::State)?;
        let args = vec!["-n".to_string(), device.to_string()];
        let output = run_tool(self.host.as_ref(), ctx, device, tool, args).await?;
        let text = output.combined();
        let mentions_error = text.to_ascii_lowercase().contains("error");

        let mut state = FilesystemState {
            is_clean: output.success() && !mentions_error,
            has_errors: !output.success() || mentions_error,
            ..Default::default()
        };
        state.state_description = if state.is_clean {
            "Clean".to_string()
        } else {
            "Has errors or inconsistencies".to_string()
        };
        state.additional_info.insert("ntfsfix_output".into(), text);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::testing::FakeHost;

    #[test]
    fn repaired_output_counts_as_fixed() {
        let output = CommandOutput {
            exit_code: 0,
            stdout: "Checking the alternate boot sector... OK\nNTFS partition was processed successfully. Volume repaired.".into(),
            stderr: String::new(),
        };
        let result = ntfsfix_result(&output);
        assert!(result.success && result.errors_found && result.errors_fixed);
    }

    #[tokio::test]
    async fn probe_checks_ntfs3_module() {
        let host = Arc::new(FakeHost::with_tools("ntfs", &["mkfs.ntfs", "ntfsfix", "ntfslabel"]));
        let ntfs = NtfsAdapter::new(host);
        let support = ntfs
            .is_supported(&OperationContext::new())
            .await
            .expect("probe");
        assert!(!support.can_mount);
        assert!(!support.can_format);
    }

    #[tokio::test]
    async fn mounted_volume_skips_ntfsfix() {
        let mut fake = FakeHost::with_tools("ntfs3", &["ntfsfix"]);
        fake.mounted.insert("/dev/sdd1".into());
        let host = Arc::new(fake);
        let ntfs = NtfsAdapter::new(host.clone());
        let state = ntfs
            .get_state(&OperationContext::new(), "/dev/sdd1")
            .await
            .expect("state");
        assert!(state.is_mounted);
        assert!(host.calls().is_empty());
    }
}
