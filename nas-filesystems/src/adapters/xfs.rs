// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use nas_contracts::{FilesystemAdapter, HostTools, OperationContext, Result};
use nas_types::{
    CheckOptions, CheckResult, FilesystemState, FilesystemSupport, FormatOptions,
    FsMagicSignature, MountFlag,
};

use crate::base::{Capability, ToolSet, label_args, run_tool, run_tool_checked};
use crate::flags::{switch, valued};

const TOOLS: ToolSet = ToolSet {
    name: "xfs",
    description: "XFS Filesystem",
    linux_module: "xfs",
    package: "xfsprogs-extra",
    mkfs: "mkfs.xfs",
    fsck: "xfs_repair",
    label: "xfs_admin",
    state: "xfs_repair",
};

pub struct XfsAdapter {
    host: Arc<dyn HostTools>,
    signatures: Vec<FsMagicSignature>,
}

impl XfsAdapter {
    pub fn new(host: Arc<dyn HostTools>) -> Self {
        Self {
            host,
            signatures: vec![FsMagicSignature::new(0, b"XFSB")],
        }
    }
}

/// `label = "data"` from `xfs_admin -l`
fn parse_admin_label(output: &str) -> String {
    output
        .lines()
        .find(|line| line.contains("label = "))
        .and_then(|line| line.split_once('='))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .unwrap_or_default()
}

#[async_trait]
impl FilesystemAdapter for XfsAdapter {
    fn name(&self) -> &str {
        TOOLS.name
    }

    fn description(&self) -> &str {
        TOOLS.description
    }

    fn mount_flags(&self) -> Vec<MountFlag> {
        vec![
            switch("inode64", "Enable 64-bit inode allocation for large filesystems"),
            switch("noquota", "Disable quota enforcement"),
            switch("usrquota", "Enable user quota enforcement"),
            switch("grpquota", "Enable group quota enforcement"),
            switch("prjquota", "Enable project quota enforcement"),
            switch("discard", "Enable discard/TRIM support"),
            switch("nouuid", "Ignore filesystem UUID to allow mounting duplicates"),
            valued(
                "allocsize",
                "Set preferred allocation size",
                "Size in bytes optionally with K, M, or G suffix (e.g., 1G)",
                "^[0-9]+([kKmMgG])?$",
            ),
            valued(
                "sunit",
                "Set stripe unit size (in 512-byte blocks)",
                "Stripe unit in 512-byte blocks",
                "^[0-9]+$",
            ),
            valued(
                "swidth",
                "Set stripe width size (in 512-byte blocks)",
                "Stripe width in 512-byte blocks",
                "^[0-9]+$",
            ),
            valued("logbufs", "Number of log buffers", "Integer between 2 and 8", "^[2-8]$"),
        ]
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
        let mut args = Vec::new();
        if options.force {
            args.push("-f".to_string());
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
        if options.verbose {
            args.push("-v".to_string());
        }
        args.push(device.to_string());

        let output = run_tool(self.host.as_ref(), ctx, device, tool, args).await?;
        // 0 clean, 1 errors found (fixed unless -n), 2 dirty log needs a mount first
        let (success, errors_found, errors_fixed) = match output.exit_code {
            0 => (true, false, false),
            1 => (true, true, options.auto_fix),
            _ => (false, true, false),
        };
        Ok(CheckResult {
            success,
            errors_found,
            errors_fixed,
            exit_code: output.exit_code,
            message: output.combined(),
        })
    }

    async fn get_label(&self, ctx: &OperationContext, device: &str) -> Result<String> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::Label)?;
        let args = vec!["-l".to_string(), device.to_string()];
        let output = run_tool_checked(self.host.as_ref(), ctx, device, tool, args).await?;
        Ok(parse_admin_label(&output.stdout))
    }

    async fn set_label(&self, ctx: &OperationContext, device: &str, label: &str) -> Result<()> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::Label)?;
        let args = vec!["-L".to_string(), label.to_string(), device.to_string()];
        run_tool_checked(self.host.as_ref(), ctx, device, tool, args).await?;
        Ok(())
    }

    async fn get_state(&self, ctx: &OperationContext, device: &str) -> Result<FilesystemState> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::State)?;
        let args = vec!["-n".to_string(), device.to_string()];
        let output = run_tool(self.host.as_ref(), ctx, device, tool, args).await?;

        let mut state = FilesystemState {
            is_clean: output.success(),
            has_errors: !output.success(),
            state_description: match output.exit_code {
                0 => "Clean",
                1 => "Has correctable errors",
                _ => "Has errors",
            }
            .to_string(),
            ..Default::default()
        };
        state.is_mounted = self.host.is_device_mounted(device).await?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::testing::FakeHost;

    #[test]
    fn parses_admin_label() {
        assert_eq!(parse_admin_label("label = \"archive\"\n"), "archive");
        assert_eq!(parse_admin_label("label = \"\"\n"), "");
        assert_eq!(parse_admin_label(""), "");
    }

    #[tokio::test]
    async fn repair_exit_one_is_fixed_only_with_autofix() {
        let host = Arc::new(FakeHost::with_tools("xfs", &["xfs_repair"]));
        host.respond("xfs_repair", 1, "would fix inode");
        let xfs = XfsAdapter::new(host.clone());
        let ctx = OperationContext::new();

        let dry = xfs
            .check(&ctx, "/dev/sdf1", &CheckOptions::default())
            .await
            .expect("dry run");
        assert!(dry.success && dry.errors_found && !dry.errors_fixed);

        let fix = CheckOptions {
            auto_fix: true,
            ..Default::default()
        };
        let fixed = xfs.check(&ctx, "/dev/sdf1", &fix).await.expect("repair");
        assert!(fixed.errors_fixed);
        assert_eq!(host.calls()[1].1, vec!["/dev/sdf1"]);
    }
}
