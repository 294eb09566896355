// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use nas_contracts::{FilesystemAdapter, HostTools, OperationContext, Result};
use nas_types::{
    CheckOptions, CheckResult, FilesystemState, FilesystemSupport, FormatOptions,
    FsMagicSignature, MountFlag,
};

use crate::base::{
    Capability, ToolSet, fsck_check_result, label_args, run_tool, run_tool_checked,
};
use crate::flags::{ownership_flags, valued};

const TOOLS: ToolSet = ToolSet {
    name: "vfat",
    description: "FAT32 Filesystem",
    linux_module: "vfat",
    package: "dosfstools",
    mkfs: "mkfs.vfat",
    fsck: "fsck.vfat",
    label: "fatlabel",
    state: "fsck.vfat",
};

pub struct VfatAdapter {
    host: Arc<dyn HostTools>,
    signatures: Vec<FsMagicSignature>,
}

impl VfatAdapter {
    pub fn new(host: Arc<dyn HostTools>) -> Self {
        Self {
            host,
            signatures: vec![
                FsMagicSignature::new(82, b"FAT32   "),
                FsMagicSignature::new(54, b"FAT16   "),
                FsMagicSignature::new(54, b"FAT12   "),
            ],
        }
    }
}

#[async_trait]
impl FilesystemAdapter for VfatAdapter {
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
                "Set umask (octal), overrides fmask/dmask",
                "Octal permission mask (e.g., 0022)",
                "^[0-7]{3,4}$",
            ),
            valued(
                "iocharset",
                "I/O character set (e.g., utf8)",
                "Character set name (e.g., utf8)",
                "^[a-zA-Z0-9_-]+$",
            ),
            valued(
                "codepage",
                "Codepage for short filenames (e.g., 437)",
                "Codepage number (e.g., 437)",
                "^[0-9]+$",
            ),
            valued(
                "shortname",
                "Shortname case (lower, win95, winnt, mixed)",
                "One of: lower, win95, winnt, mixed",
                "^(lower|win95|winnt|mixed)$",
            ),
            valued(
                "errors",
                "Behavior on error (remount-ro, continue, panic)",
                "One of: continue, remount-ro, panic",
                "^(continue|remount-ro|panic)$",
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
        // mkfs.vfat overwrites unconditionally; `force` has nothing to map to
        let mut args = vec!["-F".to_string(), "32".to_string()];
        args.extend(label_args("-n", &options.label));
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
        let mut args = vec![if options.auto_fix { "-a" } else { "-n" }.to_string()];
        if options.verbose {
            args.push("-v".to_string());
        }
        args.push(device.to_string());

        let output = run_tool(self.host.as_ref(), ctx, device, tool, args).await?;
        Ok(fsck_check_result(&output))
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
        let tool = TOOLS.require(self.host.as_ref(), Capability::State)?;
        let args = vec!["-n".to_string(), device.to_string()];
        let output = run_tool(self.host.as_ref(), ctx, device, tool, args).await?;

        let clean = output.success();
        let mut state = FilesystemState {
            is_clean: clean,
            has_errors: !clean,
            state_description: if clean { "Clean" } else { "Has errors" }.to_string(),
            ..Default::default()
        };
        state
            .additional_info
            .insert("fsck_output".into(), output.combined());
        state.is_mounted = self.host.is_device_mounted(device).await?;
        Ok(state)
    }
}
