// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use nas_contracts::{FilesystemAdapter, HostTools, OperationContext, Result};
use nas_types::{
    CheckOptions, CheckResult, FilesystemState, FilesystemSupport, FormatOptions,
    FsMagicSignature, MountFlag,
};

use crate::base::{
    Capability, ToolSet, field_value, fsck_check_result, label_args, run_tool, run_tool_checked,
};
use crate::flags::{switch, valued};

const TOOLS: ToolSet = ToolSet {
    name: "ext4",
    description: "EXT4 Filesystem",
    linux_module: "ext4",
    package: "e2fsprogs",
    mkfs: "mkfs.ext4",
    fsck: "fsck.ext4",
    label: "tune2fs",
    state: "tune2fs",
};

pub struct Ext4Adapter {
    host: Arc<dyn HostTools>,
    signatures: Vec<FsMagicSignature>,
}

impl Ext4Adapter {
    pub fn new(host: Arc<dyn HostTools>) -> Self {
        Self {
            host,
            // ext2/3/4 superblock magic 0xEF53, little-endian
            signatures: vec![FsMagicSignature::new(1080, &[0x53, 0xEF])],
        }
    }

    async fn superblock(&self, ctx: &OperationContext, device: &str) -> Result<String> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::State)?;
        let args = vec!["-l".to_string(), device.to_string()];
        let output = run_tool_checked(self.host.as_ref(), ctx, device, tool, args).await?;
        Ok(output.stdout)
    }
}

fn parse_volume_name(superblock: &str) -> String {
    match field_value(superblock, "Filesystem volume name:") {
        Some("<none>") | None => String::new(),
        Some(name) => name.to_string(),
    }
}

fn parse_state(superblock: &str) -> FilesystemState {
    let mut state = FilesystemState::default();
    if let Some(raw) = field_value(superblock, "Filesystem state:") {
        let lower = raw.to_ascii_lowercase();
        // tune2fs reports "clean", "not clean", "clean with errors", ...
        state.is_clean = lower.starts_with("clean");
        state.has_errors = lower.contains("error");
        state.state_description = raw.to_string();
    }
    if let Some(count) = field_value(superblock, "Mount count:") {
        state
            .additional_info
            .insert("mount_count".into(), count.to_string());
    }
    if let Some(max) = field_value(superblock, "Maximum mount count:") {
        state
            .additional_info
            .insert("max_mount_count".into(), max.to_string());
    }
    if state.state_description.is_empty() {
        state.state_description = "Unknown".to_string();
    }
    state
}

#[async_trait]
impl FilesystemAdapter for Ext4Adapter {
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
        vec![
            valued(
                "data",
                "Data journaling mode (ordered, writeback, journal)",
                "One of: journal, ordered, writeback",
                "^(journal|ordered|writeback)$",
            ),
            valued(
                "errors",
                "Behavior on error (remount-ro, continue, panic)",
                "One of: continue, remount-ro, panic",
                "^(continue|remount-ro|panic)$",
            ),
            switch("discard", "Enable discard/TRIM support"),
            valued("barrier", "Enable/disable write barriers", "0 or 1", "^[01]$"),
            switch("noauto_da_alloc", "Disable delayed allocation heuristics on rename/truncate"),
            switch("journal_checksum", "Enable journal checksumming"),
            switch("journal_async_commit", "Commit data blocks asynchronously"),
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
        let mut args = vec![if options.auto_fix { "-y" } else { "-n" }.to_string()];
        if options.force {
            args.push("-f".to_string());
        }
        if options.verbose {
            args.push("-v".to_string());
        }
        args.push(device.to_string());

        let output = run_tool(self.host.as_ref(), ctx, device, tool, args).await?;
        Ok(fsck_check_result(&output))
    }

    async fn get_label(&self, ctx: &OperationContext, device: &str) -> Result<String> {
        let superblock = self.superblock(ctx, device).await?;
        Ok(parse_volume_name(&superblock))
    }

    async fn set_label(&self, ctx: &OperationContext, device: &str, label: &str) -> Result<()> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::Label)?;
        let args = vec!["-L".to_string(), label.to_string(), device.to_string()];
        run_tool_checked(self.host.as_ref(), ctx, device, tool, args).await?;
        Ok(())
    }

    async fn get_state(&self, ctx: &OperationContext, device: &str) -> Result<FilesystemState> {
        let superblock = self.superblock(ctx, device).await?;
        let mut state = parse_state(&superblock);
        state.is_mounted = self.host.is_device_mounted(device).await?;
        Ok(state)
    }
}
