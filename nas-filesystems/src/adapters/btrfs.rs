// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use nas_contracts::{FilesystemAdapter, HostTools, OperationContext, Result};
use nas_types::{
    CheckOptions, CheckResult, FilesystemState, FilesystemSupport, FormatOptions,
    FsMagicSignature, MountFlag,
};
use tracing::debug;

use crate::base::{Capability, ToolSet, label_args, run_tool, run_tool_checked};
use crate::flags::{switch, valued};

const TOOLS: ToolSet = ToolSet {
    name: "btrfs",
    description: "BTRFS Filesystem",
    linux_module: "btrfs",
    package: "btrfs-progs",
    mkfs: "mkfs.btrfs",
    fsck: "btrfs",
    label: "btrfs",
    state: "btrfs",
};

pub struct BtrfsAdapter {
    host: Arc<dyn HostTools>,
    signatures: Vec<FsMagicSignature>,
}

impl BtrfsAdapter {
    pub fn new(host: Arc<dyn HostTools>) -> Self {
        Self {
            host,
            // superblock at 64 KiB, magic at +0x40
            signatures: vec![FsMagicSignature::new(0x10040, b"_BHRfS_M")],
        }
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Label from `btrfs filesystem show` ("Label: 'data'  uuid: ...", or "Label: none")
fn parse_show_label(output: &str) -> String {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Label:"))
        .and_then(|rest| rest.split("uuid:").next())
        .map(str::trim)
        .filter(|value| *value != "none")
        .map(|value| value.trim_matches('\'').to_string())
        .unwrap_or_default()
}

/// Sum of the error counters printed by `btrfs device stats`
fn stats_error_count(output: &str) -> u64 {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .filter_map(|count| count.parse::<u64>().ok())
        .sum()
}

#[async_trait]
impl FilesystemAdapter for BtrfsAdapter {
    fn name(&self) -> &str {
        TOOLS.name
    }

    fn description(&self) -> &str {
        TOOLS.description
    }

    fn mount_flags(&self) -> Vec<MountFlag> {
        vec![
            valued(
                "compress",
                "Enable compression",
                "One of: zlib, lzo, zstd, or none",
                "^(zlib|lzo|zstd|none)$",
            ),
            valued(
                "compress-force",
                "Force compression on all files",
                "One of: zlib, lzo, zstd",
                "^(zlib|lzo|zstd)$",
            ),
            switch("autodefrag", "Enable automatic defragmentation"),
            switch("discard", "Enable discard/TRIM support"),
            switch("ssd", "Enable SSD-specific optimizations"),
            switch("nossd", "Disable SSD-specific optimizations"),
            valued("space_cache", "Enable space cache", "One of: v1, v2", "^(v1|v2)$"),
            valued(
                "subvol",
                "Mount specific subvolume",
                "Subvolume path",
                "^[a-zA-Z0-9/_-]+$",
            ),
            valued(
                "subvolid",
                "Mount specific subvolume by ID",
                "Subvolume ID (numeric)",
                "^[0-9]+$",
            ),
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
        let mut cmd = Vec::new();
        if options.force {
            cmd.push("-f".to_string());
        }
        cmd.extend(label_args("-L", &options.label));
        cmd.extend(options.additional_options.iter().cloned());
        cmd.push(device.to_string());

        run_tool_checked(self.host.as_ref(), ctx, device, tool, cmd).await?;
        Ok(())
    }

    async fn check(
        &self,
        ctx: &OperationContext,
        device: &str,
        options: &CheckOptions,
    ) -> Result<CheckResult> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::Check)?;
        let mut cmd = args(&[
            "check",
            if options.auto_fix { "--repair" } else { "--readonly" },
        ]);
        if options.force {
            cmd.push("--force".to_string());
        }
        cmd.push(device.to_string());

        let output = run_tool(self.host.as_ref(), ctx, device, tool, cmd).await?;
        let message = output.combined();
        let result = if output.success() {
            let errors_found = message.to_ascii_lowercase().contains("error");
            CheckResult {
                success: true,
                errors_found,
                errors_fixed: errors_found && options.auto_fix,
                exit_code: output.exit_code,
                message,
            }
        } else {
            CheckResult {
                success: false,
                errors_found: true,
                errors_fixed: false,
                exit_code: output.exit_code,
                message,
            }
        };
        Ok(result)
    }

    async fn get_label(&self, ctx: &OperationContext, device: &str) -> Result<String> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::Label)?;
        let cmd = args(&["filesystem", "show", device]);
        let output = run_tool_checked(self.host.as_ref(), ctx, device, tool, cmd).await?;
        Ok(parse_show_label(&output.stdout))
    }

    async fn set_label(&self, ctx: &OperationContext, device: &str, label: &str) -> Result<()> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::Label)?;
        let cmd = args(&["filesystem", "label", device, label]);
        run_tool_checked(self.host.as_ref(), ctx, device, tool, cmd).await?;
        Ok(())
    }

    async fn get_state(&self, ctx: &OperationContext, device: &str) -> Result<FilesystemState> {
        let tool = TOOLS.require(self.host.as_ref(), Capability::State)?;
        let host = self.host.as_ref();
        let mut state = FilesystemState::default();

        let stats = run_tool(host, ctx, device, tool, args(&["device", "stats", device])).await;
        match stats {
            Ok(output) if output.success() => {
                let errors = stats_error_count(&output.stdout);
                state.has_errors = errors > 0;
                state.is_clean = errors == 0;
                state.additional_info.insert("device_stats".into(), output.stdout);
            }
            other => {
                // stats need a mounted filesystem; fall back to an offline check
                if let Err(e) = &other {
                    debug!(device, error = %e, "btrfs device stats unavailable");
                }
                let output = run_tool(
                    host,
                    ctx,
                    device,
                    tool,
                    args(&["check", "--readonly", device]),
                )
                .await?;
                state.is_clean = output.success();
                state.has_errors = !output.success();
                state
                    .additional_info
                    .insert("check_output".into(), output.combined());
            }
        }

        state.state_description = if state.is_clean {
            "Clean".to_string()
        } else {
            "Has errors or inconsistencies".to_string()
        };
        state.is_mounted = host.is_device_mounted(device).await?;
        Ok(state)
    }
}
