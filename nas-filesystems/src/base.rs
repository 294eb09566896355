// SPDX-License-Identifier: GPL-3.0-only

//! Shared plumbing for the per-type adapters

use nas_contracts::{CommandOutput, HostTools, OperationContext, Result, StorageError};
use nas_types::{CheckResult, FilesystemSupport};
use tracing::{debug, warn};

/// An operation gated on a host capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Mount,
    Format,
    Check,
    Label,
    State,
}

impl Capability {
    pub fn operation(self) -> &'static str {
        match self {
            Self::Mount => "mount",
            Self::Format => "format",
            Self::Check => "check",
            Self::Label => "label",
            Self::State => "state",
        }
    }

    fn granted(self, support: &FilesystemSupport) -> bool {
        match self {
            Self::Mount => support.can_mount,
            Self::Format => support.can_format,
            Self::Check => support.can_check,
            Self::Label => support.can_set_label,
            Self::State => support.can_get_state,
        }
    }
}

/// Fail with `UnsupportedCapability` when `support` lacks `capability`
pub fn ensure_capability(
    fs_type: &str,
    support: &FilesystemSupport,
    capability: Capability,
) -> Result<()> {
    if capability.granted(support) {
        return Ok(());
    }
    Err(StorageError::UnsupportedCapability {
        fs_type: fs_type.to_string(),
        operation: capability.operation().to_string(),
        missing_tools: support.missing_tools.clone(),
        package: support.alpine_package.clone(),
    })
}

/// Tool binaries and package behind one filesystem type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSet {
    pub name: &'static str,
    pub description: &'static str,
    /// Kernel module as listed in /proc/filesystems
    pub linux_module: &'static str,
    /// Package providing the tools
    pub package: &'static str,
    pub mkfs: &'static str,
    pub fsck: &'static str,
    pub label: &'static str,
    pub state: &'static str,
}

impl ToolSet {
    fn tool_for(&self, capability: Capability) -> &'static str {
        match capability {
            Capability::Mount => "",
            Capability::Format => self.mkfs,
            Capability::Check => self.fsck,
            Capability::Label => self.label,
            Capability::State => self.state,
        }
    }

    /// Probe kernel support and tool availability.
    ///
    /// A missing kernel module disables everything and reports every tool as
    /// missing. An unreadable /proc/filesystems is logged and ignored.
    pub async fn probe(&self, host: &dyn HostTools) -> FilesystemSupport {
        match host.kernel_filesystems().await {
            Ok(modules) if !modules.iter().any(|m| m == self.linux_module) => {
                debug!(
                    fs = self.name,
                    module = self.linux_module,
                    "kernel module not available"
                );
                return FilesystemSupport {
                    can_mount: false,
                    alpine_package: self.package.to_string(),
                    missing_tools: dedup_tools(&[self.mkfs, self.fsck, self.label, self.state]),
                    ..Default::default()
                };
            }
            Ok(_) => {}
            Err(e) => warn!(fs = self.name, error = %e, "cannot read kernel filesystems"),
        }

        let mut support = FilesystemSupport {
            can_mount: true,
            alpine_package: self.package.to_string(),
            ..Default::default()
        };

        let mut probe = |tool: &'static str| -> bool {
            if tool.is_empty() {
                return false;
            }
            let found = host.command_exists(tool);
            if !found && !support.missing_tools.iter().any(|t| t == tool) {
                support.missing_tools.push(tool.to_string());
            }
            found
        };

        let can_format = probe(self.mkfs);
        let can_check = probe(self.fsck);
        let can_set_label = probe(self.label);
        let can_get_state = probe(self.state);

        support.can_format = can_format;
        support.can_check = can_check;
        support.can_set_label = can_set_label;
        support.can_get_state = can_get_state;
        support
    }

    /// Cheap PATH check for the single tool behind `capability`
    pub fn require(&self, host: &dyn HostTools, capability: Capability) -> Result<&'static str> {
        let tool = self.tool_for(capability);
        if !tool.is_empty() && host.command_exists(tool) {
            return Ok(tool);
        }
        Err(StorageError::UnsupportedCapability {
            fs_type: self.name.to_string(),
            operation: capability.operation().to_string(),
            missing_tools: vec![tool.to_string()],
            package: self.package.to_string(),
        })
    }
}

fn dedup_tools(tools: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tool in tools.iter().filter(|t| !t.is_empty()) {
        if !out.iter().any(|t| t == tool) {
            out.push(tool.to_string());
        }
    }
    out
}

/// Run a tool against `device`; spawn failures become `ToolFailed` carrying the device
pub async fn run_tool(
    host: &dyn HostTools,
    ctx: &OperationContext,
    device: &str,
    program: &str,
    args: Vec<String>,
) -> Result<CommandOutput> {
    host.run(ctx, program, &args)
        .await
        .map_err(|e| match e {
            StorageError::Cancelled { .. } => e,
            other => StorageError::tool_failed(device, program, None, other.to_string()),
        })
}

/// Like [`run_tool`] but a non-zero exit is a `ToolFailed` with the tool's output
pub async fn run_tool_checked(
    host: &dyn HostTools,
    ctx: &OperationContext,
    device: &str,
    program: &str,
    args: Vec<String>,
) -> Result<CommandOutput> {
    let output = run_tool(host, ctx, device, program, args).await?;
    if !output.success() {
        return Err(StorageError::tool_failed(
            device,
            program,
            Some(output.exit_code),
            output.combined(),
        ));
    }
    Ok(output)
}

/// fsck(8)-style exit codes: 0 clean, 1/2 fixed, 4 left uncorrected, others failures
pub fn fsck_check_result(output: &CommandOutput) -> CheckResult {
    let (success, errors_found, errors_fixed) = match output.exit_code {
        0 => (true, false, false),
        1 | 2 => (true, true, true),
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

/// Value after `key` on the first line starting with it (`key: value` layouts)
pub fn field_value<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output
        .lines()
        .find_map(|line| line.trim_start().strip_prefix(key))
        .map(str::trim)
}

pub fn label_args(flag: &str, label: &str) -> Vec<String> {
    if label.is_empty() {
        Vec::new()
    } else {
        vec![flag.to_string(), label.to_string()]
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeHost;
    use super::*;

    const TOOLS: ToolSet = ToolSet {
        name: "ext4",
        description: "EXT4 Filesystem",
        linux_module: "ext4",
        package: "e2fsprogs",
        mkfs: "mkfs.ext4",
        fsck: "e2fsck",
        label: "tune2fs",
        state: "tune2fs",
    };

    #[tokio::test]
    async fn probe_reports_missing_tools_once() {
        let host = FakeHost::with_tools("ext4", &["mkfs.ext4"]);
        let support = TOOLS.probe(&host).await;
        assert!(support.can_mount);
        assert!(support.can_format);
        assert!(!support.can_check);
        assert!(!support.can_set_label && !support.can_get_state);
        assert_eq!(support.missing_tools, vec!["e2fsck", "tune2fs"]);
        assert_eq!(support.alpine_package, "e2fsprogs");
    }

    #[tokio::test]
    async fn missing_module_disables_everything() {
        let host = FakeHost::with_tools("vfat", &["mkfs.ext4", "e2fsck", "tune2fs"]);
        let support = TOOLS.probe(&host).await;
        assert!(!support.can_mount && !support.can_format && !support.can_check);
        assert_eq!(support.missing_tools, vec!["mkfs.ext4", "e2fsck", "tune2fs"]);
    }

    #[test]
    fn ensure_capability_carries_install_hint() {
        let support = FilesystemSupport {
            can_mount: true,
            alpine_package: "e2fsprogs".into(),
            missing_tools: vec!["mkfs.ext4".into()],
            ..Default::default()
        };
        assert!(ensure_capability("ext4", &support, Capability::Mount).is_ok());
        let err = ensure_capability("ext4", &support, Capability::Format).unwrap_err();
        assert_eq!(
            err,
            StorageError::UnsupportedCapability {
                fs_type: "ext4".into(),
                operation: "format".into(),
                missing_tools: vec!["mkfs.ext4".into()],
                package: "e2fsprogs".into(),
            }
        );
    }

    #[test]
    fn fsck_exit_codes() {
        let out = |exit_code| CommandOutput {
            exit_code,
            ..Default::default()
        };
        assert_eq!(
            (fsck_check_result(&out(0)).success, fsck_check_result(&out(0)).errors_found),
            (true, false)
        );
        let fixed = fsck_check_result(&out(1));
        assert!(fixed.success && fixed.errors_fixed);
        let left = fsck_check_result(&out(4));
        assert!(!left.success && left.errors_found && !left.errors_fixed);
        assert_eq!(fsck_check_result(&out(8)).exit_code, 8);
    }

    #[test]
    fn field_value_trims() {
        let text = "Filesystem volume name:   data\nFilesystem state:         clean\n";
        assert_eq!(field_value(text, "Filesystem state:"), Some("clean"));
        assert_eq!(field_value(text, "Mount count:"), None);
    }
}
