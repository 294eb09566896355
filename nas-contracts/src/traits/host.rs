// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use crate::{OperationContext, Result};

/// Captured result of an external tool run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, trimmed, for diagnostics
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, _) => stderr.to_string(),
            (false, true) => stdout.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

/// Host probing and process execution used by filesystem adapters
#[async_trait]
pub trait HostTools: Send + Sync {
    /// Whether `program` resolves on PATH
    fn command_exists(&self, program: &str) -> bool;

    /// Run `program` to completion. A non-zero exit is returned in the output,
    /// not as an error; spawn failures and cancellation are errors.
    async fn run(
        &self,
        ctx: &OperationContext,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput>;

    /// Filesystem names the running kernel can mount (/proc/filesystems)
    async fn kernel_filesystems(&self) -> Result<Vec<String>>;

    /// Whether `device` is the source of any current mount
    async fn is_device_mounted(&self, device: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_output_skips_empty_streams() {
        let output = CommandOutput {
            exit_code: 1,
            stdout: "  \n".into(),
            stderr: "bad superblock\n".into(),
        };
        assert_eq!(output.combined(), "bad superblock");
        assert!(!output.success());
    }
}
