// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use nas_types::{
    CheckOptions, CheckResult, FilesystemState, FilesystemSupport, FormatOptions,
    FsMagicSignature, MountFlag,
};

use crate::{OperationContext, Result};

/// Uniform contract over one filesystem type's tools
#[async_trait]
pub trait FilesystemAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Kernel module name as listed in /proc/filesystems
    fn linux_fs_module(&self) -> &str {
        self.name()
    }

    /// Type-specific mount flags for presentation
    fn mount_flags(&self) -> Vec<MountFlag>;

    fn signatures(&self) -> &[FsMagicSignature];

    /// Probe the host for the tools behind each capability. Not cached.
    async fn is_supported(&self, ctx: &OperationContext) -> Result<FilesystemSupport>;

    async fn format(
        &self,
        ctx: &OperationContext,
        device: &str,
        options: &FormatOptions,
    ) -> Result<()>;

    async fn check(
        &self,
        ctx: &OperationContext,
        device: &str,
        options: &CheckOptions,
    ) -> Result<CheckResult>;

    async fn get_label(&self, ctx: &OperationContext, device: &str) -> Result<String>;

    async fn set_label(&self, ctx: &OperationContext, device: &str, label: &str) -> Result<()>;

    async fn get_state(&self, ctx: &OperationContext, device: &str) -> Result<FilesystemState>;
}
