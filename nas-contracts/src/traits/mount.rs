// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use crate::{OperationContext, Result};

/// Fully resolved parameters for one mount(2) call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountRequest {
    pub source: String,
    pub target: String,
    pub fs_type: String,
    /// MS_* bits
    pub flags: u64,
    /// Filesystem-specific option string (e.g., "uid=1000,iocharset=utf8")
    pub data: String,
}

/// One line of the OS mount table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub target: String,
    pub fs_type: String,
    /// Per-mount options (ro, noatime, ...)
    pub options: Vec<String>,
    /// Superblock options (uid=..., errors=...)
    pub super_options: Vec<String>,
}

impl MountEntry {
    pub fn is_read_only(&self) -> bool {
        self.options.iter().any(|opt| opt == "ro")
    }
}

/// Mount primitives of the host OS
#[async_trait]
pub trait MountOps: Send + Sync {
    /// Create the mount target directory if needed
    async fn prepare_target(&self, target: &str) -> Result<()>;

    /// Remove an empty mount target directory
    async fn remove_target(&self, target: &str) -> Result<()>;

    /// `ctx` is checked before the syscall starts. Once started the call runs
    /// to completion and its outcome is returned, cancelled or not.
    async fn mount(&self, ctx: &OperationContext, request: &MountRequest) -> Result<MountEntry>;

    /// `force` and `lazy` are passed to the OS unchanged. Cancellation is
    /// honoured only before the syscall starts, as for [`mount`](Self::mount).
    async fn unmount(
        &self,
        ctx: &OperationContext,
        target: &str,
        force: bool,
        lazy: bool,
    ) -> Result<()>;

    /// Current mount at `target`, re-read from the OS
    async fn mount_info(&self, target: &str) -> Result<Option<MountEntry>>;

    /// The whole OS mount table
    async fn mounts(&self) -> Result<Vec<MountEntry>>;
}
