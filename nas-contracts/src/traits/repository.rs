// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use nas_types::{MountFlag, SharedResource};

use crate::Result;

/// Persisted mount-point record, the source of truth for "mount by id"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountPointRecord {
    pub id: String,
    pub path: String,
    /// Device source (by-id path or kernel path)
    pub device: String,
    pub fs_type: Option<String>,
    pub flags: Vec<MountFlag>,
    pub custom_flags: Vec<MountFlag>,
    pub is_to_mount_at_startup: bool,
}

/// Persistence collaborator for mount-point records
#[async_trait]
pub trait MountPointRepository: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<MountPointRecord>>;

    async fn find_by_path(&self, path: &str) -> Result<Option<MountPointRecord>>;

    async fn save(&self, record: MountPointRecord) -> Result<()>;

    async fn all(&self) -> Result<Vec<MountPointRecord>>;
}

/// Persistence collaborator for shares; this core never creates or deletes them
#[async_trait]
pub trait ShareRepository: Send + Sync {
    async fn find_by_mount_path(&self, path: &str) -> Result<Option<SharedResource>>;

    async fn all(&self) -> Result<Vec<SharedResource>>;
}
