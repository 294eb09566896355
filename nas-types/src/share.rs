// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

use crate::MountPointData;

/// Usage classification of an exported share
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShareUsage {
    #[default]
    None,
    Backup,
    Media,
    Share,
    Internal,
}

/// A named export of one mount point to the file-sharing daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SharedResource {
    pub name: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub ro_users: Vec<String>,
    #[serde(default)]
    pub usage: ShareUsage,
    #[serde(default)]
    pub time_machine: bool,
    #[serde(default)]
    pub guest_ok: bool,
    #[serde(default)]
    pub recycle_bin: bool,
    #[serde(default)]
    pub veto_files: Vec<String>,

    /// Exported mount point; its `path` locates the attachment target
    pub mount_point_data: Option<Box<MountPointData>>,
}

impl SharedResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Path of the exported mount point, if any
    pub fn mount_path(&self) -> Option<&str> {
        self.mount_point_data
            .as_deref()
            .map(|mp| mp.path.as_str())
            .filter(|path| !path.is_empty())
    }

    /// Copy suitable for caching on a mount point: the nested mount point
    /// keeps its identity fields but drops its own share reference.
    pub fn detached_copy(&self) -> Self {
        let mut copy = self.clone();
        if let Some(mp) = copy.mount_point_data.as_deref_mut() {
            mp.share = None;
        }
        copy
    }
}
