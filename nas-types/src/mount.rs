// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

use crate::SharedResource;

/// One concrete mount of a partition at a path
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MountPointData {
    /// Absolute mount path, also the key under which the mount point is stored
    pub path: String,

    /// Source device identifier; defaulted from the owning partition when empty
    #[serde(default)]
    pub device_id: String,

    /// Owning disk (back-reference)
    pub disk_id: Option<String>,

    /// Owning partition (back-reference)
    pub partition_id: Option<String>,

    pub fs_type: Option<String>,

    /// Standard mount flags (ro, noatime, ...)
    #[serde(default)]
    pub flags: Vec<MountFlag>,

    /// Filesystem-specific flags (uid=1000, compress=zstd, ...)
    #[serde(default)]
    pub custom_flags: Vec<MountFlag>,

    pub is_mounted: bool,

    /// Set when the backing device vanished while mounted
    pub is_invalid: bool,
    pub invalid_error: Option<String>,

    pub is_write_supported: bool,
    pub time_machine_support: Option<TimeMachineSupport>,
    pub is_to_mount_at_startup: bool,

    /// Cached share for display; the share's lifecycle is owned elsewhere
    pub share: Option<Box<SharedResource>>,
}

impl MountPointData {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Flag names joined as a mount option string (e.g., "ro,noatime,uid=1000")
    pub fn options_string(&self) -> String {
        self.flags
            .iter()
            .chain(self.custom_flags.iter())
            .map(MountFlag::to_option)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeMachineSupport {
    Unsupported,
    Supported,
    Experimental,
    Unknown,
}

/// A mount option, with presentation metadata for the flag catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountFlag {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub needs_value: bool,
    pub value_description: Option<String>,
    pub value_validation_regex: Option<String>,
    pub value: Option<String>,
}

impl MountFlag {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            needs_value: true,
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// `name` or `name=value`
    pub fn to_option(&self) -> String {
        match self.value.as_deref() {
            Some(value) if !value.is_empty() => format!("{}={}", self.name, value),
            _ => self.name.clone(),
        }
    }
}

/// Conceptual lifecycle state of a managed mount point
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MountState {
    Unmounted,
    Mounting,
    Mounted,
    MountFailed,
    Unmounting,
    UnmountFailed,
    /// Device disappeared while mounted
    Invalid,
}

impl MountState {
    pub fn is_transitional(self) -> bool {
        matches!(self, Self::Mounting | Self::Unmounting)
    }
}
