// SPDX-License-Identifier: GPL-3.0-only

//! Disk and partition models
//!
//! Partitions are keyed by their own identifier and mount points by their
//! absolute path, so a rescan that reorders devices never shifts an entry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MountPointData;

/// A physical or virtual block device
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Disk {
    // === Identity ===
    /// Stable identifier (by-id basename when available)
    pub id: String,

    /// Legacy kernel name (e.g., "sda"), may be reassigned across boots
    pub legacy_device_name: Option<String>,

    /// Legacy device path (e.g., "/dev/sda")
    pub legacy_device_path: Option<String>,

    /// Persistent by-id path (e.g., "/dev/disk/by-id/ata-WDC_...")
    pub device_path: Option<String>,

    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,

    // === Physical Properties ===
    /// Total size in bytes
    pub size: u64,

    pub removable: bool,
    pub ejectable: bool,

    /// Connection bus (e.g., "usb", "ata", "nvme")
    pub connection_bus: Option<String>,

    // === Children ===
    /// Partitions keyed by partition identifier
    #[serde(default)]
    pub partitions: BTreeMap<String, Partition>,

    // === Collaborator snapshots ===
    pub smart_info: Option<SmartInfo>,
    pub hdidle_status: Option<HdIdleDeviceStatus>,
}

impl Disk {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Device path preferring the persistent by-id form
    pub fn preferred_device_path(&self) -> Option<&str> {
        self.device_path
            .as_deref()
            .or(self.legacy_device_path.as_deref())
    }
}

/// A filesystem-bearing region of a [`Disk`]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Partition {
    pub id: String,

    pub legacy_device_name: Option<String>,
    pub legacy_device_path: Option<String>,
    pub device_path: Option<String>,

    /// Owning disk identifier (back-reference, set by the topology store)
    #[serde(default)]
    pub disk_id: String,

    /// Filesystem type as reported by enumeration (e.g., "ext4")
    pub fs_type: Option<String>,

    /// Filesystem label
    pub name: Option<String>,

    pub uuid: Option<String>,

    pub size: u64,

    /// Holds the appliance OS (boot, data, overlay) and is never offered for mounting
    pub system: bool,

    /// Mount points visible on the host OS, keyed by absolute path
    #[serde(default)]
    pub host_mount_point_data: BTreeMap<String, MountPointData>,

    /// Mount points exposed inside the managed namespace, keyed by absolute path
    #[serde(default)]
    pub mount_point_data: BTreeMap<String, MountPointData>,
}

impl Partition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn preferred_device_path(&self) -> Option<&str> {
        self.device_path
            .as_deref()
            .or(self.legacy_device_path.as_deref())
    }

    /// Whether any managed or host mount point is currently mounted
    pub fn is_mounted(&self) -> bool {
        self.mount_point_data
            .values()
            .chain(self.host_mount_point_data.values())
            .any(|mp| mp.is_mounted)
    }
}

/// Latest SMART snapshot supplied by the health poller
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SmartInfo {
    pub disk_id: String,
    pub supported: bool,
    pub model_family: Option<String>,
    pub temperature_celsius: Option<i16>,
    pub power_on_hours: Option<u64>,
    pub power_cycle_count: Option<u64>,
    /// Overall self-assessment (true = PASSED)
    pub healthy: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Spin-down status supplied by the idle scheduler
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HdIdleDeviceStatus {
    pub disk_id: String,
    pub spun_down: bool,
    pub idle_time_secs: u64,
    /// Command used to spin the disk down ("scsi" or "ata")
    pub command_type: Option<String>,
    pub last_io_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_path_uses_by_id_first() {
        let mut disk = Disk::new("d1");
        disk.legacy_device_path = Some("/dev/sda".into());
        assert_eq!(disk.preferred_device_path(), Some("/dev/sda"));

        disk.device_path = Some("/dev/disk/by-id/ata-X".into());
        assert_eq!(disk.preferred_device_path(), Some("/dev/disk/by-id/ata-X"));
    }

    #[test]
    fn partition_is_mounted_checks_both_namespaces() {
        let mut partition = Partition::new("p1");
        assert!(!partition.is_mounted());

        let mut host = MountPointData::new("/media/x");
        host.is_mounted = true;
        partition
            .host_mount_point_data
            .insert(host.path.clone(), host);
        assert!(partition.is_mounted());
    }

    #[test]
    fn disk_deserializes_without_partitions() {
        let disk: Disk = serde_json::from_str(
            r#"{"id":"d1","legacy_device_name":null,"legacy_device_path":null,"device_path":null,
                "vendor":null,"model":null,"serial":null,"size":0,"removable":false,
                "ejectable":false,"connection_bus":null,"smart_info":null,"hdidle_status":null}"#,
        )
        .expect("deserialize disk");
        assert!(disk.partitions.is_empty());
    }
}
