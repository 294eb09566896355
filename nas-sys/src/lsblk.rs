// SPDX-License-Identifier: GPL-3.0-only

//! Device enumeration through `lsblk --json`

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use nas_types::{Disk, MountPointData, Partition};

use crate::{Result, SysError, run_capture};

const LSBLK_COLUMNS: &str =
    "NAME,PATH,TYPE,SIZE,FSTYPE,LABEL,UUID,VENDOR,MODEL,SERIAL,RM,HOTPLUG,TRAN,MOUNTPOINT,ID-LINK";

/// Labels of the appliance's own partitions
const SYSTEM_LABEL_PREFIXES: &[&str] = &["hassos-"];

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    path: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    size: u64,
    fstype: Option<String>,
    label: Option<String>,
    uuid: Option<String>,
    vendor: Option<String>,
    model: Option<String>,
    serial: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    rm: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    hotplug: bool,
    tran: Option<String>,
    mountpoint: Option<String>,
    #[serde(rename = "id-link")]
    id_link: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

impl LsblkDevice {
    fn kernel_path(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("/dev/{}", self.name))
    }

    fn by_id_path(&self) -> Option<String> {
        self.id_link
            .as_deref()
            .map(|link| format!("/dev/disk/by-id/{link}"))
    }

    fn stable_id(&self) -> String {
        self.id_link.clone().unwrap_or_else(|| self.name.clone())
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_u64().is_some_and(|v| v != 0),
        Value::String(s) => matches!(s.trim(), "1" | "true"),
        _ => false,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_system_label(label: Option<&str>) -> bool {
    label.is_some_and(|label| {
        SYSTEM_LABEL_PREFIXES
            .iter()
            .any(|prefix| label.starts_with(prefix))
    })
}

pub async fn enumerate_disks(
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<Vec<Disk>> {
    let args = vec![
        "--json".to_string(),
        "--bytes".to_string(),
        "--output".to_string(),
        LSBLK_COLUMNS.to_string(),
    ];
    let output = run_capture("lsblk", &args, cancel, timeout).await?;
    if output.exit_code != 0 {
        return Err(SysError::OperationFailed(format!(
            "lsblk exited with {}: {}",
            output.exit_code,
            output.stderr.trim()
        )));
    }
    parse_lsblk(&output.stdout)
}

/// Convert `lsblk --json` output into disks with their partitions
pub fn parse_lsblk(json: &str) -> Result<Vec<Disk>> {
    let parsed: LsblkOutput = serde_json::from_str(json).map_err(|e| SysError::Parse {
        what: "lsblk output".to_string(),
        message: e.to_string(),
    })?;

    Ok(parsed
        .blockdevices
        .into_iter()
        .filter(|dev| dev.kind == "disk")
        .map(disk_from_device)
        .collect())
}

fn disk_from_device(mut device: LsblkDevice) -> Disk {
    let disk_id = device.stable_id();
    let children = std::mem::take(&mut device.children);

    let mut partitions = BTreeMap::new();
    for child in children.into_iter().filter(|c| c.kind == "part") {
        let partition = partition_from_device(&disk_id, child);
        if partitions.contains_key(&partition.id) {
            warn!(disk = %disk_id, partition = %partition.id, "duplicate partition id from lsblk");
            continue;
        }
        partitions.insert(partition.id.clone(), partition);
    }

    // Filesystem written straight onto the disk, no partition table
    if partitions.is_empty() && device.fstype.is_some() {
        let whole = LsblkDevice {
            name: device.name.clone(),
            path: device.path.clone(),
            kind: "part".to_string(),
            size: device.size,
            fstype: device.fstype.take(),
            label: device.label.take(),
            uuid: device.uuid.take(),
            vendor: None,
            model: None,
            serial: None,
            rm: device.rm,
            hotplug: device.hotplug,
            tran: None,
            mountpoint: device.mountpoint.take(),
            id_link: device.id_link.clone(),
            children: Vec::new(),
        };
        let partition = partition_from_device(&disk_id, whole);
        partitions.insert(partition.id.clone(), partition);
    }

    Disk {
        id: disk_id,
        legacy_device_name: Some(device.name.clone()),
        legacy_device_path: Some(device.kernel_path()),
        device_path: device.by_id_path(),
        vendor: non_empty(device.vendor),
        model: non_empty(device.model),
        serial: non_empty(device.serial),
        size: device.size,
        removable: device.rm,
        ejectable: device.hotplug,
        connection_bus: non_empty(device.tran),
        partitions,
        smart_info: None,
        hdidle_status: None,
    }
}

fn partition_from_device(disk_id: &str, device: LsblkDevice) -> Partition {
    let id = device.stable_id();
    let kernel_path = device.kernel_path();
    let label = non_empty(device.label.clone());
    let fs_type = non_empty(device.fstype.clone());

    let mut host_mount_point_data = BTreeMap::new();
    if let Some(path) = non_empty(device.mountpoint.clone()) {
        let mp = MountPointData {
            path: path.clone(),
            device_id: kernel_path.clone(),
            disk_id: Some(disk_id.to_string()),
            partition_id: Some(id.clone()),
            fs_type: fs_type.clone(),
            is_mounted: true,
            ..Default::default()
        };
        host_mount_point_data.insert(path, mp);
    }

    Partition {
        id,
        legacy_device_name: Some(device.name.clone()),
        legacy_device_path: Some(kernel_path),
        device_path: device.by_id_path(),
        disk_id: disk_id.to_string(),
        fs_type,
        system: is_system_label(label.as_deref()),
        name: label,
        uuid: non_empty(device.uuid),
        size: device.size,
        host_mount_point_data,
        mount_point_data: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
       "blockdevices": [
          {"name":"sda", "path":"/dev/sda", "type":"disk", "size":500107862016, "fstype":null,
           "label":null, "uuid":null, "vendor":"ATA     ", "model":"WDC WD5000", "serial":"WD-123",
           "rm":false, "hotplug":false, "tran":"sata", "mountpoint":null, "id-link":"ata-WDC_WD5000_WD-123",
           "children": [
              {"name":"sda1", "path":"/dev/sda1", "type":"part", "size":"1073741824", "fstype":"vfat",
               "label":"hassos-boot", "uuid":"AB12-CD34", "vendor":null, "model":null, "serial":null,
               "rm":"0", "hotplug":"0", "tran":null, "mountpoint":"/mnt/boot", "id-link":"ata-WDC_WD5000_WD-123-part1"},
              {"name":"sda2", "path":"/dev/sda2", "type":"part", "size":499034120192, "fstype":"ext4",
               "label":"data", "uuid":"1111-2222", "vendor":null, "model":null, "serial":null,
               "rm":0, "hotplug":0, "tran":null, "mountpoint":null, "id-link":"ata-WDC_WD5000_WD-123-part2"}
           ]
          },
          {"name":"sdb", "type":"disk", "size":16000000000, "fstype":"exfat", "label":"STICK",
           "uuid":"5E5E-0000", "vendor":"Kingston", "model":"DataTraveler", "serial":"X1",
           "rm":true, "hotplug":true, "tran":"usb", "mountpoint":null, "id-link":null},
          {"name":"loop0", "type":"loop", "size":1000, "rm":false, "hotplug":false}
       ]
    }"#;

    #[test]
    fn converts_disks_and_partitions() {
        let disks = parse_lsblk(SAMPLE).expect("parse lsblk");
        assert_eq!(disks.len(), 2);

        let sda = &disks[0];
        assert_eq!(sda.id, "ata-WDC_WD5000_WD-123");
        assert_eq!(sda.vendor.as_deref(), Some("ATA"));
        assert_eq!(
            sda.device_path.as_deref(),
            Some("/dev/disk/by-id/ata-WDC_WD5000_WD-123")
        );
        assert_eq!(sda.partitions.len(), 2);

        let boot = &sda.partitions["ata-WDC_WD5000_WD-123-part1"];
        assert!(boot.system);
        assert_eq!(boot.size, 1_073_741_824);
        assert_eq!(boot.disk_id, sda.id);
        assert!(boot.host_mount_point_data["/mnt/boot"].is_mounted);

        let data = &sda.partitions["ata-WDC_WD5000_WD-123-part2"];
        assert!(!data.system);
        assert_eq!(data.fs_type.as_deref(), Some("ext4"));
        assert!(data.host_mount_point_data.is_empty());
    }

    #[test]
    fn unpartitioned_disk_gets_whole_device_partition() {
        let disks = parse_lsblk(SAMPLE).expect("parse lsblk");
        let stick = &disks[1];
        assert_eq!(stick.id, "sdb");
        assert!(stick.removable && stick.ejectable);
        assert_eq!(stick.legacy_device_path.as_deref(), Some("/dev/sdb"));

        let whole = &stick.partitions["sdb"];
        assert_eq!(whole.fs_type.as_deref(), Some("exfat"));
        assert_eq!(whole.name.as_deref(), Some("STICK"));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(parse_lsblk("{"), Err(SysError::Parse { .. })));
    }
}
