// SPDX-License-Identifier: GPL-3.0-only

#![allow(dead_code)]

use std::sync::Arc;

use nas_contracts::{MountPointRecord, OperationContext};
use nas_service::adapters::{MemoryMountPointRepository, MemoryShareRepository};
use nas_service::testing::{FakeHostSet, ext4_header};
use nas_service::{Collaborators, ServiceConfig, StorageBackend};
use nas_types::{Disk, MountFlag, MountPointData, Partition, SharedResource};

pub const EXT4_TOOLS: [&str; 3] = ["mkfs.ext4", "fsck.ext4", "tune2fs"];

/// One disk with one ext4 partition at `device`
pub fn disk(disk_id: &str, partition_id: &str, device: &str) -> Disk {
    let mut disk = Disk::new(disk_id);
    let mut partition = Partition::new(partition_id);
    partition.legacy_device_path = Some(device.to_string());
    partition.fs_type = Some("ext4".to_string());
    disk.partitions.insert(partition_id.to_string(), partition);
    disk
}

pub fn record(id: &str, path: &str, device: &str) -> MountPointRecord {
    MountPointRecord {
        id: id.to_string(),
        path: path.to_string(),
        device: device.to_string(),
        fs_type: Some("ext4".to_string()),
        flags: vec![MountFlag::named("noatime")],
        ..Default::default()
    }
}

pub fn share(name: &str, path: &str) -> SharedResource {
    let mut share = SharedResource::new(name);
    share.mount_point_data = Some(Box::new(MountPointData::new(path)));
    share
}

/// A backend on fakes plus handles to inspect them
pub struct TestBed {
    pub fakes: FakeHostSet,
    pub records: Arc<MemoryMountPointRepository>,
    pub shares: Arc<MemoryShareRepository>,
    pub backend: StorageBackend,
}

impl TestBed {
    pub fn builder() -> TestBedBuilder {
        TestBedBuilder::default()
    }

    pub fn ctx(&self) -> OperationContext {
        OperationContext::new()
    }
}

pub struct TestBedBuilder {
    config: ServiceConfig,
    tools: Vec<&'static str>,
    disks: Vec<Disk>,
    records: Vec<MountPointRecord>,
    shares: Vec<SharedResource>,
}

impl Default for TestBedBuilder {
    fn default() -> Self {
        Self {
            config: ServiceConfig::default(),
            tools: EXT4_TOOLS.to_vec(),
            disks: vec![disk("d1", "p1", "/dev/sdb1")],
            records: vec![record("1", "/mnt/data", "/dev/sdb1")],
            shares: Vec::new(),
        }
    }
}

impl TestBedBuilder {
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tools(mut self, tools: &[&'static str]) -> Self {
        self.tools = tools.to_vec();
        self
    }

    pub fn disks(mut self, disks: Vec<Disk>) -> Self {
        self.disks = disks;
        self
    }

    pub fn records(mut self, records: Vec<MountPointRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn shares(mut self, shares: Vec<SharedResource>) -> Self {
        self.shares = shares;
        self
    }

    /// Build and run one rescan so the topology holds the disks
    pub async fn build(self) -> TestBed {
        let fakes = FakeHostSet::new(&self.tools);
        for partition in self.disks.iter().flat_map(|d| d.partitions.values()) {
            if let Some(device) = partition.legacy_device_path.as_deref() {
                fakes.resolver.alias(device, device);
                fakes.resolver.set_header(device, ext4_header());
            }
        }
        fakes.enumerator.set_disks(self.disks);

        let records = Arc::new(MemoryMountPointRepository::with_records(self.records));
        let shares = Arc::new(MemoryShareRepository::with_shares(self.shares));
        let collaborators = Collaborators {
            host: fakes.host.clone(),
            mounts: fakes.mounts.clone(),
            resolver: fakes.resolver.clone(),
            enumerator: fakes.enumerator.clone(),
            mount_points: records.clone(),
            shares: shares.clone(),
        };
        let backend = StorageBackend::new(self.config, collaborators);
        backend
            .volumes()
            .rescan(&OperationContext::new())
            .await
            .expect("initial rescan");

        TestBed {
            fakes,
            records,
            shares,
            backend,
        }
    }
}
