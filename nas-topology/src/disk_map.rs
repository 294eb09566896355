// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeMap;

use nas_contracts::{Result, StorageError};
use nas_types::{Disk, HdIdleDeviceStatus, MountPointData, Partition, SharedResource, SmartInfo};
use tracing::{debug, warn};

/// Owning disk and partition of a mount point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPointLocation {
    pub disk_id: String,
    pub partition_id: String,
    pub path: String,
}

/// What a [`DiskMap::reconcile`] pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Disks seen for the first time
    pub added: Vec<String>,
    /// Disks dropped because they vanished with nothing mounted
    pub removed: Vec<String>,
    /// Mount paths marked invalid because their device vanished while mounted
    pub invalidated: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.invalidated.is_empty()
    }
}

/// Disks keyed by identifier, each owning its partitions and mount points
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskMap {
    disks: BTreeMap<String, Disk>,
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StorageError::invalid_parameter(format!("{what} is empty")));
    }
    Ok(())
}

fn link_mount_point(disk_id: &str, partition_id: &str, mp: &mut MountPointData) {
    if mp.device_id.is_empty() {
        mp.device_id = partition_id.to_string();
    }
    mp.disk_id = Some(disk_id.to_string());
    mp.partition_id = Some(partition_id.to_string());
}

fn rekey(
    disk_id: &str,
    partition_id: &str,
    entries: BTreeMap<String, MountPointData>,
) -> BTreeMap<String, MountPointData> {
    entries
        .into_values()
        .filter_map(|mut mp| {
            if mp.path.is_empty() {
                debug!(disk_id, partition_id, "dropping mount point without a path");
                return None;
            }
            link_mount_point(disk_id, partition_id, &mut mp);
            Some((mp.path.clone(), mp))
        })
        .collect()
}

/// Point every back-reference at `disk_id` and key mount points by path
fn normalize_partition(disk_id: &str, partition: &mut Partition) {
    partition.disk_id = disk_id.to_string();
    let managed = std::mem::take(&mut partition.mount_point_data);
    partition.mount_point_data = rekey(disk_id, &partition.id, managed);
    let host = std::mem::take(&mut partition.host_mount_point_data);
    partition.host_mount_point_data = rekey(disk_id, &partition.id, host);
}

/// A managed mount path claimed by more than one partition of `disk`
fn duplicate_mount_path(disk: &Disk) -> Option<String> {
    let mut seen = std::collections::BTreeSet::new();
    disk.partitions
        .values()
        .flat_map(|p| p.mount_point_data.keys())
        .find(|path| !seen.insert(path.as_str()))
        .cloned()
}

fn invalidate_mounted(partition: &mut Partition, reason: &str, report: &mut ReconcileReport) {
    for mp in partition
        .mount_point_data
        .values_mut()
        .filter(|mp| mp.is_mounted)
    {
        mp.is_invalid = true;
        mp.invalid_error = Some(reason.to_string());
        report.invalidated.push(mp.path.clone());
    }
}

impl DiskMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.disks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }

    pub fn disks(&self) -> impl Iterator<Item = &Disk> {
        self.disks.values()
    }

    /// Owned copy of every disk, in identifier order
    pub fn snapshot(&self) -> Vec<Disk> {
        self.disks.values().cloned().collect()
    }

    fn partition_owner(&self, partition_id: &str) -> Option<&str> {
        self.disks
            .values()
            .find(|disk| disk.partitions.contains_key(partition_id))
            .map(|disk| disk.id.as_str())
    }

    /// Insert or replace a disk by its identifier.
    ///
    /// Partitions are re-keyed by their own identifier and their mount points
    /// by path; every back-reference is rewritten to point at this disk.
    pub fn add_or_update(&mut self, mut disk: Disk) -> Result<()> {
        require(&disk.id, "disk id")?;

        let partitions = std::mem::take(&mut disk.partitions);
        for (_, mut partition) in partitions {
            require(&partition.id, "partition id")
                .map_err(|e| e.with_context(format!("disk {}", disk.id)))?;
            if let Some(owner) = self.partition_owner(&partition.id)
                && owner != disk.id
            {
                return Err(StorageError::conflict(format!(
                    "partition {} already belongs to disk {owner}",
                    partition.id
                )));
            }
            normalize_partition(&disk.id, &mut partition);
            disk.partitions.insert(partition.id.clone(), partition);
        }
        if let Some(path) = duplicate_mount_path(&disk) {
            return Err(StorageError::conflict(format!(
                "mount path {path} is claimed by two partitions of disk {}",
                disk.id
            )));
        }

        self.disks.insert(disk.id.clone(), disk);
        Ok(())
    }

    /// Whether the disk existed
    pub fn remove(&mut self, disk_id: &str) -> bool {
        self.disks.remove(disk_id).is_some()
    }

    pub fn get(&self, disk_id: &str) -> Option<&Disk> {
        self.disks.get(disk_id)
    }

    fn disk_mut(&mut self, disk_id: &str) -> Result<&mut Disk> {
        require(disk_id, "disk id")?;
        self.disks
            .get_mut(disk_id)
            .ok_or_else(|| StorageError::not_found(format!("disk {disk_id}")))
    }

    fn partition_mut(&mut self, disk_id: &str, partition_id: &str) -> Result<&mut Partition> {
        require(partition_id, "partition id")?;
        self.disk_mut(disk_id)?
            .partitions
            .get_mut(partition_id)
            .ok_or_else(|| {
                StorageError::not_found(format!("partition {partition_id} on disk {disk_id}"))
            })
    }

    pub fn add_partition(&mut self, disk_id: &str, mut partition: Partition) -> Result<()> {
        require(disk_id, "disk id")?;
        require(&partition.id, "partition id")?;
        if !self.disks.contains_key(disk_id) {
            return Err(StorageError::not_found(format!("disk {disk_id}")));
        }
        if let Some(owner) = self.partition_owner(&partition.id)
            && owner != disk_id
        {
            return Err(StorageError::conflict(format!(
                "partition {} already belongs to disk {owner}",
                partition.id
            )));
        }

        normalize_partition(disk_id, &mut partition);
        let disk = self.disk_mut(disk_id)?;
        if let Some(path) = partition.mount_point_data.keys().find(|path| {
            disk.partitions
                .values()
                .any(|other| other.id != partition.id && other.mount_point_data.contains_key(*path))
        }) {
            return Err(StorageError::conflict(format!(
                "mount path {path} is already used on disk {disk_id}"
            )));
        }

        disk.partitions.insert(partition.id.clone(), partition);
        Ok(())
    }

    /// `Ok(false)` when the disk exists but the partition does not
    pub fn remove_partition(&mut self, disk_id: &str, partition_id: &str) -> Result<bool> {
        require(partition_id, "partition id")?;
        let disk = self.disk_mut(disk_id)?;
        Ok(disk.partitions.remove(partition_id).is_some())
    }

    pub fn get_partition(&self, disk_id: &str, partition_id: &str) -> Option<&Partition> {
        self.disks.get(disk_id)?.partitions.get(partition_id)
    }

    /// Search every disk for a partition
    pub fn find_partition(&self, partition_id: &str) -> Option<(&Disk, &Partition)> {
        self.disks.values().find_map(|disk| {
            disk.partitions
                .get(partition_id)
                .map(|partition| (disk, partition))
        })
    }

    /// Insert or replace a managed mount point, keyed by its path
    pub fn add_or_update_mount_point(
        &mut self,
        disk_id: &str,
        partition_id: &str,
        mut mount_point: MountPointData,
    ) -> Result<()> {
        require(&mount_point.path, "mount point path")?;
        let path = mount_point.path.clone();

        // missing ancestors are reported before any path conflict
        self.partition_mut(disk_id, partition_id)?;
        let taken = self.disks.get(disk_id).is_some_and(|disk| {
            disk.partitions
                .values()
                .any(|p| p.id != partition_id && p.mount_point_data.contains_key(&path))
        });
        if taken {
            return Err(StorageError::conflict(format!(
                "mount path {path} is already used on disk {disk_id}"
            )));
        }

        let partition = self.partition_mut(disk_id, partition_id)?;
        link_mount_point(disk_id, partition_id, &mut mount_point);
        partition.mount_point_data.insert(path, mount_point);
        Ok(())
    }

    /// `Ok(false)` when the partition exists but has no mount point at `path`
    pub fn remove_mount_point(
        &mut self,
        disk_id: &str,
        partition_id: &str,
        path: &str,
    ) -> Result<bool> {
        require(path, "mount point path")?;
        let partition = self.partition_mut(disk_id, partition_id)?;
        Ok(partition.mount_point_data.remove(path).is_some())
    }

    pub fn get_mount_point(
        &self,
        disk_id: &str,
        partition_id: &str,
        path: &str,
    ) -> Option<&MountPointData> {
        self.get_partition(disk_id, partition_id)?
            .mount_point_data
            .get(path)
    }

    /// Full-graph scan; prefer [`get_mount_point`](Self::get_mount_point) when
    /// the owning partition is known
    pub fn get_mount_point_by_path(&self, path: &str) -> Option<&MountPointData> {
        if path.is_empty() {
            return None;
        }
        self.disks
            .values()
            .flat_map(|disk| disk.partitions.values())
            .find_map(|partition| partition.mount_point_data.get(path))
    }

    pub fn locate_mount_point(&self, path: &str) -> Option<MountPointLocation> {
        if path.is_empty() {
            return None;
        }
        self.disks.values().find_map(|disk| {
            disk.partitions
                .values()
                .find(|partition| partition.mount_point_data.contains_key(path))
                .map(|partition| MountPointLocation {
                    disk_id: disk.id.clone(),
                    partition_id: partition.id.clone(),
                    path: path.to_string(),
                })
        })
    }

    /// Every managed mount point across all disks
    pub fn get_all_mount_points(&self) -> Vec<&MountPointData> {
        self.disks
            .values()
            .flat_map(|disk| disk.partitions.values())
            .flat_map(|partition| partition.mount_point_data.values())
            .collect()
    }

    /// Mutate a mount point in place. Its path and back-references are
    /// restored afterwards so the closure cannot break the keying.
    pub fn update_mount_point<R>(
        &mut self,
        location: &MountPointLocation,
        update: impl FnOnce(&mut MountPointData) -> R,
    ) -> Result<R> {
        let partition = self.partition_mut(&location.disk_id, &location.partition_id)?;
        let mp = partition
            .mount_point_data
            .get_mut(&location.path)
            .ok_or_else(|| StorageError::not_found(format!("mount point {}", location.path)))?;
        let result = update(mp);
        mp.path.clone_from(&location.path);
        link_mount_point(&location.disk_id, &location.partition_id, mp);
        Ok(result)
    }

    /// Attach `share` to the mount point it exports; returns the owning disk.
    ///
    /// The target is taken from the disk and partition recorded on the share's
    /// mount point when both are present, otherwise every partition is
    /// searched for the share's mount path.
    pub fn add_mount_point_share(&mut self, share: &SharedResource) -> Result<String> {
        require(&share.name, "share name")?;
        let target = share.mount_point_data.as_deref().ok_or_else(|| {
            StorageError::invalid_parameter(format!("share {} has no mount point", share.name))
        })?;
        require(&target.path, "share mount point path")?;

        let location = match (target.disk_id.as_deref(), target.partition_id.as_deref()) {
            (Some(disk_id), Some(partition_id)) => self
                .get_mount_point(disk_id, partition_id, &target.path)
                .map(|_| MountPointLocation {
                    disk_id: disk_id.to_string(),
                    partition_id: partition_id.to_string(),
                    path: target.path.clone(),
                }),
            _ => self.locate_mount_point(&target.path),
        }
        .ok_or_else(|| {
            StorageError::not_found(format!(
                "no mount point at {} for share {}",
                target.path, share.name
            ))
        })?;

        let attached = share.detached_copy();
        self.update_mount_point(&location, |mp| mp.share = Some(Box::new(attached)))?;
        Ok(location.disk_id)
    }

    /// Detach the share named `share_name`; returns the owning disk when found
    pub fn remove_mount_point_share(&mut self, share_name: &str) -> Option<String> {
        if share_name.is_empty() {
            return None;
        }
        self.disks.values_mut().find_map(|disk| {
            let mp = disk
                .partitions
                .values_mut()
                .flat_map(|partition| partition.mount_point_data.values_mut())
                .find(|mp| mp.share.as_ref().is_some_and(|s| s.name == share_name))?;
            mp.share = None;
            Some(disk.id.clone())
        })
    }

    pub fn add_hdidle_device(&mut self, status: HdIdleDeviceStatus) -> Result<()> {
        let disk = self.disk_mut(&status.disk_id)?;
        disk.hdidle_status = Some(status);
        Ok(())
    }

    pub fn add_smart_info(&mut self, info: SmartInfo) -> Result<()> {
        let disk = self.disk_mut(&info.disk_id)?;
        disk.smart_info = Some(info);
        Ok(())
    }

    /// Replace the graph with a fresh enumeration.
    ///
    /// Managed mount points and collaborator snapshots survive on disks and
    /// partitions that are still present. A vanished partition or disk with a
    /// mounted mount point is kept with that mount point marked invalid;
    /// anything else that vanished is dropped. On error the map is unchanged.
    pub fn reconcile(&mut self, scanned: Vec<Disk>) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut next = DiskMap::new();

        for mut disk in scanned {
            if disk.id.is_empty() {
                warn!("skipping enumerated disk without an id");
                continue;
            }
            match self.disks.get(&disk.id) {
                Some(existing) => carry_over(existing, &mut disk, &mut report),
                None => report.added.push(disk.id.clone()),
            }
            next.add_or_update(disk)?;
        }

        for (id, existing) in &self.disks {
            if next.disks.contains_key(id) {
                continue;
            }
            let mut kept = existing.clone();
            kept.partitions.retain(|_, partition| {
                partition.mount_point_data.values().any(|mp| mp.is_mounted)
            });
            if kept.partitions.is_empty() {
                report.removed.push(id.clone());
                continue;
            }
            for partition in kept.partitions.values_mut() {
                invalidate_mounted(partition, "device disconnected", &mut report);
            }
            next.add_or_update(kept)?;
        }

        *self = next;
        Ok(report)
    }
}

fn carry_over(existing: &Disk, disk: &mut Disk, report: &mut ReconcileReport) {
    if disk.smart_info.is_none() {
        disk.smart_info.clone_from(&existing.smart_info);
    }
    if disk.hdidle_status.is_none() {
        disk.hdidle_status.clone_from(&existing.hdidle_status);
    }

    for (partition_id, old) in &existing.partitions {
        match disk.partitions.get_mut(partition_id) {
            Some(partition) => {
                for (path, mp) in &old.mount_point_data {
                    let mut mp = mp.clone();
                    // the device is back
                    mp.is_invalid = false;
                    mp.invalid_error = None;
                    partition.mount_point_data.entry(path.clone()).or_insert(mp);
                }
            }
            None if old.mount_point_data.values().any(|mp| mp.is_mounted) => {
                let mut kept = old.clone();
                invalidate_mounted(&mut kept, "partition no longer present", report);
                kept.mount_point_data.retain(|_, mp| mp.is_invalid);
                disk.partitions.insert(partition_id.clone(), kept);
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nas_contracts::StorageErrorKind;

    fn map_with_partition() -> DiskMap {
        let mut map = DiskMap::new();
        map.add_or_update(Disk::new("d1")).expect("add disk");
        map.add_partition("d1", Partition::new("p1")).expect("add partition");
        map
    }

    fn mounted(path: &str) -> MountPointData {
        let mut mp = MountPointData::new(path);
        mp.is_mounted = true;
        mp
    }

    #[test]
    fn disk_partition_mount_point_round_trip() {
        let mut map = map_with_partition();
        map.add_or_update_mount_point("d1", "p1", MountPointData::new("/mnt/x"))
            .expect("add mount point");

        let mp = map.get_mount_point("d1", "p1", "/mnt/x").expect("mount point");
        assert_eq!(mp.path, "/mnt/x");
        assert_eq!(mp.device_id, "p1");
        assert_eq!(mp.disk_id.as_deref(), Some("d1"));
        assert_eq!(mp.partition_id.as_deref(), Some("p1"));
    }

    #[test]
    fn empty_disk_id_is_invalid() {
        let err = DiskMap::new().add_or_update(Disk::new("")).unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::InvalidParameter);
    }

    #[test]
    fn missing_ancestors_are_never_created() {
        let mut map = DiskMap::new();
        let err = map.add_partition("ghost", Partition::new("p1")).unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound);
        assert!(map.get("ghost").is_none());

        let mut map = map_with_partition();
        let err = map
            .add_or_update_mount_point("d1", "p9", MountPointData::new("/mnt/x"))
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound);
        assert!(map.get_partition("d1", "p9").is_none());
    }

    #[test]
    fn missing_partition_wins_over_a_path_clash() {
        let mut map = map_with_partition();
        map.add_or_update_mount_point("d1", "p1", MountPointData::new("/mnt/x"))
            .expect("add mount point");

        let err = map
            .add_or_update_mount_point("d1", "p9", MountPointData::new("/mnt/x"))
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound);
    }

    #[test]
    fn upsert_keeps_latest_content() {
        let mut map = DiskMap::new();
        let mut first = Disk::new("d1");
        first.model = Some("first".into());
        let mut second = Disk::new("d1");
        second.model = Some("second".into());

        map.add_or_update(first).expect("first");
        map.add_or_update(second).expect("second");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("d1").and_then(|d| d.model.as_deref()), Some("second"));
    }

    #[test]
    fn upsert_rekeys_partitions_and_back_references() {
        let mut disk = Disk::new("d1");
        let mut partition = Partition::new("p1");
        partition.disk_id = "someone-else".into();
        let mut mp = MountPointData::new("/mnt/a");
        mp.disk_id = Some("wrong".into());
        partition.mount_point_data.insert("stale-key".into(), mp);
        disk.partitions.insert("wrong-key".into(), partition);

        let mut map = DiskMap::new();
        map.add_or_update(disk).expect("add disk");

        let stored = map.get("d1").expect("disk");
        let (key, partition) = stored.partitions.iter().next().expect("partition");
        assert_eq!(key, &partition.id);
        assert_eq!(partition.disk_id, "d1");
        let (path, mp) = partition.mount_point_data.iter().next().expect("mount point");
        assert_eq!(path, &mp.path);
        assert_eq!(mp.disk_id.as_deref(), Some("d1"));
    }

    #[test]
    fn removal_reports_presence() {
        let mut map = map_with_partition();
        map.add_or_update_mount_point("d1", "p1", MountPointData::new("/mnt/x"))
            .expect("add");

        assert_eq!(map.remove_mount_point("d1", "p1", "/mnt/x"), Ok(true));
        assert_eq!(map.remove_mount_point("d1", "p1", "/mnt/x"), Ok(false));
        assert!(map.get_mount_point("d1", "p1", "/mnt/x").is_none());

        assert_eq!(map.remove_partition("d1", "p1"), Ok(true));
        assert_eq!(map.remove_partition("d1", "p1"), Ok(false));

        assert!(map.remove("d1"));
        assert!(!map.remove("d1"));
        assert!(map.get("d1").is_none());
    }

    #[test]
    fn partition_id_is_unique_across_disks() {
        let mut map = map_with_partition();
        map.add_or_update(Disk::new("d2")).expect("add d2");
        let err = map.add_partition("d2", Partition::new("p1")).unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Conflict);
    }

    #[test]
    fn mount_path_is_unique_within_a_disk() {
        let mut map = map_with_partition();
        map.add_partition("d1", Partition::new("p2")).expect("p2");
        map.add_or_update_mount_point("d1", "p1", MountPointData::new("/mnt/x"))
            .expect("p1 mount");
        let err = map
            .add_or_update_mount_point("d1", "p2", MountPointData::new("/mnt/x"))
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::Conflict);
    }

    #[test]
    fn share_attach_detach_round_trip() {
        let mut map = map_with_partition();
        map.add_or_update_mount_point("d1", "p1", MountPointData::new("/mnt/media"))
            .expect("add");

        let mut share = SharedResource::new("media");
        share.mount_point_data = Some(Box::new(MountPointData::new("/mnt/media")));
        assert_eq!(map.add_mount_point_share(&share).as_deref(), Ok("d1"));
        let attached = map
            .get_mount_point("d1", "p1", "/mnt/media")
            .and_then(|mp| mp.share.as_deref())
            .expect("share attached");
        assert_eq!(attached.mount_path(), Some("/mnt/media"));

        assert_eq!(map.remove_mount_point_share("media").as_deref(), Some("d1"));
        let mp = map.get_mount_point("d1", "p1", "/mnt/media").expect("still present");
        assert!(mp.share.is_none());
        assert_eq!(map.remove_mount_point_share("media"), None);
    }

    #[test]
    fn share_without_target_is_rejected() {
        let mut map = map_with_partition();
        let share = SharedResource::new("media");
        let err = map.add_mount_point_share(&share).unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::InvalidParameter);

        let mut share = SharedResource::new("media");
        share.mount_point_data = Some(Box::new(MountPointData::new("/mnt/nowhere")));
        let err = map.add_mount_point_share(&share).unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound);
    }

    #[test]
    fn snapshots_attach_by_their_disk_id() {
        let mut map = map_with_partition();
        let info = SmartInfo {
            disk_id: "d1".into(),
            supported: true,
            ..Default::default()
        };
        map.add_smart_info(info).expect("smart");
        assert!(map.get("d1").and_then(|d| d.smart_info.as_ref()).is_some());

        let err = map
            .add_hdidle_device(HdIdleDeviceStatus {
                disk_id: "ghost".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::NotFound);
        let err = map.add_hdidle_device(HdIdleDeviceStatus::default()).unwrap_err();
        assert_eq!(err.kind(), StorageErrorKind::InvalidParameter);
    }

    #[test]
    fn update_cannot_move_a_mount_point() {
        let mut map = map_with_partition();
        map.add_or_update_mount_point("d1", "p1", MountPointData::new("/mnt/x"))
            .expect("add");
        let location = map.locate_mount_point("/mnt/x").expect("located");
        map.update_mount_point(&location, |mp| {
            mp.is_mounted = true;
            mp.path = "/elsewhere".into();
        })
        .expect("update");

        let mp = map.get_mount_point("d1", "p1", "/mnt/x").expect("same key");
        assert!(mp.is_mounted);
        assert_eq!(mp.path, "/mnt/x");
    }

    #[test]
    fn reconcile_keeps_managed_mounts_and_invalidates_vanished() {
        let mut map = map_with_partition();
        map.add_partition("d1", Partition::new("p2")).expect("p2");
        map.add_or_update_mount_point("d1", "p1", mounted("/mnt/one"))
            .expect("one");
        map.add_or_update_mount_point("d1", "p2", mounted("/mnt/two"))
            .expect("two");
        map.add_or_update(Disk::new("idle")).expect("idle disk");

        // p2 and the idle disk disappear, a new disk shows up
        let mut rescanned = Disk::new("d1");
        rescanned.partitions.insert("p1".into(), Partition::new("p1"));
        let report = map
            .reconcile(vec![rescanned, Disk::new("d3")])
            .expect("reconcile");

        assert_eq!(report.added, vec!["d3"]);
        assert_eq!(report.removed, vec!["idle"]);
        assert_eq!(report.invalidated, vec!["/mnt/two"]);

        let kept = map.get_mount_point("d1", "p1", "/mnt/one").expect("kept");
        assert!(kept.is_mounted && !kept.is_invalid);
        let gone = map.get_mount_point("d1", "p2", "/mnt/two").expect("kept invalid");
        assert!(gone.is_invalid);
        assert!(gone.invalid_error.is_some());
        assert!(map.get("idle").is_none());
    }

    #[test]
    fn reconcile_keeps_disconnected_disk_with_mounts() {
        let mut map = map_with_partition();
        map.add_or_update_mount_point("d1", "p1", mounted("/mnt/usb"))
            .expect("mount");
        let report = map.reconcile(Vec::new()).expect("reconcile");
        assert_eq!(report.invalidated, vec!["/mnt/usb"]);
        assert!(
            map.get_mount_point("d1", "p1", "/mnt/usb")
                .is_some_and(|mp| mp.is_invalid)
        );

        // reappearing clears the marker
        let mut back = Disk::new("d1");
        back.partitions.insert("p1".into(), Partition::new("p1"));
        map.reconcile(vec![back]).expect("reconcile");
        assert!(
            map.get_mount_point("d1", "p1", "/mnt/usb")
                .is_some_and(|mp| !mp.is_invalid && mp.invalid_error.is_none())
        );
    }
}
