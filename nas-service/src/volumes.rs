// SPDX-License-Identifier: GPL-3.0-only

//! Volume lifecycle: mount, unmount and rescan against the topology
//!
//! Every operation on a mount path holds that path's lock for its whole
//! duration, so requests for one mount point run strictly one after another.
//! Mount and unmount also hold the device lock shared with
//! [`FilesystemService`], which serializes them with format and relabel.
//! Locks are always taken paths first, then the device.
//!
//! A mount or unmount syscall is never abandoned half way. Cancellation is
//! checked before it starts; a request cancelled while the kernel works gets
//! `Cancelled` back only after the outcome has been recorded.
//!
//! The topology lock is only taken for short in-memory reads and writes,
//! never across a syscall or tool run.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nas_contracts::{
    DeviceEnumerator, MountEntry, MountOps, MountPointRecord, MountPointRepository,
    MountRequest, OperationContext, Result, StorageError, StorageErrorKind,
};
use nas_events::Broadcaster;
use nas_filesystems::{Capability, ensure_capability};
use nas_topology::{DiskMap, ReconcileReport, TopologyStore};
use nas_types::{
    Disk, HdIdleDeviceStatus, MountFlag, MountPointData, MountState, SmartInfo,
    TimeMachineSupport,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dirty::{DirtyCategory, DirtyDataService};
use crate::filesystems::FilesystemService;
use crate::locks::PathLocks;
use crate::shares::ShareService;

/// Highest `_(n)` suffix tried when the requested path is taken
const MAX_PATH_SUFFIX: u32 = 100;

/// Time Machine suitability of a filesystem type
pub fn time_machine_support(fs_type: &str) -> TimeMachineSupport {
    match fs_type {
        "ext2" | "ext3" | "ext4" | "jfs" | "squashfs" | "xfs" | "btrfs" | "zfs" | "ubifs"
        | "yaffs2" | "reiserfs" | "reiserfs4" | "orangefs" | "lustre" | "ocfs2" => {
            TimeMachineSupport::Supported
        }
        "ntfs" | "ntfs3" => TimeMachineSupport::Experimental,
        "vfat" | "msdos" | "iso9660" | "erofs" | "exfat" => TimeMachineSupport::Unsupported,
        _ => TimeMachineSupport::Unknown,
    }
}

/// Disk and partition owning the first hint that names a partition or its device
fn owning_partition(map: &DiskMap, hints: &[&str]) -> Option<(String, String)> {
    hints.iter().filter(|hint| !hint.is_empty()).find_map(|&hint| {
        map.disks().find_map(|disk| {
            disk.partitions
                .values()
                .find(|p| {
                    p.id == *hint
                        || p.device_path.as_deref() == Some(hint)
                        || p.legacy_device_path.as_deref() == Some(hint)
                        || p.legacy_device_name.as_deref() == Some(hint)
                })
                .map(|p| (disk.id.clone(), p.id.clone()))
        })
    })
}

/// Mount parameters after merging a request over its persisted record
struct MountPlan {
    record: MountPointRecord,
    path: String,
    fs_type: Option<String>,
    flags: Vec<MountFlag>,
    custom_flags: Vec<MountFlag>,
    partition_hint: Option<String>,
}

impl MountPlan {
    /// Non-empty request fields override the record
    fn new(id: &str, record: MountPointRecord, request: MountPointData) -> Result<Self> {
        if !request.device_id.is_empty() && request.device_id != record.device {
            return Err(StorageError::invalid_parameter(format!(
                "mount point {id} belongs to {}, not {}",
                record.device, request.device_id
            )));
        }
        if record.device.trim().is_empty() {
            return Err(StorageError::invalid_parameter(format!(
                "mount point {id} has no source device"
            )));
        }

        let path = if request.path.trim().is_empty() {
            record.path.clone()
        } else {
            request.path.trim().to_string()
        };
        if path.is_empty() {
            return Err(StorageError::invalid_parameter(format!(
                "mount point {id} has no path"
            )));
        }
        if !Path::new(&path).is_absolute() {
            return Err(StorageError::invalid_parameter(format!(
                "mount path {path} is not absolute"
            )));
        }

        let fs_type = request
            .fs_type
            .filter(|fs| !fs.trim().is_empty())
            .or_else(|| record.fs_type.clone().filter(|fs| !fs.trim().is_empty()));
        let (flags, custom_flags) = if request.flags.is_empty() && request.custom_flags.is_empty()
        {
            (record.flags.clone(), record.custom_flags.clone())
        } else {
            (request.flags, request.custom_flags)
        };

        Ok(Self {
            record,
            path,
            fs_type,
            flags,
            custom_flags,
            partition_hint: request.partition_id,
        })
    }
}

/// Where and what the kernel actually mounted
struct Mounted {
    device: String,
    target: String,
    fs_type: String,
    entry: MountEntry,
}

pub struct VolumeService {
    store: Arc<TopologyStore>,
    filesystems: Arc<FilesystemService>,
    mounts: Arc<dyn MountOps>,
    enumerator: Arc<dyn DeviceEnumerator>,
    records: Arc<dyn MountPointRepository>,
    shares: Arc<ShareService>,
    broadcaster: Arc<Broadcaster>,
    dirty: Arc<DirtyDataService>,
    locks: PathLocks,
    states: Mutex<HashMap<String, MountState>>,
    last_rescan: Mutex<Option<DateTime<Utc>>>,
    timeout: Option<Duration>,
}

impl VolumeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<TopologyStore>,
        filesystems: Arc<FilesystemService>,
        mounts: Arc<dyn MountOps>,
        enumerator: Arc<dyn DeviceEnumerator>,
        records: Arc<dyn MountPointRepository>,
        shares: Arc<ShareService>,
        broadcaster: Arc<Broadcaster>,
        dirty: Arc<DirtyDataService>,
    ) -> Self {
        Self {
            store,
            filesystems,
            mounts,
            enumerator,
            records,
            shares,
            broadcaster,
            dirty,
            locks: PathLocks::new(),
            states: Mutex::new(HashMap::new()),
            last_rescan: Mutex::new(None),
            timeout: None,
        }
    }

    /// Upper bound for a single mount, unmount or rescan
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn scoped(&self, ctx: &OperationContext) -> OperationContext {
        match self.timeout {
            Some(timeout) => ctx.child().with_timeout(timeout),
            None => ctx.child(),
        }
    }

    fn set_state(&self, path: &str, state: MountState) {
        debug!(path, ?state, "mount state");
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), state);
    }

    /// Last recorded lifecycle state of the mount point at `path`
    pub fn mount_state(&self, path: &str) -> Option<MountState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied()
    }

    pub fn last_rescan(&self) -> Option<DateTime<Utc>> {
        *self.last_rescan.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current topology snapshot
    pub fn list(&self) -> Vec<Disk> {
        self.store.snapshot()
    }

    pub fn mount_point(&self, path: &str) -> Option<MountPointData> {
        self.store
            .read(|map| map.get_mount_point_by_path(path).cloned())
    }

    fn publish_volumes(&self) {
        if let Err(e) = self.broadcaster.broadcast(&self.store.snapshot()) {
            warn!(error = %e, "cannot broadcast volumes");
        }
    }

    /// Mount the persisted mount point `id`.
    ///
    /// Empty fields of `request` fall back to the persisted record. When the
    /// path is held by another device the first free `<path>_(n)` is used
    /// instead, and the record is saved with the path actually mounted.
    pub async fn mount(
        &self,
        ctx: &OperationContext,
        id: &str,
        request: MountPointData,
    ) -> Result<MountPointData> {
        if id.trim().is_empty() {
            return Err(StorageError::invalid_parameter("mount point id is empty"));
        }
        let ctx = self.scoped(ctx);
        let record = self
            .records
            .find(id)
            .await?
            .ok_or_else(|| StorageError::not_found(format!("mount point {id}")))?;
        let plan = MountPlan::new(id, record, request)?;

        let _path_guard = self.locks.lock(&plan.path).await;
        ctx.ensure_active("mount")?;

        let device = self.filesystems.resolve_device(&plan.record.device).await?;
        let mut target = self.free_target(&plan.path, &device).await?;
        // a suffixed target may be requested directly by someone else
        let _target_guard = if target == plan.path {
            None
        } else {
            let guard = self.locks.lock(&target).await;
            let recheck = self.free_target(&target, &device).await?;
            if recheck != target {
                return Err(StorageError::conflict(format!(
                    "mount path {target} was taken while waiting for it"
                )));
            }
            Some(guard)
        };
        let _device_guard = self.filesystems.lock_device(&device).await;
        if target == plan.path {
            // the device lock may have waited behind a mount of this path
            target = self.free_target(&plan.path, &device).await?;
            if target != plan.path {
                return Err(StorageError::conflict(format!(
                    "mount path {} was taken while waiting for {device}",
                    plan.path
                )));
            }
        }

        let fs_type = match plan.fs_type.clone() {
            Some(fs_type) => fs_type,
            None => self
                .filesystems
                .detect_device(&device)
                .await?
                .ok_or_else(|| {
                    StorageError::invalid_parameter(format!(
                        "cannot detect the filesystem on {device}; specify fs_type"
                    ))
                })?,
        };

        // unregistered types go straight to the kernel
        let registry = self.filesystems.registry();
        let (fs_name, kernel_type) = match registry.get(&fs_type) {
            Some(adapter) => {
                let support = adapter.is_supported(&ctx).await?;
                ensure_capability(adapter.name(), &support, Capability::Mount)?;
                (
                    adapter.name().to_string(),
                    adapter.linux_fs_module().to_string(),
                )
            }
            None => (fs_type.clone(), fs_type.clone()),
        };

        let requested: Vec<MountFlag> = plan
            .flags
            .iter()
            .chain(plan.custom_flags.iter())
            .cloned()
            .collect();
        let syscall = registry.catalog().to_syscall(&requested)?;

        let mount_request = MountRequest {
            source: device.clone(),
            target: target.clone(),
            fs_type: kernel_type,
            flags: syscall.bits,
            data: syscall.data,
        };

        ctx.ensure_active("mount")?;
        self.set_state(&target, MountState::Mounting);
        self.mounts.prepare_target(&target).await?;
        info!(%device, path = %target, fs_type = %fs_name, options = %mount_request.data, "mounting");

        let entry = match self.mounts.mount(&ctx, &mount_request).await {
            Ok(entry) => entry,
            Err(e) => {
                // the call has settled; trust the OS table over the error
                if e.kind() == StorageErrorKind::Cancelled
                    && let Ok(Some(entry)) = self.mounts.mount_info(&target).await
                    && entry.source == device
                {
                    warn!(%device, path = %target, "mount completed despite cancellation");
                    let mounted = Mounted {
                        device,
                        target,
                        fs_type: fs_name,
                        entry,
                    };
                    self.commit_mount(&plan, mounted).await;
                    return Err(e);
                }
                warn!(%device, path = %target, error = %e, "mount failed");
                if let Err(cleanup) = self.mounts.remove_target(&target).await {
                    warn!(path = %target, error = %cleanup, "cannot remove mount directory");
                }
                self.set_state(&target, MountState::MountFailed);
                return Err(e);
            }
        };

        let mounted = Mounted {
            device,
            target,
            fs_type: fs_name,
            entry,
        };
        let mp = self.commit_mount(&plan, mounted).await;
        if ctx.is_cancelled() {
            warn!(path = %mp.path, "mount completed after cancellation");
            return Err(StorageError::cancelled(format!(
                "mount of {}: request cancelled after the kernel mounted it",
                mp.path
            )));
        }
        Ok(mp)
    }

    /// First of `path`, `path_(1)`, `path_(2)`, ... with nothing mounted on it
    async fn free_target(&self, path: &str, device: &str) -> Result<String> {
        let mut candidate = path.to_string();
        for suffix in 1..=MAX_PATH_SUFFIX {
            match self.mounts.mount_info(&candidate).await? {
                None => return Ok(candidate),
                Some(entry) if entry.source == device => {
                    return Err(StorageError::AlreadyMounted {
                        device: device.to_string(),
                        path: candidate,
                    });
                }
                Some(entry) => {
                    debug!(path = %candidate, source = %entry.source, "mount path taken");
                    candidate = format!("{path}_({suffix})");
                }
            }
        }
        Err(StorageError::conflict(format!(
            "no free mount path left for {path}"
        )))
    }

    /// Record a mount the kernel accepted: persisted record, topology, share
    async fn commit_mount(&self, plan: &MountPlan, mounted: Mounted) -> MountPointData {
        let mut saved = plan.record.clone();
        saved.path.clone_from(&mounted.target);
        saved.fs_type = Some(mounted.fs_type.clone());
        saved.flags.clone_from(&plan.flags);
        saved.custom_flags.clone_from(&plan.custom_flags);

        // the OS state is authoritative from here on; a persistence failure
        // only costs the canonical re-read
        if let Err(e) = self.records.save(saved.clone()).await {
            warn!(id = %saved.id, error = %e, "cannot save mount point record");
        }
        let canonical = match self.records.find(&saved.id).await {
            Ok(Some(record)) => record,
            Ok(None) => saved,
            Err(e) => {
                warn!(id = %saved.id, error = %e, "cannot re-read mount point record");
                saved
            }
        };

        let mut mp = MountPointData::new(mounted.target.clone());
        mp.device_id.clone_from(&canonical.device);
        mp.fs_type = canonical.fs_type.clone();
        mp.flags = canonical.flags;
        mp.custom_flags = canonical.custom_flags;
        mp.is_mounted = true;
        mp.is_write_supported = !mounted.entry.is_read_only();
        mp.time_machine_support = Some(time_machine_support(&mounted.fs_type));
        mp.is_to_mount_at_startup = canonical.is_to_mount_at_startup;

        let hints = [
            plan.partition_hint.as_deref().unwrap_or_default(),
            mounted.device.as_str(),
            canonical.device.as_str(),
        ];
        let owner = self.store.read(|map| owning_partition(map, &hints));
        match owner {
            Some((disk_id, partition_id)) => {
                let inserted = self.store.write(|map| -> Result<Option<MountPointData>> {
                    map.add_or_update_mount_point(&disk_id, &partition_id, mp.clone())?;
                    Ok(map
                        .get_mount_point(&disk_id, &partition_id, &mounted.target)
                        .cloned())
                });
                match inserted {
                    Ok(Some(stored)) => mp = stored,
                    Ok(None) => {}
                    Err(e) => warn!(path = %mounted.target, error = %e, "cannot record mount point"),
                }
                match self.shares.attach(&mp).await {
                    Ok(Some(_)) => {
                        if let Some(current) = self.mount_point(&mounted.target) {
                            mp = current;
                        }
                        self.shares.publish().await;
                    }
                    Ok(None) => {}
                    Err(e) => warn!(path = %mounted.target, error = %e, "cannot attach share"),
                }
            }
            None => warn!(
                device = %mounted.device,
                path = %mounted.target,
                "mounted device is not in the topology"
            ),
        }

        self.set_state(&mounted.target, MountState::Mounted);
        info!(device = %mounted.device, path = %mounted.target, read_only = !mp.is_write_supported, "mounted");
        self.dirty.mark(DirtyCategory::Volumes);
        self.publish_volumes();
        mp
    }

    /// Unmount the persisted mount point `id`; `force` and `lazy` go to the OS as is
    pub async fn unmount(
        &self,
        ctx: &OperationContext,
        id: &str,
        force: bool,
        lazy: bool,
    ) -> Result<()> {
        let ctx = self.scoped(ctx);
        let record = self
            .records
            .find(id)
            .await?
            .ok_or_else(|| StorageError::not_found(format!("mount point {id}")))?;
        let path = record.path;

        let _path_guard = self.locks.lock(&path).await;
        ctx.ensure_active("unmount")?;
        let _device_guard = match self.mounts.mount_info(&path).await {
            Ok(Some(entry)) => Some(self.filesystems.lock_device(&entry.source).await),
            _ => None,
        };
        ctx.ensure_active("unmount")?;

        self.set_state(&path, MountState::Unmounting);
        info!(%path, force, lazy, "unmounting");

        if let Err(e) = self.mounts.unmount(&ctx, &path, force, lazy).await {
            let gone = e.kind() == StorageErrorKind::Cancelled
                && matches!(self.mounts.mount_info(&path).await, Ok(None));
            if gone {
                warn!(%path, "unmount completed despite cancellation");
                self.forget_mount(&path).await;
            } else {
                warn!(%path, error = %e, "unmount failed");
                self.set_state(&path, MountState::UnmountFailed);
            }
            return Err(e);
        }

        self.forget_mount(&path).await;
        if ctx.is_cancelled() {
            warn!(%path, "unmount completed after cancellation");
            return Err(StorageError::cancelled(format!(
                "unmount of {path}: request cancelled after the kernel unmounted it"
            )));
        }
        Ok(())
    }

    async fn forget_mount(&self, path: &str) {
        if let Err(e) = self.mounts.remove_target(path).await {
            warn!(path, error = %e, "cannot remove mount directory");
        }
        if let Some(share) = self.shares.detach_at(path) {
            debug!(path, %share, "share detached");
            self.shares.publish().await;
        }
        let removed = self.store.write(|map| match map.locate_mount_point(path) {
            Some(location) => {
                map.remove_mount_point(&location.disk_id, &location.partition_id, path)
            }
            None => Ok(false),
        });
        if let Err(e) = removed {
            warn!(path, error = %e, "cannot drop mount point");
        }

        self.set_state(path, MountState::Unmounted);
        info!(path, "unmounted");
        self.dirty.mark(DirtyCategory::Volumes);
        self.publish_volumes();
    }

    /// Re-enumerate devices and reconcile the topology with what is present
    pub async fn rescan(&self, ctx: &OperationContext) -> Result<ReconcileReport> {
        let ctx = self.scoped(ctx);
        let disks = self.enumerator.enumerate(&ctx).await?;
        let report = self.store.write(|map| map.reconcile(disks))?;

        for path in &report.invalidated {
            warn!(%path, "device vanished while mounted");
            self.set_state(path, MountState::Invalid);
        }
        *self.last_rescan.lock().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());

        if report.is_empty() {
            debug!("rescan found no changes");
        } else {
            info!(
                added = report.added.len(),
                removed = report.removed.len(),
                invalidated = report.invalidated.len(),
                "topology reconciled"
            );
        }
        self.publish_volumes();
        Ok(report)
    }

    /// Mount every record flagged for startup; returns how many mounted
    pub async fn mount_startup_volumes(&self, ctx: &OperationContext) -> Result<usize> {
        let mut mounted = 0;
        for record in self.records.all().await? {
            if !record.is_to_mount_at_startup {
                continue;
            }
            match self.mount(ctx, &record.id, MountPointData::default()).await {
                Ok(mp) => {
                    debug!(id = %record.id, path = %mp.path, "startup mount");
                    mounted += 1;
                }
                Err(StorageError::AlreadyMounted { path, .. }) => {
                    info!(id = %record.id, %path, "already mounted at startup");
                }
                Err(e) => warn!(id = %record.id, error = %e, "startup mount failed"),
            }
        }
        Ok(mounted)
    }

    pub fn record_smart_info(&self, info: SmartInfo) -> Result<()> {
        self.store.write(|map| map.add_smart_info(info))?;
        self.publish_volumes();
        Ok(())
    }

    pub fn record_hdidle_status(&self, status: HdIdleDeviceStatus) -> Result<()> {
        self.store.write(|map| map.add_hdidle_device(status))?;
        self.publish_volumes();
        Ok(())
    }

    /// Rescan every `interval` until `cancel` fires
    pub fn spawn_rescans(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately and startup already rescanned
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let ctx = OperationContext::with_cancel(cancel.child_token());
                        if let Err(e) = self.rescan(&ctx).await {
                            warn!(error = %e, "periodic rescan failed");
                        }
                    }
                }
            }
            debug!("rescan loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nas_types::Partition;

    #[test]
    fn time_machine_follows_filesystem_family() {
        assert_eq!(time_machine_support("ext4"), TimeMachineSupport::Supported);
        assert_eq!(time_machine_support("ntfs3"), TimeMachineSupport::Experimental);
        assert_eq!(time_machine_support("exfat"), TimeMachineSupport::Unsupported);
        assert_eq!(time_machine_support("hfsplus"), TimeMachineSupport::Unknown);
    }

    #[test]
    fn owning_partition_matches_ids_and_device_paths() {
        let mut map = DiskMap::new();
        map.add_or_update(Disk::new("d1")).expect("disk");
        let mut partition = Partition::new("p1");
        partition.legacy_device_path = Some("/dev/sdb1".into());
        map.add_partition("d1", partition).expect("partition");

        let hit = Some(("d1".to_string(), "p1".to_string()));
        assert_eq!(owning_partition(&map, &["", "/dev/sdb1"]), hit);
        assert_eq!(owning_partition(&map, &["p1"]), hit);
        assert_eq!(owning_partition(&map, &["/dev/sdc1"]), None);
    }

    #[test]
    fn request_fields_override_the_record() {
        let record = MountPointRecord {
            id: "1".into(),
            path: "/mnt/data".into(),
            device: "/dev/sdb1".into(),
            fs_type: Some("ext4".into()),
            flags: vec![MountFlag::named("noatime")],
            ..Default::default()
        };

        let plan = MountPlan::new("1", record.clone(), MountPointData::default()).expect("plan");
        assert_eq!(plan.path, "/mnt/data");
        assert_eq!(plan.fs_type.as_deref(), Some("ext4"));
        assert_eq!(plan.flags, vec![MountFlag::named("noatime")]);

        let mut request = MountPointData::new("/mnt/other");
        request.flags = vec![MountFlag::named("ro")];
        let plan = MountPlan::new("1", record.clone(), request).expect("plan");
        assert_eq!(plan.path, "/mnt/other");
        assert_eq!(plan.flags, vec![MountFlag::named("ro")]);

        let mut request = MountPointData::new("relative");
        let err = MountPlan::new("1", record.clone(), request.clone()).err();
        assert_eq!(err.map(|e| e.code()), Some(400));

        request.path = String::new();
        request.device_id = "/dev/sdc1".into();
        let err = MountPlan::new("1", record, request).err();
        assert_eq!(err.map(|e| e.kind()), Some(StorageErrorKind::InvalidParameter));
    }
}
