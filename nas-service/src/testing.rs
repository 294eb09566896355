// SPDX-License-Identifier: GPL-3.0-only

//! In-process collaborators for exercising the services without a host.
//!
//! Nothing here touches block devices, runs a process or calls mount(2).
//! Each fake records what it was asked to do so tests can assert on it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use nas_contracts::{
    CommandOutput, DeviceEnumerator, DeviceResolver, HostTools, MountEntry, MountOps,
    MountRequest, OperationContext, Result, StorageError,
};
use nas_types::Disk;

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Kernel modules every fake host reports
const KERNEL_MODULES: &[&str] = &["ext4", "vfat", "ntfs", "ntfs3", "btrfs", "xfs", "exfat"];

/// Superblock bytes an ext4 probe recognises
pub fn ext4_header() -> Vec<u8> {
    let mut header = vec![0u8; 2048];
    header[1080] = 0x53;
    header[1081] = 0xEF;
    header
}

/// PATH lookups, tool runs and the set of mounted device sources
#[derive(Default)]
pub struct FakeHost {
    tools: BTreeSet<String>,
    outputs: Mutex<BTreeMap<String, CommandOutput>>,
    mounted: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
    mount_table: Option<Arc<FakeMounts>>,
}

impl FakeHost {
    pub fn with_tools(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Also report devices mounted through `mounts` as mounted
    pub fn watching(mut self, mounts: Arc<FakeMounts>) -> Self {
        self.mount_table = Some(mounts);
        self
    }

    /// Canned result for every later run of `program`
    pub fn respond(&self, program: &str, exit_code: i32, stdout: &str) {
        locked(&self.outputs).insert(
            program.to_string(),
            CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        locked(&self.calls).clone()
    }

    pub fn set_mounted(&self, device: &str, mounted: bool) {
        let mut set = locked(&self.mounted);
        if mounted {
            set.insert(device.to_string());
        } else {
            set.remove(device);
        }
    }
}

#[async_trait]
impl HostTools for FakeHost {
    fn command_exists(&self, program: &str) -> bool {
        self.tools.contains(program)
    }

    async fn run(
        &self,
        ctx: &OperationContext,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput> {
        ctx.ensure_active(program)?;
        locked(&self.calls).push((program.to_string(), args.to_vec()));
        Ok(locked(&self.outputs)
            .get(program)
            .cloned()
            .unwrap_or_default())
    }

    async fn kernel_filesystems(&self) -> Result<Vec<String>> {
        Ok(KERNEL_MODULES.iter().map(|m| m.to_string()).collect())
    }

    async fn is_device_mounted(&self, device: &str) -> Result<bool> {
        let in_table = self
            .mount_table
            .as_ref()
            .is_some_and(|mounts| mounts.has_source(device));
        Ok(in_table || locked(&self.mounted).contains(device))
    }
}

#[derive(Default)]
struct MountTable {
    entries: BTreeMap<String, MountEntry>,
    dirs: BTreeSet<String>,
    requests: Vec<MountRequest>,
    unmounts: Vec<String>,
    fail_next: Option<String>,
    delay: Option<Duration>,
}

/// Mount table kept in memory.
///
/// Like the kernel, a mount or unmount that has started is never abandoned:
/// the context is checked once up front, then the call sleeps through the
/// configured delay and lands in the table.
#[derive(Default)]
pub struct FakeMounts {
    table: Mutex<MountTable>,
}

impl FakeMounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend something outside the backend already mounted `source` at `target`
    pub fn occupy(&self, target: &str, source: &str, fs_type: &str) {
        locked(&self.table).entries.insert(
            target.to_string(),
            MountEntry {
                source: source.to_string(),
                target: target.to_string(),
                fs_type: fs_type.to_string(),
                options: vec!["rw".to_string()],
                super_options: Vec::new(),
            },
        );
    }

    /// Make the next mount call fail with `message`
    pub fn fail_next_mount(&self, message: &str) {
        locked(&self.table).fail_next = Some(message.to_string());
    }

    /// Every mount and unmount takes this long before it lands
    pub fn set_delay(&self, delay: Duration) {
        locked(&self.table).delay = Some(delay);
    }

    pub fn requests(&self) -> Vec<MountRequest> {
        locked(&self.table).requests.clone()
    }

    pub fn unmounts(&self) -> Vec<String> {
        locked(&self.table).unmounts.clone()
    }

    pub fn is_mounted(&self, target: &str) -> bool {
        locked(&self.table).entries.contains_key(target)
    }

    pub fn has_source(&self, source: &str) -> bool {
        locked(&self.table)
            .entries
            .values()
            .any(|entry| entry.source == source)
    }

    pub fn has_dir(&self, target: &str) -> bool {
        locked(&self.table).dirs.contains(target)
    }

    fn delay(&self) -> Option<Duration> {
        locked(&self.table).delay
    }
}

#[async_trait]
impl MountOps for FakeMounts {
    async fn prepare_target(&self, target: &str) -> Result<()> {
        locked(&self.table).dirs.insert(target.to_string());
        Ok(())
    }

    async fn remove_target(&self, target: &str) -> Result<()> {
        locked(&self.table).dirs.remove(target);
        Ok(())
    }

    async fn mount(&self, ctx: &OperationContext, request: &MountRequest) -> Result<MountEntry> {
        ctx.ensure_active("mount")?;
        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }

        let mut table = locked(&self.table);
        table.requests.push(request.clone());
        if let Some(message) = table.fail_next.take() {
            return Err(StorageError::MountFail {
                device: request.source.clone(),
                path: request.target.clone(),
                message,
            });
        }
        if table.entries.contains_key(&request.target) {
            return Err(StorageError::MountFail {
                device: request.source.clone(),
                path: request.target.clone(),
                message: "Device or resource busy".to_string(),
            });
        }
        let read_only = request.flags & u64::from(libc::MS_RDONLY) != 0;
        let entry = MountEntry {
            source: request.source.clone(),
            target: request.target.clone(),
            fs_type: request.fs_type.clone(),
            options: vec![if read_only { "ro" } else { "rw" }.to_string()],
            super_options: request
                .data
                .split(',')
                .filter(|opt| !opt.is_empty())
                .map(ToString::to_string)
                .collect(),
        };
        table.entries.insert(request.target.clone(), entry.clone());
        Ok(entry)
    }

    async fn unmount(
        &self,
        ctx: &OperationContext,
        target: &str,
        _force: bool,
        _lazy: bool,
    ) -> Result<()> {
        ctx.ensure_active("unmount")?;
        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }

        let mut table = locked(&self.table);
        table.unmounts.push(target.to_string());
        match table.entries.remove(target) {
            Some(_) => Ok(()),
            None => Err(StorageError::UnmountFail {
                path: target.to_string(),
                message: "Invalid argument".to_string(),
            }),
        }
    }

    async fn mount_info(&self, target: &str) -> Result<Option<MountEntry>> {
        Ok(locked(&self.table).entries.get(target).cloned())
    }

    async fn mounts(&self) -> Result<Vec<MountEntry>> {
        Ok(locked(&self.table).entries.values().cloned().collect())
    }
}

/// Identifier aliases and device headers
#[derive(Default)]
pub struct FakeResolver {
    aliases: Mutex<BTreeMap<String, String>>,
    headers: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl FakeResolver {
    /// Each device resolves to itself
    pub fn with_devices(devices: &[&str]) -> Self {
        let resolver = Self::default();
        for device in devices {
            resolver.alias(device, device);
        }
        resolver
    }

    pub fn alias(&self, identifier: &str, device: &str) {
        locked(&self.aliases).insert(identifier.to_string(), device.to_string());
    }

    pub fn set_header(&self, device: &str, header: Vec<u8>) {
        locked(&self.headers).insert(device.to_string(), header);
    }
}

#[async_trait]
impl DeviceResolver for FakeResolver {
    async fn resolve(&self, identifier: &str) -> Result<String> {
        locked(&self.aliases)
            .get(identifier)
            .cloned()
            .ok_or_else(|| StorageError::device_not_found(identifier))
    }

    async fn read_header(&self, device: &str, len: usize) -> Result<Vec<u8>> {
        let mut header = locked(&self.headers)
            .get(device)
            .cloned()
            .ok_or_else(|| StorageError::device_not_found(device))?;
        header.truncate(len);
        Ok(header)
    }
}

/// Enumeration result set by the test
#[derive(Default)]
pub struct FakeEnumerator {
    disks: Mutex<Vec<Disk>>,
}

impl FakeEnumerator {
    pub fn new(disks: Vec<Disk>) -> Self {
        Self {
            disks: Mutex::new(disks),
        }
    }

    pub fn set_disks(&self, disks: Vec<Disk>) {
        *locked(&self.disks) = disks;
    }
}

#[async_trait]
impl DeviceEnumerator for FakeEnumerator {
    async fn enumerate(&self, ctx: &OperationContext) -> Result<Vec<Disk>> {
        ctx.ensure_active("enumerate devices")?;
        Ok(locked(&self.disks).clone())
    }
}

/// Every fake behind one handle, for building a backend in tests
#[derive(Clone)]
pub struct FakeHostSet {
    pub host: Arc<FakeHost>,
    pub mounts: Arc<FakeMounts>,
    pub resolver: Arc<FakeResolver>,
    pub enumerator: Arc<FakeEnumerator>,
}

impl FakeHostSet {
    /// The host sees every device mounted through `mounts` as busy
    pub fn new(tools: &[&str]) -> Self {
        let mounts = Arc::new(FakeMounts::new());
        Self {
            host: Arc::new(FakeHost::with_tools(tools).watching(mounts.clone())),
            mounts,
            resolver: Arc::new(FakeResolver::default()),
            enumerator: Arc::new(FakeEnumerator::default()),
        }
    }
}
