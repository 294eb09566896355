// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nas_contracts::{
    CommandOutput, DeviceEnumerator, DeviceResolver, HostTools, MountEntry, MountOps,
    MountRequest, OperationContext, Result, StorageError,
};
use nas_types::Disk;
use tracing::debug;

use crate::conversions::{SysResultExt, command_output, mount_entry};

/// Host collaborators of the running daemon
pub struct SystemAdapters {
    pub host: Arc<dyn HostTools>,
    pub mounts: Arc<dyn MountOps>,
    pub resolver: Arc<dyn DeviceResolver>,
    pub enumerator: Arc<dyn DeviceEnumerator>,
}

/// `timeout` bounds tool runs whose request carries no deadline of its own
pub fn build_system_adapters(timeout: Option<Duration>) -> SystemAdapters {
    SystemAdapters {
        host: Arc::new(SystemHostTools::new(timeout)),
        mounts: Arc::new(SystemMountOps),
        resolver: Arc::new(SystemDeviceResolver),
        enumerator: Arc::new(LsblkEnumerator::new(timeout)),
    }
}

fn join_error(what: &str, e: tokio::task::JoinError) -> StorageError {
    StorageError::internal(format!("{what} task failed: {e}"))
}

#[derive(Debug, Clone, Default)]
pub struct SystemHostTools {
    timeout: Option<Duration>,
}

impl SystemHostTools {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl HostTools for SystemHostTools {
    fn command_exists(&self, program: &str) -> bool {
        nas_sys::command_exists(program)
    }

    async fn run(
        &self,
        ctx: &OperationContext,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput> {
        ctx.ensure_active(program)?;
        let timeout = ctx.remaining().or(self.timeout);
        nas_sys::run_capture(program, args, ctx.token(), timeout)
            .await
            .map(command_output)
            .into_storage()
    }

    async fn kernel_filesystems(&self) -> Result<Vec<String>> {
        nas_sys::read_kernel_filesystems().await.into_storage()
    }

    async fn is_device_mounted(&self, device: &str) -> Result<bool> {
        let mounts = nas_sys::read_mountinfo().await.into_storage()?;
        Ok(mounts.iter().any(|entry| entry.source == device))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMountOps;

#[async_trait]
impl MountOps for SystemMountOps {
    async fn prepare_target(&self, target: &str) -> Result<()> {
        nas_sys::create_mount_dir(target).await.into_storage()
    }

    async fn remove_target(&self, target: &str) -> Result<()> {
        nas_sys::remove_mount_dir(target).await.into_storage()
    }

    async fn mount(&self, ctx: &OperationContext, request: &MountRequest) -> Result<MountEntry> {
        ctx.ensure_active("mount")?;
        // never raced against cancellation: the blocking syscall would keep
        // running after its waiter is dropped
        nas_sys::mount_device(
            &request.source,
            &request.target,
            &request.fs_type,
            request.flags,
            &request.data,
        )
        .await
        .into_storage()?;

        match self.mount_info(&request.target).await? {
            Some(entry) => Ok(entry),
            None => {
                debug!(target = %request.target, "mount not visible in mountinfo yet");
                Ok(MountEntry {
                    source: request.source.clone(),
                    target: request.target.clone(),
                    fs_type: request.fs_type.clone(),
                    ..Default::default()
                })
            }
        }
    }

    async fn unmount(
        &self,
        ctx: &OperationContext,
        target: &str,
        force: bool,
        lazy: bool,
    ) -> Result<()> {
        ctx.ensure_active("unmount")?;
        nas_sys::unmount(target, force, lazy).await.into_storage()
    }

    async fn mount_info(&self, target: &str) -> Result<Option<MountEntry>> {
        let mounts = nas_sys::read_mountinfo().await.into_storage()?;
        // the last entry is the one on top when mounts are stacked
        Ok(mounts
            .into_iter()
            .rev()
            .find(|entry| entry.mount_point == target)
            .map(mount_entry))
    }

    async fn mounts(&self) -> Result<Vec<MountEntry>> {
        let mounts = nas_sys::read_mountinfo().await.into_storage()?;
        Ok(mounts.into_iter().map(mount_entry).collect())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDeviceResolver;

#[async_trait]
impl DeviceResolver for SystemDeviceResolver {
    async fn resolve(&self, identifier: &str) -> Result<String> {
        let identifier = identifier.to_string();
        let path = tokio::task::spawn_blocking(move || nas_sys::resolve_block_device(&identifier))
            .await
            .map_err(|e| join_error("resolve", e))?
            .into_storage()?;
        Ok(path.to_string_lossy().into_owned())
    }

    async fn read_header(&self, device: &str, len: usize) -> Result<Vec<u8>> {
        let device = PathBuf::from(device);
        tokio::task::spawn_blocking(move || nas_sys::read_device_header(&device, len))
            .await
            .map_err(|e| join_error("read header", e))?
            .into_storage()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LsblkEnumerator {
    timeout: Option<Duration>,
}

impl LsblkEnumerator {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl DeviceEnumerator for LsblkEnumerator {
    async fn enumerate(&self, ctx: &OperationContext) -> Result<Vec<Disk>> {
        ctx.ensure_active("enumerate devices")?;
        let timeout = ctx.remaining().or(self.timeout);
        nas_sys::enumerate_disks(ctx.token(), timeout)
            .await
            .into_storage()
    }
}
