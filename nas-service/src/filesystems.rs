// SPDX-License-Identifier: GPL-3.0-only

//! Format, check and label orchestration over the adapter registry

use std::sync::Arc;
use std::time::Duration;

use nas_contracts::{
    DeviceResolver, FilesystemAdapter, HostTools, OperationContext, Result, StorageError,
};
use nas_filesystems::{Capability, FilesystemRegistry, MAX_SIGNATURE_READ, ensure_capability};
use nas_topology::TopologyStore;
use nas_types::{CheckOptions, CheckResult, FilesystemInfo, FilesystemState, FormatOptions};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::dirty::{DirtyCategory, DirtyDataService};
use crate::locks::PathLocks;

pub struct FilesystemService {
    registry: Arc<FilesystemRegistry>,
    store: Arc<TopologyStore>,
    host: Arc<dyn HostTools>,
    resolver: Arc<dyn DeviceResolver>,
    dirty: Arc<DirtyDataService>,
    read_only: bool,
    timeout: Option<Duration>,
    devices: Arc<PathLocks>,
}

impl FilesystemService {
    pub fn new(
        registry: Arc<FilesystemRegistry>,
        store: Arc<TopologyStore>,
        host: Arc<dyn HostTools>,
        resolver: Arc<dyn DeviceResolver>,
        dirty: Arc<DirtyDataService>,
        read_only: bool,
    ) -> Self {
        Self {
            registry,
            store,
            host,
            resolver,
            dirty,
            read_only,
            timeout: None,
            devices: Arc::new(PathLocks::new()),
        }
    }

    /// Upper bound for tool runs, on top of the caller's own deadline
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Exclusive hold on a resolved block device.
    ///
    /// Mount, unmount, format, relabel and repair of one device run one after
    /// another; the busy check and the tool run happen under the same hold.
    pub async fn lock_device(&self, device: &str) -> OwnedMutexGuard<()> {
        self.devices.lock(device).await
    }

    pub fn registry(&self) -> &Arc<FilesystemRegistry> {
        &self.registry
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn scoped(&self, ctx: &OperationContext) -> OperationContext {
        match self.timeout {
            Some(timeout) => ctx.child().with_timeout(timeout),
            None => ctx.child(),
        }
    }

    fn ensure_writable(&self, operation: &str) -> Result<()> {
        if self.read_only {
            return Err(StorageError::permission_denied(format!(
                "{operation} refused: the system is in read-only mode"
            )));
        }
        Ok(())
    }

    /// Probing runs PATH lookups only, never the tools themselves
    async fn ensure_supported(
        &self,
        ctx: &OperationContext,
        adapter: &dyn FilesystemAdapter,
        capability: Capability,
    ) -> Result<()> {
        let support = adapter.is_supported(ctx).await?;
        ensure_capability(adapter.name(), &support, capability)
    }

    async fn adapter_for(
        &self,
        ctx: &OperationContext,
        fs_type: &str,
        capability: Capability,
    ) -> Result<Arc<dyn FilesystemAdapter>> {
        let adapter = self.registry.lookup(fs_type)?;
        self.ensure_supported(ctx, adapter.as_ref(), capability).await?;
        Ok(adapter)
    }

    /// Partition id, by-id path or device path → existing block device
    pub async fn resolve_device(&self, identifier: &str) -> Result<String> {
        if identifier.trim().is_empty() {
            return Err(StorageError::invalid_parameter("device identifier is empty"));
        }
        let hint = self.store.read(|map| {
            map.find_partition(identifier)
                .and_then(|(_, partition)| partition.preferred_device_path().map(str::to_string))
        });
        let candidate = hint.as_deref().unwrap_or(identifier);
        let device = self.resolver.resolve(candidate).await?;
        debug!(identifier, %device, "resolved device");
        Ok(device)
    }

    /// Filesystem type from the on-disk magic of an already resolved device
    pub async fn detect_device(&self, device: &str) -> Result<Option<String>> {
        let header = self.resolver.read_header(device, MAX_SIGNATURE_READ).await?;
        let detected = self.registry.detect(&header);
        debug!(device, fs_type = ?detected, "filesystem detection");
        Ok(detected)
    }

    pub async fn detect_filesystem(&self, identifier: &str) -> Result<Option<String>> {
        let device = self.resolve_device(identifier).await?;
        self.detect_device(&device).await
    }

    pub async fn list_filesystems(&self, ctx: &OperationContext) -> Result<Vec<FilesystemInfo>> {
        self.registry.list_filesystems(&self.scoped(ctx)).await
    }

    pub async fn format(
        &self,
        ctx: &OperationContext,
        fs_type: &str,
        identifier: &str,
        options: &FormatOptions,
    ) -> Result<()> {
        let ctx = self.scoped(ctx);
        let adapter = self.registry.lookup(fs_type)?;
        self.ensure_writable("format")?;
        self.ensure_supported(&ctx, adapter.as_ref(), Capability::Format).await?;
        let device = self.resolve_device(identifier).await?;
        let _device_guard = self.lock_device(&device).await;

        if !options.force && self.host.is_device_mounted(&device).await? {
            return Err(StorageError::Busy {
                device,
                message: "device is mounted; pass force to format anyway".to_string(),
            });
        }

        info!(%device, fs_type = adapter.name(), label = %options.label, "formatting");
        adapter
            .format(&ctx, &device, options)
            .await
            .map_err(|e| e.with_context(format!("partition {identifier}")))?;
        info!(%device, fs_type = adapter.name(), "format complete");
        self.dirty.mark(DirtyCategory::Volumes);
        Ok(())
    }

    /// Checking with `auto_fix` writes to the device and is refused in
    /// read-only mode; a plain check is not
    pub async fn check(
        &self,
        ctx: &OperationContext,
        fs_type: &str,
        identifier: &str,
        options: &CheckOptions,
    ) -> Result<CheckResult> {
        let ctx = self.scoped(ctx);
        let adapter = self.registry.lookup(fs_type)?;
        if options.auto_fix {
            self.ensure_writable("filesystem repair")?;
        }
        self.ensure_supported(&ctx, adapter.as_ref(), Capability::Check).await?;
        let device = self.resolve_device(identifier).await?;
        let _device_guard = if options.auto_fix {
            Some(self.lock_device(&device).await)
        } else {
            None
        };

        let result = adapter
            .check(&ctx, &device, options)
            .await
            .map_err(|e| e.with_context(format!("partition {identifier}")))?;
        if result.success {
            info!(%device, exit_code = result.exit_code, errors_found = result.errors_found, "check finished");
        } else {
            warn!(%device, exit_code = result.exit_code, message = %result.message, "check failed");
        }
        Ok(result)
    }

    pub async fn get_label(
        &self,
        ctx: &OperationContext,
        fs_type: &str,
        identifier: &str,
    ) -> Result<String> {
        let ctx = self.scoped(ctx);
        let adapter = self.adapter_for(&ctx, fs_type, Capability::Label).await?;
        let device = self.resolve_device(identifier).await?;
        adapter
            .get_label(&ctx, &device)
            .await
            .map_err(|e| e.with_context(format!("partition {identifier}")))
    }

    pub async fn set_label(
        &self,
        ctx: &OperationContext,
        fs_type: &str,
        identifier: &str,
        label: &str,
    ) -> Result<()> {
        let ctx = self.scoped(ctx);
        let adapter = self.registry.lookup(fs_type)?;
        self.ensure_writable("set label")?;
        self.ensure_supported(&ctx, adapter.as_ref(), Capability::Label).await?;
        let device = self.resolve_device(identifier).await?;
        let _device_guard = self.lock_device(&device).await;

        adapter
            .set_label(&ctx, &device, label)
            .await
            .map_err(|e| e.with_context(format!("partition {identifier}")))?;
        info!(%device, label, "label updated");
        self.dirty.mark(DirtyCategory::Volumes);
        Ok(())
    }

    pub async fn get_state(
        &self,
        ctx: &OperationContext,
        fs_type: &str,
        identifier: &str,
    ) -> Result<FilesystemState> {
        let ctx = self.scoped(ctx);
        let adapter = self.adapter_for(&ctx, fs_type, Capability::State).await?;
        let device = self.resolve_device(identifier).await?;
        adapter
            .get_state(&ctx, &device)
            .await
            .map_err(|e| e.with_context(format!("partition {identifier}")))
    }
}
