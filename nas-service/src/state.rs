// SPDX-License-Identifier: GPL-3.0-only

//! Wiring of the services around one topology and one broadcaster

use std::sync::Arc;

use nas_contracts::{
    DeviceEnumerator, DeviceResolver, HostTools, MountOps, MountPointRepository,
    OperationContext, Result, ShareRepository,
};
use nas_events::{Broadcaster, WelcomeInfo};
use nas_filesystems::FilesystemRegistry;
use nas_topology::TopologyStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::{MemoryMountPointRepository, MemoryShareRepository, build_system_adapters};
use crate::config::{ServiceConfig, ShareEntry};
use crate::dirty::DirtyDataService;
use crate::filesystems::FilesystemService;
use crate::health::HealthService;
use crate::shares::ShareService;
use crate::volumes::VolumeService;

/// Host access and persistence the backend is built on
#[derive(Clone)]
pub struct Collaborators {
    pub host: Arc<dyn HostTools>,
    pub mounts: Arc<dyn MountOps>,
    pub resolver: Arc<dyn DeviceResolver>,
    pub enumerator: Arc<dyn DeviceEnumerator>,
    pub mount_points: Arc<dyn MountPointRepository>,
    pub shares: Arc<dyn ShareRepository>,
}

pub struct StorageBackend {
    config: ServiceConfig,
    store: Arc<TopologyStore>,
    broadcaster: Arc<Broadcaster>,
    dirty: Arc<DirtyDataService>,
    filesystems: Arc<FilesystemService>,
    shares: Arc<ShareService>,
    volumes: Arc<VolumeService>,
    health: Arc<HealthService>,
}

impl StorageBackend {
    /// Backend with every compiled-in filesystem adapter
    pub fn new(config: ServiceConfig, collaborators: Collaborators) -> Self {
        let registry = FilesystemRegistry::with_default_adapters(collaborators.host.clone());
        Self::with_registry(config, collaborators, registry)
    }

    pub fn with_registry(
        config: ServiceConfig,
        collaborators: Collaborators,
        registry: FilesystemRegistry,
    ) -> Self {
        let welcome = WelcomeInfo {
            update_channel: config.update_channel.clone(),
            read_only: config.read_only,
            secure_mode: config.secure_mode,
            protected_mode: config.protected_mode,
            machine_id: config.machine_id.clone(),
            ..WelcomeInfo::default()
        };
        let broadcaster = Arc::new(Broadcaster::new(config.client_queue_capacity, welcome));
        let store = Arc::new(TopologyStore::new());
        let dirty = Arc::new(DirtyDataService::new(broadcaster.clone()));
        let timeout = config.operation_timeout();

        let filesystems = Arc::new(
            FilesystemService::new(
                Arc::new(registry),
                store.clone(),
                collaborators.host,
                collaborators.resolver,
                dirty.clone(),
                config.read_only,
            )
            .with_timeout(timeout),
        );
        let shares = Arc::new(ShareService::new(
            collaborators.shares,
            store.clone(),
            broadcaster.clone(),
            dirty.clone(),
        ));
        let volumes = Arc::new(
            VolumeService::new(
                store.clone(),
                filesystems.clone(),
                collaborators.mounts,
                collaborators.enumerator,
                collaborators.mount_points,
                shares.clone(),
                broadcaster.clone(),
                dirty.clone(),
            )
            .with_timeout(timeout),
        );
        let health = Arc::new(HealthService::new(
            broadcaster.clone(),
            volumes.clone(),
            config.read_only,
        ));

        Self {
            config,
            store,
            broadcaster,
            dirty,
            filesystems,
            shares,
            volumes,
            health,
        }
    }

    /// Backend on the real host, with mount points and shares seeded from the
    /// configuration file
    pub fn system(config: ServiceConfig) -> Self {
        let host = build_system_adapters(config.operation_timeout());
        let registry = FilesystemRegistry::with_default_adapters(host.host.clone());
        let records = config
            .mount_points
            .iter()
            .map(|entry| entry.to_record(registry.catalog()));
        let collaborators = Collaborators {
            host: host.host,
            mounts: host.mounts,
            resolver: host.resolver,
            enumerator: host.enumerator,
            mount_points: Arc::new(MemoryMountPointRepository::with_records(records)),
            shares: Arc::new(MemoryShareRepository::with_shares(
                config.shares.iter().map(ShareEntry::to_share),
            )),
        };
        Self::with_registry(config, collaborators, registry)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TopologyStore> {
        &self.store
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn dirty(&self) -> &Arc<DirtyDataService> {
        &self.dirty
    }

    pub fn filesystems(&self) -> &Arc<FilesystemService> {
        &self.filesystems
    }

    pub fn shares(&self) -> &Arc<ShareService> {
        &self.shares
    }

    pub fn volumes(&self) -> &Arc<VolumeService> {
        &self.volumes
    }

    pub fn health(&self) -> &Arc<HealthService> {
        &self.health
    }

    /// First enumeration, startup mounts and share attachment.
    /// A failed enumeration is logged and leaves the topology empty.
    pub async fn start(&self, ctx: &OperationContext) -> Result<()> {
        match self.volumes.rescan(ctx).await {
            Ok(report) => info!(disks = report.added.len(), "initial device scan"),
            Err(e) => warn!(error = %e, "initial device scan failed"),
        }

        let mounted = self.volumes.mount_startup_volumes(ctx).await?;
        let attached = self.shares.attach_all().await?;
        if attached > 0 {
            self.shares.publish().await;
        }
        info!(mounted, shares = attached, read_only = self.config.read_only, "storage backend started");
        Ok(())
    }

    /// Heartbeat and periodic rescans; both stop when `cancel` fires
    pub fn spawn_background(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();
        match self.config.heartbeat_interval() {
            Some(interval) => {
                tasks.push(self.health.clone().spawn_heartbeat(interval, cancel.clone()));
            }
            None => info!("heartbeat disabled"),
        }
        match self.config.rescan_interval() {
            Some(interval) => {
                tasks.push(self.volumes.clone().spawn_rescans(interval, cancel.clone()));
            }
            None => info!("periodic rescan disabled"),
        }
        tasks
    }
}
