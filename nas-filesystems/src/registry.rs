// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeMap;
use std::sync::Arc;

use nas_contracts::{FilesystemAdapter, HostTools, OperationContext, Result, StorageError};
use nas_types::FilesystemInfo;
use tracing::debug;

use crate::detect::detect_filesystem;
use crate::flags::MountFlagCatalog;

/// Alternative type names reported by tools or the kernel
const ALIASES: &[(&str, &str)] = &[("fat32", "vfat"), ("ntfs3", "ntfs")];

/// Type name → adapter map plus the mount flag catalogs
#[derive(Clone, Default)]
pub struct FilesystemRegistry {
    adapters: BTreeMap<String, Arc<dyn FilesystemAdapter>>,
    catalog: MountFlagCatalog,
}

impl std::fmt::Debug for FilesystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

impl FilesystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every adapter compiled in via `fs-*` features
    #[allow(unused_mut, unused_variables)]
    pub fn with_default_adapters(host: Arc<dyn HostTools>) -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "fs-ext4")]
        registry.register(Arc::new(crate::adapters::Ext4Adapter::new(host.clone())));
        #[cfg(feature = "fs-xfs")]
        registry.register(Arc::new(crate::adapters::XfsAdapter::new(host.clone())));
        #[cfg(feature = "fs-btrfs")]
        registry.register(Arc::new(crate::adapters::BtrfsAdapter::new(host.clone())));
        #[cfg(feature = "fs-vfat")]
        registry.register(Arc::new(crate::adapters::VfatAdapter::new(host.clone())));
        #[cfg(feature = "fs-ntfs")]
        registry.register(Arc::new(crate::adapters::NtfsAdapter::new(host.clone())));
        #[cfg(feature = "fs-exfat")]
        registry.register(Arc::new(crate::adapters::ExfatAdapter::new(host.clone())));
        registry
    }

    /// Add or replace the adapter for its type name
    pub fn register(&mut self, adapter: Arc<dyn FilesystemAdapter>) {
        let name = adapter.name().to_ascii_lowercase();
        debug!(fs = %name, "registering filesystem adapter");
        self.catalog.register(&name, adapter.mount_flags());
        self.adapters.insert(name, adapter);
    }

    fn canonical(name: &str) -> String {
        let lower = name.trim().to_ascii_lowercase();
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == lower)
            .map(|(_, target)| target.to_string())
            .unwrap_or(lower)
    }

    pub fn get(&self, fs_type: &str) -> Option<Arc<dyn FilesystemAdapter>> {
        self.adapters.get(&Self::canonical(fs_type)).cloned()
    }

    /// Like [`get`](Self::get) but an unknown type is an `InvalidParameter`
    pub fn lookup(&self, fs_type: &str) -> Result<Arc<dyn FilesystemAdapter>> {
        if fs_type.trim().is_empty() {
            return Err(StorageError::invalid_parameter("filesystem type is required"));
        }
        self.get(fs_type).ok_or_else(|| {
            StorageError::invalid_parameter(format!("unsupported filesystem type '{fs_type}'"))
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn FilesystemAdapter>> {
        self.adapters.values()
    }

    pub fn catalog(&self) -> &MountFlagCatalog {
        &self.catalog
    }

    /// Every registered type with its probed support and flag catalog
    pub async fn list_filesystems(&self, ctx: &OperationContext) -> Result<Vec<FilesystemInfo>> {
        let mut out = Vec::with_capacity(self.adapters.len());
        for (name, adapter) in &self.adapters {
            ctx.ensure_active("list filesystems")?;
            let support = adapter.is_supported(ctx).await?;
            out.push(FilesystemInfo {
                name: name.clone(),
                description: adapter.description().to_string(),
                support,
                custom_mount_flags: self.catalog.specific(name),
            });
        }
        Ok(out)
    }

    /// Type name whose magic matches the device header
    pub fn detect(&self, header: &[u8]) -> Option<String> {
        detect_filesystem(header, self.adapters.values())
    }
}
