// SPDX-License-Identifier: GPL-3.0-only

use std::sync::{PoisonError, RwLock};

use nas_types::Disk;

use crate::DiskMap;

/// Shared, lock-guarded [`DiskMap`].
///
/// Closures run under the lock and must not block; callers collect what they
/// need, release the lock, then do slow work (tool runs, mount syscalls).
#[derive(Debug, Default)]
pub struct TopologyStore {
    inner: RwLock<DiskMap>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<R>(&self, f: impl FnOnce(&DiskMap) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut DiskMap) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn snapshot(&self) -> Vec<Disk> {
        self.read(DiskMap::snapshot)
    }
}
