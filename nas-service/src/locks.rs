// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per key (a mount path or a block device).
///
/// Operations on the same path queue behind each other; different paths never
/// contend. Entries nobody holds or waits on are pruned on the next lock.
#[derive(Debug, Default)]
pub struct PathLocks {
    table: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, path: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.retain(|key, lock| key == path || Arc::strong_count(lock) > 1);
            table.entry(path.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Paths with a live lock entry
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_path_serializes() {
        let locks = Arc::new(PathLocks::new());
        let guard = locks.lock("/mnt/a").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("/mnt/a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter acquires after release")
            .expect("join");
    }

    #[tokio::test]
    async fn different_paths_do_not_contend() {
        let locks = PathLocks::new();
        let _a = locks.lock("/mnt/a").await;
        let b = tokio::time::timeout(Duration::from_secs(1), locks.lock("/mnt/b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = PathLocks::new();
        drop(locks.lock("/mnt/a").await);
        drop(locks.lock("/mnt/b").await);
        let _c = locks.lock("/mnt/c").await;
        assert_eq!(locks.len(), 1);
    }
}
