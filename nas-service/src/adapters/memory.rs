// SPDX-License-Identifier: GPL-3.0-only

//! In-memory persistence collaborators, seeded from configuration

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use nas_contracts::{MountPointRecord, MountPointRepository, Result, ShareRepository};
use nas_types::SharedResource;

#[derive(Debug, Default)]
pub struct MemoryMountPointRepository {
    records: RwLock<BTreeMap<String, MountPointRecord>>,
}

impl MemoryMountPointRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = MountPointRecord>) -> Self {
        Self {
            records: RwLock::new(
                records
                    .into_iter()
                    .map(|record| (record.id.clone(), record))
                    .collect(),
            ),
        }
    }

    pub fn insert(&self, record: MountPointRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MountPointRepository for MemoryMountPointRepository {
    async fn find(&self, id: &str) -> Result<Option<MountPointRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(id).cloned())
    }

    async fn find_by_path(&self, path: &str) -> Result<Option<MountPointRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.values().find(|r| r.path == path).cloned())
    }

    async fn save(&self, record: MountPointRecord) -> Result<()> {
        self.insert(record);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<MountPointRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.values().cloned().collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryShareRepository {
    shares: RwLock<Vec<SharedResource>>,
}

impl MemoryShareRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shares(shares: impl IntoIterator<Item = SharedResource>) -> Self {
        Self {
            shares: RwLock::new(shares.into_iter().collect()),
        }
    }

    /// Insert or replace by name
    pub fn upsert(&self, share: SharedResource) {
        let mut shares = self.shares.write().unwrap_or_else(PoisonError::into_inner);
        match shares.iter_mut().find(|s| s.name == share.name) {
            Some(existing) => *existing = share,
            None => shares.push(share),
        }
    }
}

#[async_trait]
impl ShareRepository for MemoryShareRepository {
    async fn find_by_mount_path(&self, path: &str) -> Result<Option<SharedResource>> {
        let shares = self.shares.read().unwrap_or_else(PoisonError::into_inner);
        Ok(shares
            .iter()
            .find(|share| !share.disabled && share.mount_path() == Some(path))
            .cloned())
    }

    async fn all(&self) -> Result<Vec<SharedResource>> {
        let shares = self.shares.read().unwrap_or_else(PoisonError::into_inner);
        Ok(shares.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nas_types::MountPointData;

    #[tokio::test]
    async fn save_replaces_by_id() {
        let repo = MemoryMountPointRepository::new();
        repo.save(MountPointRecord {
            id: "1".into(),
            path: "/mnt/a".into(),
            ..Default::default()
        })
        .await
        .expect("save");
        repo.save(MountPointRecord {
            id: "1".into(),
            path: "/mnt/b".into(),
            ..Default::default()
        })
        .await
        .expect("save");

        assert_eq!(repo.len(), 1);
        let found = repo.find_by_path("/mnt/b").await.expect("find");
        assert_eq!(found.map(|r| r.id), Some("1".to_string()));
        assert!(repo.find_by_path("/mnt/a").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn disabled_shares_are_not_matched_by_path() {
        let mut share = SharedResource::new("media");
        share.mount_point_data = Some(Box::new(MountPointData::new("/mnt/media")));
        let repo = MemoryShareRepository::with_shares([share.clone()]);
        assert!(repo.find_by_mount_path("/mnt/media").await.expect("find").is_some());

        share.disabled = true;
        repo.upsert(share);
        assert!(repo.find_by_mount_path("/mnt/media").await.expect("find").is_none());
        assert_eq!(repo.all().await.expect("all").len(), 1);
    }
}
