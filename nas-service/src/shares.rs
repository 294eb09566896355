// SPDX-License-Identifier: GPL-3.0-only

//! Keeps share attachments on mount points in step with mount state

use std::sync::Arc;

use nas_contracts::{Result, ShareRepository};
use nas_events::Broadcaster;
use nas_topology::TopologyStore;
use nas_types::{MountPointData, SharedResource};
use tracing::{debug, warn};

use crate::dirty::{DirtyCategory, DirtyDataService};

pub struct ShareService {
    repository: Arc<dyn ShareRepository>,
    store: Arc<TopologyStore>,
    broadcaster: Arc<Broadcaster>,
    dirty: Arc<DirtyDataService>,
}

impl ShareService {
    pub fn new(
        repository: Arc<dyn ShareRepository>,
        store: Arc<TopologyStore>,
        broadcaster: Arc<Broadcaster>,
        dirty: Arc<DirtyDataService>,
    ) -> Self {
        Self {
            repository,
            store,
            broadcaster,
            dirty,
        }
    }

    /// Attach the share exporting `mount_point`, if there is one.
    /// Returns the attached share's name.
    pub async fn attach(&self, mount_point: &MountPointData) -> Result<Option<String>> {
        let Some(mut share) = self.repository.find_by_mount_path(&mount_point.path).await? else {
            return Ok(None);
        };

        // point the share at the mount point we just placed so the attach
        // skips the full-graph scan
        let mut target = mount_point.clone();
        target.share = None;
        share.mount_point_data = Some(Box::new(target));

        let disk = self.store.write(|map| map.add_mount_point_share(&share))?;
        debug!(share = %share.name, disk = %disk, path = %mount_point.path, "share attached");
        Ok(Some(share.name))
    }

    /// Detach whatever share is attached at `path`; returns its name
    pub fn detach_at(&self, path: &str) -> Option<String> {
        self.store.write(|map| {
            let name = map
                .get_mount_point_by_path(path)
                .and_then(|mp| mp.share.as_ref())
                .map(|share| share.name.clone())?;
            map.remove_mount_point_share(&name)?;
            Some(name)
        })
    }

    pub fn detach(&self, share_name: &str) -> Option<String> {
        self.store.write(|map| map.remove_mount_point_share(share_name))
    }

    /// Attach every persisted share whose mount point is managed and
    /// mounted; returns how many were attached
    pub async fn attach_all(&self) -> Result<usize> {
        let mut attached = 0;
        for share in self.repository.all().await? {
            if share.disabled {
                continue;
            }
            let Some(path) = share.mount_path() else {
                continue;
            };
            let mounted = self
                .store
                .read(|map| map.get_mount_point_by_path(path).is_some_and(|mp| mp.is_mounted));
            if !mounted {
                continue;
            }
            match self.store.write(|map| map.add_mount_point_share(&share)) {
                Ok(_) => attached += 1,
                Err(e) => warn!(share = %share.name, error = %e, "cannot attach share"),
            }
        }
        Ok(attached)
    }

    /// Persisted shares with their mount point state taken from the topology
    pub async fn list(&self) -> Result<Vec<SharedResource>> {
        let mut shares = self.repository.all().await?;
        self.store.read(|map| {
            for share in &mut shares {
                let Some(path) = share.mount_path() else {
                    continue;
                };
                if let Some(mp) = map.get_mount_point_by_path(path) {
                    let mut current = mp.clone();
                    current.share = None;
                    share.mount_point_data = Some(Box::new(current));
                }
            }
        });
        Ok(shares)
    }

    /// Broadcast the share list after an attachment change
    pub async fn publish(&self) {
        self.dirty.mark(DirtyCategory::Shares);
        match self.list().await {
            Ok(shares) => {
                if let Err(e) = self.broadcaster.broadcast(&shares) {
                    warn!(error = %e, "cannot broadcast shares");
                }
            }
            Err(e) => warn!(error = %e, "cannot list shares"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryShareRepository;
    use nas_events::WelcomeInfo;
    use nas_types::{Disk, Partition};

    fn share(name: &str, path: &str) -> SharedResource {
        let mut share = SharedResource::new(name);
        share.mount_point_data = Some(Box::new(MountPointData::new(path)));
        share
    }

    fn service(shares: Vec<SharedResource>) -> (Arc<TopologyStore>, ShareService) {
        let store = Arc::new(TopologyStore::new());
        store
            .write(|map| {
                map.add_or_update(Disk::new("d1"))?;
                map.add_partition("d1", Partition::new("p1"))?;
                let mut mp = MountPointData::new("/mnt/media");
                mp.is_mounted = true;
                map.add_or_update_mount_point("d1", "p1", mp)
            })
            .expect("seed");
        let hub = Arc::new(Broadcaster::new(8, WelcomeInfo::default()));
        let service = ShareService::new(
            Arc::new(MemoryShareRepository::with_shares(shares)),
            store.clone(),
            hub.clone(),
            Arc::new(DirtyDataService::new(hub)),
        );
        (store, service)
    }

    #[tokio::test]
    async fn attach_and_detach_follow_the_mount_point() {
        let (store, service) = service(vec![share("media", "/mnt/media")]);
        let mp = store
            .read(|map| map.get_mount_point("d1", "p1", "/mnt/media").cloned())
            .expect("mount point");

        let name = service.attach(&mp).await.expect("attach");
        assert_eq!(name.as_deref(), Some("media"));
        let attached = store.read(|map| {
            map.get_mount_point("d1", "p1", "/mnt/media")
                .and_then(|mp| mp.share.as_ref().map(|s| s.name.clone()))
        });
        assert_eq!(attached.as_deref(), Some("media"));

        let listed = service.list().await.expect("list");
        assert!(listed[0].mount_point_data.as_ref().is_some_and(|mp| mp.is_mounted));

        assert_eq!(service.detach_at("/mnt/media").as_deref(), Some("media"));
        assert_eq!(service.detach("media"), None);
    }

    #[tokio::test]
    async fn unshared_path_attaches_nothing() {
        let (_, service) = service(vec![share("backup", "/mnt/backup")]);
        let name = service
            .attach(&MountPointData::new("/mnt/media"))
            .await
            .expect("attach");
        assert_eq!(name, None);
    }

    #[tokio::test]
    async fn attach_all_skips_unmounted_paths() {
        let (_, service) = service(vec![share("media", "/mnt/media"), share("backup", "/mnt/backup")]);
        assert_eq!(service.attach_all().await.expect("attach all"), 1);
    }
}
