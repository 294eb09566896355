// SPDX-License-Identifier: GPL-3.0-only

use std::sync::{Arc, Mutex, PoisonError};

use nas_events::Broadcaster;
use nas_types::DataDirtyTracker;
use tracing::{debug, warn};

/// Configuration category with unsaved changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyCategory {
    Shares,
    Users,
    Settings,
    Volumes,
}

/// Tracks what the persistence collaborator still has to save and tells
/// every client whenever that changes
pub struct DirtyDataService {
    tracker: Mutex<DataDirtyTracker>,
    broadcaster: Arc<Broadcaster>,
}

impl DirtyDataService {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            tracker: Mutex::new(DataDirtyTracker::default()),
            broadcaster,
        }
    }

    pub fn tracker(&self) -> DataDirtyTracker {
        *self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark(&self, category: DirtyCategory) {
        let tracker = {
            let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
            match category {
                DirtyCategory::Shares => tracker.shares = true,
                DirtyCategory::Users => tracker.users = true,
                DirtyCategory::Settings => tracker.settings = true,
                DirtyCategory::Volumes => tracker.volumes = true,
            }
            *tracker
        };
        debug!(?category, "data marked dirty");
        self.publish(&tracker);
    }

    /// Reset after the persistence collaborator saved everything
    pub fn clear(&self) {
        let previous = std::mem::take(
            &mut *self.tracker.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if previous.is_dirty() {
            self.publish(&DataDirtyTracker::default());
        }
    }

    fn publish(&self, tracker: &DataDirtyTracker) {
        if let Err(e) = self.broadcaster.broadcast(tracker) {
            warn!(error = %e, "cannot broadcast dirty data tracker");
        }
    }
}
