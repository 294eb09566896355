// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nas_events::Broadcaster;
use nas_types::HealthPing;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::volumes::VolumeService;

/// Periodic liveness signal for connected clients
pub struct HealthService {
    broadcaster: Arc<Broadcaster>,
    volumes: Arc<VolumeService>,
    read_only: bool,
}

impl HealthService {
    pub fn new(broadcaster: Arc<Broadcaster>, volumes: Arc<VolumeService>, read_only: bool) -> Self {
        Self {
            broadcaster,
            volumes,
            read_only,
        }
    }

    pub fn ping(&self) -> HealthPing {
        HealthPing {
            alive: true,
            read_only: self.read_only,
            last_rescan: self.volumes.last_rescan(),
            connected_clients: self.broadcaster.connected_clients(),
            timestamp: Utc::now(),
        }
    }

    /// Broadcast a ping every `interval` until `cancel` fires
    pub fn spawn_heartbeat(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let ping = self.ping();
                        match self.broadcaster.broadcast(&ping) {
                            Ok(receivers) => trace!(receivers, "heartbeat"),
                            Err(e) => warn!(error = %e, "cannot broadcast heartbeat"),
                        }
                    }
                }
            }
            debug!("heartbeat stopped");
        })
    }
}
