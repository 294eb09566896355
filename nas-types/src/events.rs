// SPDX-License-Identifier: GPL-3.0-only

//! Payloads pushed to connected clients

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event names understood by clients of both transports
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum WebEventType {
    Hello,
    Updating,
    Volumes,
    Heartbeat,
    Shares,
    DirtyDataTracker,
}

impl WebEventType {
    pub const ALL: [WebEventType; 6] = [
        Self::Hello,
        Self::Updating,
        Self::Volumes,
        Self::Heartbeat,
        Self::Shares,
        Self::DirtyDataTracker,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Updating => "updating",
            Self::Volumes => "volumes",
            Self::Heartbeat => "heartbeat",
            Self::Shares => "shares",
            Self::DirtyDataTracker => "dirty_data_tracker",
        }
    }
}

impl fmt::Display for WebEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handshake sent to every new connection before any domain event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Welcome {
    pub message: String,
    pub active_clients: u64,
    pub supported_events: Vec<WebEventType>,
    pub update_channel: String,
    pub read_only: bool,
    pub secure_mode: bool,
    pub protected_mode: bool,
    pub build_version: String,
    pub start_time: DateTime<Utc>,
    pub machine_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthPing {
    pub alive: bool,
    pub read_only: bool,
    pub last_rescan: Option<DateTime<Utc>>,
    pub connected_clients: u64,
    pub timestamp: DateTime<Utc>,
}

/// Configuration categories with changes pending persistence
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataDirtyTracker {
    pub shares: bool,
    pub users: bool,
    pub settings: bool,
    pub volumes: bool,
}

impl DataDirtyTracker {
    pub fn is_dirty(&self) -> bool {
        self.shares || self.users || self.settings || self.volumes
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    #[default]
    NoUpgrade,
    UpgradeAvailable,
    Downloading,
    Installing,
    Complete,
    Error,
}

/// Progress of a self-update, relayed from the update collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateProgress {
    pub status: UpdateStatus,
    /// Percentage 0..=100
    pub progress: u8,
    pub error_message: Option<String>,
}
