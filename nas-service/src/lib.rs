// SPDX-License-Identifier: GPL-3.0-only

//! Volume lifecycle service of the NAS storage backend
//!
//! [`StorageBackend`] wires the services around one [`TopologyStore`] and one
//! [`Broadcaster`]:
//!
//! - [`VolumeService`]: mount, unmount, rescan, per-path serialization
//! - [`FilesystemService`]: format, check and label over the adapter registry
//! - [`ShareService`]: share attachment on mount points
//! - [`DirtyDataService`] and [`HealthService`]: client notifications
//!
//! Host access goes through the traits of `nas-contracts`; [`adapters`]
//! holds the real implementations and [`testing`] in-process fakes.
//!
//! [`TopologyStore`]: nas_topology::TopologyStore
//! [`Broadcaster`]: nas_events::Broadcaster

pub mod adapters;
pub mod config;
pub mod conversions;
pub mod dirty;
pub mod filesystems;
pub mod health;
pub mod locks;
pub mod logging;
pub mod shares;
pub mod state;
pub mod testing;
pub mod volumes;

pub use config::{Cli, ConfigError, ServiceConfig};
pub use dirty::{DirtyCategory, DirtyDataService};
pub use filesystems::FilesystemService;
pub use health::HealthService;
pub use shares::ShareService;
pub use state::{Collaborators, StorageBackend};
pub use volumes::VolumeService;
