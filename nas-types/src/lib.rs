// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for the NAS storage backend
//!
//! This crate is the single source of truth for the storage topology and for
//! every payload pushed to connected clients:
//!
//! - **nas-topology**: owns a graph of these types (disk → partition → mount point → share)
//! - **nas-filesystems**: reports capabilities and results with the filesystem DTOs
//! - **nas-events**: serializes the broadcast payloads and maps them to [`WebEventType`]
//! - **nas-service**: converts persisted mount records into [`MountPointData`]

pub mod disk;
pub mod events;
pub mod filesystem;
pub mod mount;
pub mod share;

pub use disk::{Disk, HdIdleDeviceStatus, Partition, SmartInfo};
pub use events::{
    DataDirtyTracker, HealthPing, UpdateProgress, UpdateStatus, WebEventType, Welcome,
};
pub use filesystem::{
    CheckOptions, CheckResult, FilesystemInfo, FilesystemState, FilesystemSupport,
    FormatOptions, FsMagicSignature,
};
pub use mount::{MountFlag, MountPointData, MountState, TimeMachineSupport};
pub use share::{ShareUsage, SharedResource};
