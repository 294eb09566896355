// SPDX-License-Identifier: GPL-3.0-only

//! Contracts shared by the storage backend crates
//!
//! Errors are structured values so callers can branch on [`StorageErrorKind`]
//! while still rendering a human message. Everything that touches the host
//! (processes, mount syscalls, block devices) or a persistence collaborator
//! sits behind a trait here, which keeps the orchestration crates testable.

pub mod context;
pub mod error;
pub mod traits;

pub use context::OperationContext;
pub use error::{Result, StorageError, StorageErrorKind};
pub use traits::{
    CommandOutput, DeviceEnumerator, DeviceResolver, FilesystemAdapter, HostTools, MountEntry,
    MountOps, MountPointRecord, MountPointRepository, MountRequest, ShareRepository,
};
