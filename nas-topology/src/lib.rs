// SPDX-License-Identifier: GPL-3.0-only

//! Storage topology graph
//!
//! [`DiskMap`] owns the disk → partition → mount point tree and enforces its
//! invariants on every mutation: map keys always match the identifiers and
//! paths of their values, back-references always point at the owner, and a
//! missing ancestor is an error rather than an implicit insert.
//! [`TopologyStore`] puts a read/write lock around it for the services.

mod disk_map;
mod store;

pub use disk_map::{DiskMap, MountPointLocation, ReconcileReport};
pub use store::TopologyStore;
