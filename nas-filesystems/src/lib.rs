// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem adapter registry
//!
//! One [`FilesystemAdapter`](nas_contracts::FilesystemAdapter) per supported
//! type hides the differences between mkfs/fsck/label tools. The registry maps
//! a type string to its adapter and carries the mount flag catalogs used by
//! the UI. Each adapter is compiled in behind its `fs-*` feature.

pub mod adapters;
pub mod base;
pub mod detect;
pub mod flags;
pub mod registry;

pub use base::{Capability, ToolSet, ensure_capability};
pub use detect::{MAX_SIGNATURE_READ, detect_filesystem};
pub use flags::{MountFlagCatalog, SyscallFlags};
pub use registry::FilesystemRegistry;
