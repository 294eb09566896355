// SPDX-License-Identifier: GPL-3.0-only

pub mod memory;
pub mod system;

pub use memory::{MemoryMountPointRepository, MemoryShareRepository};
pub use system::{
    LsblkEnumerator, SystemAdapters, SystemDeviceResolver, SystemHostTools, SystemMountOps,
    build_system_adapters,
};
