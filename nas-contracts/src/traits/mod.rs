// SPDX-License-Identifier: GPL-3.0-only

mod device;
mod filesystem;
mod host;
mod mount;
mod repository;

pub use device::{DeviceEnumerator, DeviceResolver};
pub use filesystem::FilesystemAdapter;
pub use host::{CommandOutput, HostTools};
pub use mount::{MountEntry, MountOps, MountRequest};
pub use repository::{MountPointRecord, MountPointRepository, ShareRepository};
