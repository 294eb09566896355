// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system operations for storage management
//!
//! This crate talks to the host directly:
//! - Cancellable external tool execution
//! - `/proc/self/mountinfo` and `/proc/filesystems` parsing
//! - mount(2) / umount2(2) through `nix`
//! - Block device resolution and header reads
//! - Device enumeration through `lsblk --json`
//!
//! These operations require elevated privileges and should only be called
//! from the privileged service.

pub mod command;
pub mod device;
pub mod error;
pub mod lsblk;
pub mod mount;
pub mod mountinfo;
pub mod proc_filesystems;

pub use command::{CapturedOutput, command_exists, run_capture};
pub use device::{read_device_header, resolve_block_device};
pub use error::{Result, SysError};
pub use lsblk::{enumerate_disks, parse_lsblk};
pub use mount::{create_mount_dir, mount_device, remove_mount_dir, unmount};
pub use mountinfo::{MountInfoEntry, parse_mountinfo, read_mountinfo};
pub use proc_filesystems::{parse_proc_filesystems, read_kernel_filesystems};
