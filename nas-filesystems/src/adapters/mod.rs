// SPDX-License-Identifier: GPL-3.0-only

#[cfg(feature = "fs-btrfs")]
mod btrfs;
#[cfg(feature = "fs-exfat")]
mod exfat;
#[cfg(feature = "fs-ext4")]
mod ext4;
#[cfg(feature = "fs-ntfs")]
mod ntfs;
#[cfg(feature = "fs-vfat")]
mod vfat;
#[cfg(feature = "fs-xfs")]
mod xfs;

#[cfg(feature = "fs-btrfs")]
pub use btrfs::BtrfsAdapter;
#[cfg(feature = "fs-exfat")]
pub use exfat::ExfatAdapter;
#[cfg(feature = "fs-ext4")]
pub use ext4::Ext4Adapter;
#[cfg(feature = "fs-ntfs")]
pub use ntfs::NtfsAdapter;
#[cfg(feature = "fs-vfat")]
pub use vfat::VfatAdapter;
#[cfg(feature = "fs-xfs")]
pub use xfs::XfsAdapter;
