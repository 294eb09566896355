// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem detection from on-disk magic numbers

use std::sync::Arc;

use nas_contracts::FilesystemAdapter;

/// Bytes to read from the start of a device: btrfs magic at 0x10040 plus 8
pub const MAX_SIGNATURE_READ: usize = 0x10040 + 8;

/// Name of the first adapter whose signature matches `header`.
///
/// Signatures are tried in ascending offset order across all adapters, so the
/// short ext magic at 1080 only wins when nothing nearer the start matched.
/// A header shorter than a signature's end simply fails that signature.
pub fn detect_filesystem<'a, I>(header: &[u8], adapters: I) -> Option<String>
where
    I: IntoIterator<Item = &'a Arc<dyn FilesystemAdapter>>,
{
    if header.is_empty() {
        return None;
    }

    let mut candidates: Vec<_> = adapters
        .into_iter()
        .flat_map(|adapter| {
            adapter
                .signatures()
                .iter()
                .map(move |signature| (signature, adapter.as_ref()))
        })
        .collect();
    candidates.sort_by_key(|(signature, _)| signature.offset);

    candidates
        .into_iter()
        .find(|(signature, _)| signature.matches(header))
        .map(|(_, adapter)| adapter.name().to_string())
}

#[cfg(all(test, feature = "fs-ext4", feature = "fs-btrfs", feature = "fs-ntfs"))]
mod tests {
    use super::*;
    use crate::adapters::{BtrfsAdapter, Ext4Adapter, NtfsAdapter};
    use crate::base::testing::FakeHost;

    fn detect(header: &[u8]) -> Option<String> {
        let host = Arc::new(FakeHost::default());
        let adapters: Vec<Arc<dyn FilesystemAdapter>> = vec![
            Arc::new(Ext4Adapter::new(host.clone())),
            Arc::new(BtrfsAdapter::new(host.clone())),
            Arc::new(NtfsAdapter::new(host)),
        ];
        detect_filesystem(header, &adapters)
    }

    #[test]
    fn detects_btrfs_at_the_far_offset() {
        let mut header = vec![0u8; MAX_SIGNATURE_READ];
        header[0x10040..].copy_from_slice(b"_BHRfS_M");
        assert_eq!(detect(&header).as_deref(), Some("btrfs"));
    }

    #[test]
    fn nearer_signature_wins_over_ext_magic() {
        let mut header = vec![0u8; 2048];
        header[3..11].copy_from_slice(b"NTFS    ");
        header[1080..1082].copy_from_slice(&[0x53, 0xEF]);
        assert_eq!(detect(&header).as_deref(), Some("ntfs"));
    }

    #[test]
    fn short_or_blank_header_detects_nothing() {
        assert_eq!(detect(&[]), None);
        assert_eq!(detect(&[0u8; 512]), None);
    }
}
