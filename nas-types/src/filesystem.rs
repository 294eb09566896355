// SPDX-License-Identifier: GPL-3.0-only

//! Filesystem capability and operation models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::MountFlag;

/// Host support for one filesystem type
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilesystemSupport {
    /// Kernel module is present in /proc/filesystems
    pub can_mount: bool,
    pub can_format: bool,
    pub can_check: bool,
    pub can_set_label: bool,
    pub can_get_state: bool,
    /// Package that provides the missing tools
    pub alpine_package: String,
    /// Tool binaries not found on PATH
    pub missing_tools: Vec<String>,
}

/// Listing entry for one registered filesystem type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilesystemInfo {
    pub name: String,
    pub description: String,
    pub support: FilesystemSupport,
    pub custom_mount_flags: Vec<MountFlag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatOptions {
    pub label: String,
    /// Overwrite an existing filesystem / ignore busy checks
    pub force: bool,
    /// Extra arguments passed to the mkfs tool before the device path
    #[serde(default)]
    pub additional_options: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckOptions {
    pub auto_fix: bool,
    pub force: bool,
    pub verbose: bool,
}

/// Outcome of a filesystem check
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    pub success: bool,
    pub errors_found: bool,
    pub errors_fixed: bool,
    /// Raw tool exit status (0 on a clean run)
    pub exit_code: i32,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilesystemState {
    pub is_clean: bool,
    pub is_mounted: bool,
    pub has_errors: bool,
    pub state_description: String,
    #[serde(default)]
    pub additional_info: BTreeMap<String, String>,
}

/// On-disk magic bytes identifying a filesystem
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsMagicSignature {
    pub offset: u64,
    pub magic: Vec<u8>,
}

impl FsMagicSignature {
    pub fn new(offset: u64, magic: &[u8]) -> Self {
        Self {
            offset,
            magic: magic.to_vec(),
        }
    }

    /// Whether `header` (read from byte 0 of the device) carries this signature
    pub fn matches(&self, header: &[u8]) -> bool {
        let Ok(start) = usize::try_from(self.offset) else {
            return false;
        };
        header
            .get(start..start + self.magic.len())
            .is_some_and(|bytes| bytes == self.magic.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_at_offset() {
        let mut header = vec![0u8; 16];
        header[3..7].copy_from_slice(b"NTFS");
        assert!(FsMagicSignature::new(3, b"NTFS").matches(&header));
        assert!(!FsMagicSignature::new(2, b"NTFS").matches(&header));
    }

    #[test]
    fn signature_beyond_header_never_matches() {
        let header = vec![0u8; 8];
        assert!(!FsMagicSignature::new(6, b"XFSB").matches(&header));
    }
}
