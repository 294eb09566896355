// SPDX-License-Identifier: GPL-3.0-only

use std::fs::File;
use std::io::Read;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use crate::{Result, SysError};

const LOOKUP_DIRS: &[&str] = &[
    "/dev/disk/by-id",
    "/dev",
    "/dev/disk/by-uuid",
    "/dev/disk/by-label",
];

/// Resolve a device path, by-id link, uuid, label or kernel name to the
/// canonical path of an existing block device.
pub fn resolve_block_device(identifier: &str) -> Result<PathBuf> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(SysError::DeviceNotFound("empty device identifier".to_string()));
    }

    let candidates: Vec<PathBuf> = if identifier.starts_with('/') {
        vec![PathBuf::from(identifier)]
    } else {
        LOOKUP_DIRS
            .iter()
            .map(|dir| Path::new(dir).join(identifier))
            .collect()
    };

    candidates
        .iter()
        .find_map(|candidate| block_device_at(candidate))
        .ok_or_else(|| SysError::DeviceNotFound(identifier.to_string()))
}

fn block_device_at(candidate: &Path) -> Option<PathBuf> {
    let canonical = candidate.canonicalize().ok()?;
    let metadata = std::fs::metadata(&canonical).ok()?;
    metadata.file_type().is_block_device().then_some(canonical)
}

/// Read at most `len` bytes from the start of `device`
pub fn read_device_header(device: &Path, len: usize) -> Result<Vec<u8>> {
    let file = File::open(device).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SysError::DeviceNotFound(device.display().to_string()),
        std::io::ErrorKind::PermissionDenied => {
            SysError::PermissionDenied(device.display().to_string())
        }
        _ => SysError::Io(e),
    })?;

    let mut header = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut header)?;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifier_is_not_found() {
        assert!(matches!(
            resolve_block_device("  "),
            Err(SysError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn regular_file_is_not_a_block_device() {
        let path = std::env::temp_dir().join(format!("nas-sys-dev-{}", std::process::id()));
        std::fs::write(&path, b"not a device").expect("write temp file");
        let result = resolve_block_device(&path.to_string_lossy());
        assert!(matches!(result, Err(SysError::DeviceNotFound(_))));

        let header = read_device_header(&path, 3).expect("read header");
        assert_eq!(header, b"not");
        let _ = std::fs::remove_file(&path);
    }
}
