// SPDX-License-Identifier: GPL-3.0-only

//! Conversions from host-level types into the backend's contract types

use nas_contracts::{CommandOutput, MountEntry, StorageError};
use nas_sys::{CapturedOutput, MountInfoEntry, SysError};

/// Classify a host error as a [`StorageError`]
pub fn storage_error(err: SysError) -> StorageError {
    match err {
        SysError::PermissionDenied(message) => StorageError::permission_denied(message),
        SysError::DeviceNotFound(device) => StorageError::device_not_found(device),
        SysError::Cancelled(message) => StorageError::cancelled(message),
        SysError::Mount {
            source_device,
            target,
            errno,
        } => StorageError::MountFail {
            device: source_device,
            path: target,
            message: errno.desc().to_string(),
        },
        SysError::Unmount { target, errno } => StorageError::UnmountFail {
            path: target,
            message: errno.desc().to_string(),
        },
        SysError::Spawn { program, source } => {
            StorageError::tool_failed("", program, None, source.to_string())
        }
        SysError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            StorageError::permission_denied(e.to_string())
        }
        SysError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
            StorageError::not_found(e.to_string())
        }
        other => StorageError::internal(other.to_string()),
    }
}

/// `?`-friendly conversion for host results
pub trait SysResultExt<T> {
    fn into_storage(self) -> nas_contracts::Result<T>;
}

impl<T> SysResultExt<T> for nas_sys::Result<T> {
    fn into_storage(self) -> nas_contracts::Result<T> {
        self.map_err(storage_error)
    }
}

pub fn command_output(output: CapturedOutput) -> CommandOutput {
    CommandOutput {
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
    }
}

pub fn mount_entry(entry: MountInfoEntry) -> MountEntry {
    MountEntry {
        source: entry.source,
        target: entry.mount_point,
        fs_type: entry.fs_type,
        options: entry.mount_options,
        super_options: entry.super_options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nas_contracts::StorageErrorKind;
    use nix::errno::Errno;

    #[test]
    fn mount_errors_keep_device_and_path() {
        let err = storage_error(SysError::Mount {
            source_device: "/dev/sdb1".into(),
            target: "/mnt/data".into(),
            errno: Errno::EINVAL,
        });
        assert_eq!(err.kind(), StorageErrorKind::MountFail);
        assert!(matches!(
            err,
            StorageError::MountFail { ref device, ref path, .. }
                if device == "/dev/sdb1" && path == "/mnt/data"
        ));
    }

    #[test]
    fn host_errors_map_to_kinds() {
        assert_eq!(
            storage_error(SysError::DeviceNotFound("sdz".into())).kind(),
            StorageErrorKind::DeviceNotFound
        );
        assert_eq!(
            storage_error(SysError::Cancelled("lsblk cancelled".into())).kind(),
            StorageErrorKind::Cancelled
        );
        assert_eq!(
            storage_error(SysError::Unmount {
                target: "/mnt/data".into(),
                errno: Errno::EBUSY
            })
            .kind(),
            StorageErrorKind::UnmountFail
        );
        let io = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(
            storage_error(SysError::Io(io)).kind(),
            StorageErrorKind::PermissionDenied
        );
        assert_eq!(
            storage_error(SysError::OperationFailed("boom".into())).kind(),
            StorageErrorKind::Internal
        );
    }

    #[test]
    fn mountinfo_entry_becomes_mount_entry() {
        let entry = mount_entry(MountInfoEntry {
            mount_id: 36,
            parent_id: 25,
            root: "/".into(),
            mount_point: "/mnt/data".into(),
            mount_options: vec!["rw".into(), "noatime".into()],
            fs_type: "ext4".into(),
            source: "/dev/sdb1".into(),
            super_options: vec!["rw".into(), "errors=remount-ro".into()],
        });
        assert_eq!(entry.target, "/mnt/data");
        assert_eq!(entry.source, "/dev/sdb1");
        assert!(!entry.is_read_only());
    }
}
