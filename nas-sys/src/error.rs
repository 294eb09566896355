// SPDX-License-Identifier: GPL-3.0-only

use nix::errno::Errno;
use thiserror::Error;

/// Error types for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Cancelled(String),

    #[error("mount {source_device} on {target}: {errno}")]
    Mount {
        source_device: String,
        target: String,
        errno: Errno,
    },

    #[error("umount {target}: {errno}")]
    Unmount { target: String, errno: Errno },

    #[error("Invalid mountinfo line: {0}")]
    InvalidMountInfoLine(String),

    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
