// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error class, used by the route layer to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    InvalidParameter,
    NotFound,
    Conflict,
    AlreadyMounted,
    MountFail,
    UnmountFail,
    DeviceNotFound,
    UnsupportedCapability,
    PermissionDenied,
    Busy,
    ToolFailed,
    Cancelled,
    Internal,
}

impl StorageErrorKind {
    pub fn code(self) -> u16 {
        match self {
            Self::InvalidParameter => 400,
            Self::PermissionDenied => 403,
            Self::NotFound | Self::DeviceNotFound => 404,
            Self::MountFail => 406,
            Self::AlreadyMounted | Self::Conflict => 409,
            Self::UnsupportedCapability => 422,
            Self::Busy => 423,
            Self::Cancelled => 499,
            Self::UnmountFail | Self::ToolFailed | Self::Internal => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageError {
    #[error("invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("{path} is already mounted from {device}")]
    AlreadyMounted { device: String, path: String },

    #[error("mounting {device} on {path} failed: {message}")]
    MountFail {
        device: String,
        path: String,
        message: String,
    },

    #[error("unmounting {path} failed: {message}")]
    UnmountFail { path: String, message: String },

    #[error("device not found: {device}")]
    DeviceNotFound { device: String },

    #[error(
        "{operation} is not supported for {fs_type}: missing {}; install the '{package}' package",
        .missing_tools.join(", ")
    )]
    UnsupportedCapability {
        fs_type: String,
        operation: String,
        missing_tools: Vec<String>,
        package: String,
    },

    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("{device} is busy: {message}")]
    Busy { device: String, message: String },

    #[error("{command} failed on {device} (exit code {}): {message}", .exit_code.map_or_else(|| "none".to_string(), |code| code.to_string()))]
    ToolFailed {
        device: String,
        command: String,
        exit_code: Option<i32>,
        message: String,
    },

    #[error("operation cancelled: {message}")]
    Cancelled { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl StorageError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn device_not_found(device: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            device: device.into(),
        }
    }

    pub fn tool_failed(
        device: impl Into<String>,
        command: impl Into<String>,
        exit_code: Option<i32>,
        message: impl Into<String>,
    ) -> Self {
        Self::ToolFailed {
            device: device.into(),
            command: command.into(),
            exit_code,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> StorageErrorKind {
        match self {
            Self::InvalidParameter { .. } => StorageErrorKind::InvalidParameter,
            Self::NotFound { .. } => StorageErrorKind::NotFound,
            Self::Conflict { .. } => StorageErrorKind::Conflict,
            Self::AlreadyMounted { .. } => StorageErrorKind::AlreadyMounted,
            Self::MountFail { .. } => StorageErrorKind::MountFail,
            Self::UnmountFail { .. } => StorageErrorKind::UnmountFail,
            Self::DeviceNotFound { .. } => StorageErrorKind::DeviceNotFound,
            Self::UnsupportedCapability { .. } => StorageErrorKind::UnsupportedCapability,
            Self::PermissionDenied { .. } => StorageErrorKind::PermissionDenied,
            Self::Busy { .. } => StorageErrorKind::Busy,
            Self::ToolFailed { .. } => StorageErrorKind::ToolFailed,
            Self::Cancelled { .. } => StorageErrorKind::Cancelled,
            Self::Internal { .. } => StorageErrorKind::Internal,
        }
    }

    pub fn code(&self) -> u16 {
        self.kind().code()
    }

    /// Prefix the free-form message with `context` (e.g., a partition id).
    /// Structured fields are left untouched.
    pub fn with_context(mut self, context: impl std::fmt::Display) -> Self {
        match &mut self {
            Self::InvalidParameter { message }
            | Self::NotFound { message }
            | Self::Conflict { message }
            | Self::MountFail { message, .. }
            | Self::UnmountFail { message, .. }
            | Self::PermissionDenied { message }
            | Self::Busy { message, .. }
            | Self::ToolFailed { message, .. }
            | Self::Cancelled { message }
            | Self::Internal { message } => {
                *message = format!("{context}: {message}");
            }
            Self::AlreadyMounted { .. }
            | Self::DeviceNotFound { .. }
            | Self::UnsupportedCapability { .. } => {}
        }
        self
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
