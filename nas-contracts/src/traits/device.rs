// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use nas_types::Disk;

use crate::{OperationContext, Result};

/// Turns identifiers into concrete block device paths
#[async_trait]
pub trait DeviceResolver: Send + Sync {
    /// Resolve a device path, by-id path, or bare kernel name to an existing
    /// block device. Fails with `DeviceNotFound` otherwise.
    async fn resolve(&self, identifier: &str) -> Result<String>;

    /// Read up to `len` bytes from the start of `device`
    async fn read_header(&self, device: &str, len: usize) -> Result<Vec<u8>>;
}

/// External device enumeration feeding rescans
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    async fn enumerate(&self, ctx: &OperationContext) -> Result<Vec<Disk>>;
}
