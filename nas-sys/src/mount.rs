// SPDX-License-Identifier: GPL-3.0-only

use std::os::unix::fs::PermissionsExt;

use nix::mount::{MntFlags, MsFlags};
use tracing::{debug, info};

use crate::{Result, SysError};

const MOUNT_DIR_MODE: u32 = 0o750;

/// mount(2) on a blocking thread
pub async fn mount_device(
    source: &str,
    target: &str,
    fs_type: &str,
    flags: u64,
    data: &str,
) -> Result<()> {
    let source = source.to_string();
    let target = target.to_string();
    let fs_type = fs_type.to_string();
    let data = data.to_string();

    tokio::task::spawn_blocking(move || {
        let ms_flags = MsFlags::from_bits_truncate(flags as libc::c_ulong);
        let data_opt = (!data.is_empty()).then_some(data.as_str());
        debug!(%source, %target, %fs_type, ?ms_flags, data = %data, "mount(2)");

        nix::mount::mount(
            Some(source.as_str()),
            target.as_str(),
            Some(fs_type.as_str()),
            ms_flags,
            data_opt,
        )
        .map_err(|errno| SysError::Mount {
            source_device: source.clone(),
            target: target.clone(),
            errno,
        })?;

        info!(%source, %target, %fs_type, "mounted");
        Ok(())
    })
    .await
    .map_err(|e| SysError::OperationFailed(format!("mount task failed: {e}")))?
}

/// umount2(2): `force` maps to MNT_FORCE, `lazy` to MNT_DETACH
pub async fn unmount(target: &str, force: bool, lazy: bool) -> Result<()> {
    let target = target.to_string();

    tokio::task::spawn_blocking(move || {
        let mut flags = MntFlags::empty();
        if force {
            flags |= MntFlags::MNT_FORCE;
        }
        if lazy {
            flags |= MntFlags::MNT_DETACH;
        }

        nix::mount::umount2(target.as_str(), flags).map_err(|errno| SysError::Unmount {
            target: target.clone(),
            errno,
        })?;

        info!(%target, force, lazy, "unmounted");
        Ok(())
    })
    .await
    .map_err(|e| SysError::OperationFailed(format!("umount task failed: {e}")))?
}

pub async fn create_mount_dir(path: &str) -> Result<()> {
    tokio::fs::create_dir_all(path).await?;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(MOUNT_DIR_MODE)).await?;
    Ok(())
}

/// Remove an empty mount directory; a missing directory is not an error
pub async fn remove_mount_dir(path: &str) -> Result<()> {
    match tokio::fs::remove_dir(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mount_dir_lifecycle() {
        let base = std::env::temp_dir().join(format!("nas-sys-mount-{}", std::process::id()));
        let dir = base.join("disk");
        let dir = dir.to_string_lossy().into_owned();

        create_mount_dir(&dir).await.expect("create dir");
        let mode = std::fs::metadata(&dir).expect("stat").permissions().mode() & 0o777;
        assert_eq!(mode, MOUNT_DIR_MODE);

        remove_mount_dir(&dir).await.expect("remove dir");
        remove_mount_dir(&dir).await.expect("remove missing dir");
        let _ = std::fs::remove_dir(&base);
    }
}
