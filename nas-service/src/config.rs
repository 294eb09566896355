// SPDX-License-Identifier: GPL-3.0-only

//! Daemon configuration: a TOML file overridden by command-line flags

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use nas_contracts::MountPointRecord;
use nas_filesystems::MountFlagCatalog;
use nas_types::{MountPointData, SharedResource, ShareUsage};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

#[derive(Debug, Parser)]
#[command(name = "nas-storaged")]
#[command(about = "Storage backend of the NAS administration service")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Refuse every mutating filesystem operation
    #[arg(long)]
    pub read_only: bool,

    /// Log level or filter directive (RUST_LOG still wins)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// A persisted mount point known at startup
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MountPointEntry {
    pub id: String,
    pub path: String,
    pub device: String,
    pub fs_type: Option<String>,
    /// Mount options in fstab syntax ("noatime,uid=1000")
    pub options: String,
    pub mount_at_startup: bool,
}

impl MountPointEntry {
    pub fn to_record(&self, catalog: &MountFlagCatalog) -> MountPointRecord {
        let (custom_flags, flags) = catalog
            .from_data(&self.options)
            .into_iter()
            .partition(|flag| flag.needs_value);
        MountPointRecord {
            id: self.id.clone(),
            path: self.path.clone(),
            device: self.device.clone(),
            fs_type: self.fs_type.clone().filter(|t| !t.is_empty()),
            flags,
            custom_flags,
            is_to_mount_at_startup: self.mount_at_startup,
        }
    }
}

/// A share exported by the sharing daemon
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShareEntry {
    pub name: String,
    pub path: String,
    pub users: Vec<String>,
    pub ro_users: Vec<String>,
    pub usage: ShareUsage,
    pub disabled: bool,
    pub time_machine: bool,
    pub guest_ok: bool,
}

impl ShareEntry {
    pub fn to_share(&self) -> SharedResource {
        SharedResource {
            name: self.name.clone(),
            disabled: self.disabled,
            users: self.users.clone(),
            ro_users: self.ro_users.clone(),
            usage: self.usage,
            time_machine: self.time_machine,
            guest_ok: self.guest_ok,
            mount_point_data: Some(Box::new(MountPointData::new(self.path.clone()))),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub read_only: bool,
    pub secure_mode: bool,
    pub protected_mode: bool,
    pub update_channel: String,
    /// Base directory for mount points given as relative paths
    pub mount_root: PathBuf,
    pub log_level: String,
    /// Daily-rolled log file in addition to stderr
    pub log_file: Option<PathBuf>,
    /// Events a slow client may lag behind before losing the oldest
    pub client_queue_capacity: usize,
    pub heartbeat_interval_secs: u64,
    /// 0 disables periodic rescans
    pub rescan_interval_secs: u64,
    pub operation_timeout_secs: u64,
    pub machine_id: Option<String>,
    pub mount_points: Vec<MountPointEntry>,
    pub shares: Vec<ShareEntry>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            secure_mode: false,
            protected_mode: false,
            update_channel: "none".to_string(),
            mount_root: PathBuf::from("/mnt"),
            log_level: "info".to_string(),
            log_file: None,
            client_queue_capacity: 16,
            heartbeat_interval_secs: 5,
            rescan_interval_secs: 30,
            operation_timeout_secs: 600,
            machine_id: None,
            mount_points: Vec::new(),
            shares: Vec::new(),
        }
    }
}

impl ServiceConfig {
    pub fn from_toml(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(raw).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.resolve_paths();
        config.validate().map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &raw)
    }

    /// File values (or defaults without `--config`), then CLI overrides
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if cli.read_only {
            config.read_only = true;
        }
        if let Some(level) = &cli.log_level {
            config.log_level.clone_from(level);
        }
        Ok(config)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_secs > 0).then(|| Duration::from_secs(self.operation_timeout_secs))
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_secs > 0)
            .then(|| Duration::from_secs(self.heartbeat_interval_secs))
    }

    pub fn rescan_interval(&self) -> Option<Duration> {
        (self.rescan_interval_secs > 0).then(|| Duration::from_secs(self.rescan_interval_secs))
    }

    fn resolve_paths(&mut self) {
        let root = self.mount_root.clone();
        let absolute = |path: &mut String| {
            if !path.is_empty() && !path.starts_with('/') {
                *path = root.join(path.as_str()).to_string_lossy().into_owned();
            }
        };
        for entry in &mut self.mount_points {
            absolute(&mut entry.path);
        }
        for share in &mut self.shares {
            absolute(&mut share.path);
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !self.mount_root.is_absolute() {
            return Err(format!("mount_root {:?} must be absolute", self.mount_root));
        }
        let mut ids = std::collections::BTreeSet::new();
        for entry in &self.mount_points {
            if entry.id.is_empty() || entry.path.is_empty() || entry.device.is_empty() {
                return Err("mount_points entries need id, path and device".to_string());
            }
            if !ids.insert(entry.id.as_str()) {
                return Err(format!("duplicate mount point id '{}'", entry.id));
            }
        }
        if let Some(share) = self.shares.iter().find(|s| s.name.is_empty()) {
            return Err(format!("share for {} has no name", share.path));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
read_only = true
update_channel = "develop"
client_queue_capacity = 4
rescan_interval_secs = 0

[[mount_points]]
id = "1"
path = "media"
device = "/dev/disk/by-id/usb-disk-part1"
fs_type = "ext4"
options = "noatime,errors=remount-ro"
mount_at_startup = true

[[shares]]
name = "media"
path = "media"
users = ["homeassistant"]
usage = "media"
"#;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config = ServiceConfig::from_toml(Path::new("empty.toml"), "").expect("parse");
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.client_queue_capacity, 16);
        assert_eq!(config.operation_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.rescan_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn relative_paths_land_under_mount_root() {
        let config = ServiceConfig::from_toml(Path::new("nas.toml"), SAMPLE).expect("parse");
        assert!(config.read_only);
        assert_eq!(config.rescan_interval(), None);
        assert_eq!(config.mount_points[0].path, "/mnt/media");
        assert_eq!(config.shares[0].path, "/mnt/media");
        assert_eq!(config.shares[0].usage, ShareUsage::Media);
    }

    #[test]
    fn mount_options_split_into_flags() {
        let config = ServiceConfig::from_toml(Path::new("nas.toml"), SAMPLE).expect("parse");
        let record = config.mount_points[0].to_record(&MountFlagCatalog::new());
        assert_eq!(record.flags.len(), 1);
        assert_eq!(record.flags[0].name, "noatime");
        assert_eq!(record.custom_flags[0].to_option(), "errors=remount-ro");
        assert!(record.is_to_mount_at_startup);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let raw = r#"
[[mount_points]]
id = "1"
path = "/mnt/a"
device = "sda1"

[[mount_points]]
id = "1"
path = "/mnt/b"
device = "sdb1"
"#;
        let err = ServiceConfig::from_toml(Path::new("dup.toml"), raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { reason, .. } if reason.contains("duplicate")));
    }

    #[test]
    fn cli_overrides_file_values() {
        let cli = Cli::parse_from(["nas-storaged", "--read-only", "--log-level", "debug"]);
        let config = ServiceConfig::from_cli(&cli).expect("config");
        assert!(config.read_only);
        assert_eq!(config.log_level, "debug");
    }
}
