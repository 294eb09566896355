// SPDX-License-Identifier: GPL-3.0-only

//! Mount flag catalogs and flag ⇄ mount(2) conversion
//!
//! The catalogs are presentation metadata for the UI; validation patterns are
//! carried for the client and not enforced here.

use std::collections::BTreeMap;

use nas_contracts::{Result, StorageError};
use nas_types::MountFlag;
use tracing::debug;

pub(crate) fn switch(name: &str, description: &str) -> MountFlag {
    MountFlag {
        name: name.to_string(),
        description: description.to_string(),
        ..Default::default()
    }
}

pub(crate) fn valued(name: &str, description: &str, value: &str, pattern: &str) -> MountFlag {
    MountFlag {
        name: name.to_string(),
        description: description.to_string(),
        needs_value: true,
        value_description: Some(value.to_string()),
        value_validation_regex: Some(pattern.to_string()),
        value: None,
    }
}

pub(crate) fn ownership_flags() -> Vec<MountFlag> {
    vec![
        valued("uid", "Set owner of all files to user ID", "User ID (numeric)", "^[0-9]+$"),
        valued("gid", "Set group of all files to group ID", "Group ID (numeric)", "^[0-9]+$"),
        valued(
            "fmask",
            "Set file permissions mask (octal)",
            "Octal permission mask (e.g., 0022)",
            "^[0-7]{3,4}$",
        ),
        valued(
            "dmask",
            "Set directory permissions mask (octal)",
            "Octal permission mask (e.g., 0022)",
            "^[0-7]{3,4}$",
        ),
    ]
}

/// Filesystem-agnostic flags in presentation order
const STANDARD_FLAGS: &[(&str, &str)] = &[
    ("ro", "Mount read-only"),
    ("rw", "Mount read-write (default)"),
    ("sync", "All I/O to the filesystem should be done synchronously"),
    ("async", "All I/O to the filesystem should be done asynchronously"),
    ("atime", "Update inode access times (default)"),
    ("noatime", "Do not update inode access times on this filesystem"),
    ("diratime", "Update directory inode access times on this filesystem"),
    ("nodiratime", "Do not update directory inode access times on this filesystem"),
    ("dev", "Interpret character or block special devices on the filesystem"),
    ("nodev", "Do not interpret character or block special devices on the filesystem"),
    ("exec", "Permit execution of binaries"),
    ("noexec", "Do not permit execution of binaries"),
    ("suid", "Permit set-user-id or set-group-id bits to take effect"),
    ("nosuid", "Do not permit set-user-id or set-group-id bits to take effect"),
    ("remount", "Attempt to remount an already-mounted filesystem"),
    ("defaults", "Use default options: rw, suid, dev, exec, auto, nouser, async"),
    ("relatime", "Update inode access times relative to modify or change time"),
];

/// Flags that set a mount(2) bit
const SYSCALL_FLAGS: &[(&str, libc::c_ulong)] = &[
    ("ro", libc::MS_RDONLY),
    ("nosuid", libc::MS_NOSUID),
    ("nodev", libc::MS_NODEV),
    ("noexec", libc::MS_NOEXEC),
    ("sync", libc::MS_SYNCHRONOUS),
    ("remount", libc::MS_REMOUNT),
    ("mand", libc::MS_MANDLOCK),
    ("dirsync", libc::MS_DIRSYNC),
    ("noatime", libc::MS_NOATIME),
    ("nodiratime", libc::MS_NODIRATIME),
    ("bind", libc::MS_BIND),
    ("rec", libc::MS_REC),
    ("silent", libc::MS_SILENT),
    ("posixacl", libc::MS_POSIXACL),
    ("unbindable", libc::MS_UNBINDABLE),
    ("private", libc::MS_PRIVATE),
    ("slave", libc::MS_SLAVE),
    ("shared", libc::MS_SHARED),
    ("relatime", libc::MS_RELATIME),
    ("strictatime", libc::MS_STRICTATIME),
];

/// Default states or mount(8)-only options; dropped without a warning
const IGNORED_FLAGS: &[&str] = &[
    "rw", "async", "atime", "diratime", "dev", "exec", "suid", "defaults", "auto", "noauto",
    "nouser", "user", "_netdev", "nofail",
];

/// Output of [`MountFlagCatalog::to_syscall`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyscallFlags {
    /// MS_* bits
    pub bits: u64,
    /// Comma-joined filesystem option string
    pub data: String,
}

/// Standard and per-type flag catalogs
#[derive(Debug, Clone, Default)]
pub struct MountFlagCatalog {
    by_type: BTreeMap<String, Vec<MountFlag>>,
}

impl MountFlagCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, fs_type: &str, flags: Vec<MountFlag>) {
        self.by_type.insert(fs_type.to_string(), flags);
    }

    /// Standard flags offered to the user (defaults are omitted)
    pub fn standard(&self) -> Vec<MountFlag> {
        STANDARD_FLAGS
            .iter()
            .filter(|(name, _)| !IGNORED_FLAGS.contains(name))
            .map(|(name, description)| switch(name, description))
            .collect()
    }

    /// Flags specific to `fs_type`, empty for unknown types
    pub fn specific(&self, fs_type: &str) -> Vec<MountFlag> {
        self.by_type.get(fs_type).cloned().unwrap_or_default()
    }

    fn describe(&self, name: &str) -> Option<MountFlag> {
        let lower = name.to_ascii_lowercase();
        STANDARD_FLAGS
            .iter()
            .find(|(n, _)| *n == lower)
            .map(|(n, d)| switch(n, d))
            .or_else(|| {
                self.by_type
                    .values()
                    .flatten()
                    .find(|flag| flag.name.eq_ignore_ascii_case(&lower))
                    .cloned()
            })
    }

    /// Split flags into mount(2) bits and the filesystem data string.
    ///
    /// Valued flags always go to the data string. Bare flags set their MS_*
    /// bit when one exists; defaults are dropped; anything else is passed to
    /// the filesystem in the data string.
    pub fn to_syscall(&self, flags: &[MountFlag]) -> Result<SyscallFlags> {
        let mut bits: libc::c_ulong = 0;
        let mut data = Vec::new();

        for flag in flags {
            let name = flag.name.trim();
            if name.is_empty() {
                continue;
            }
            let lower = name.to_ascii_lowercase();
            let value = flag.value.as_deref().map(str::trim).unwrap_or_default();

            if !value.is_empty() {
                if !flag.needs_value {
                    return Err(StorageError::invalid_parameter(format!(
                        "mount flag '{name}' is a switch and takes no value"
                    )));
                }
                if value.contains(',') {
                    return Err(StorageError::invalid_parameter(format!(
                        "value for mount flag '{name}' must not contain ','"
                    )));
                }
                data.push(format!("{name}={value}"));
                continue;
            }

            if let Some((_, bit)) = SYSCALL_FLAGS.iter().find(|(n, _)| *n == lower) {
                bits |= bit;
            } else if lower == "acl" {
                bits |= libc::MS_POSIXACL;
            } else if IGNORED_FLAGS.contains(&lower.as_str()) {
                debug!(flag = name, "ignoring default mount flag");
            } else {
                data.push(name.to_string());
            }
        }

        Ok(SyscallFlags {
            bits: u64::from(bits),
            data: data.join(","),
        })
    }

    /// Named flags for every MS_* bit set in `bits`
    pub fn from_syscall(&self, bits: u64) -> Vec<MountFlag> {
        SYSCALL_FLAGS
            .iter()
            .filter(|(_, bit)| *bit != 0 && bits & u64::from(*bit) == u64::from(*bit))
            .map(|(name, _)| self.describe(name).unwrap_or_else(|| MountFlag::named(*name)))
            .collect()
    }

    /// Parse an option string ("ro,uid=1000") into described flags
    pub fn from_data(&self, data: &str) -> Vec<MountFlag> {
        data.split(',')
            .map(str::trim)
            .filter(|opt| !opt.is_empty())
            .map(|opt| {
                let (name, value) = match opt.split_once('=') {
                    Some((name, value)) => (name.trim(), Some(value.trim())),
                    None => (opt, None),
                };
                let mut flag = self
                    .describe(name)
                    .unwrap_or_else(|| MountFlag::named(name));
                flag.name = name.to_string();
                flag.needs_value = value.is_some();
                flag.value = value.map(ToString::to_string);
                flag
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> MountFlagCatalog {
        let mut catalog = MountFlagCatalog::new();
        catalog.register("vfat", ownership_flags());
        catalog
    }

    #[test]
    fn standard_catalog_omits_defaults() {
        let names: Vec<_> = catalog().standard().into_iter().map(|f| f.name).collect();
        assert!(names.contains(&"ro".to_string()));
        assert!(names.contains(&"noatime".to_string()));
        assert!(!names.contains(&"rw".to_string()));
        assert!(!names.contains(&"defaults".to_string()));
    }

    #[test]
    fn splits_bits_and_data() {
        let flags = vec![
            MountFlag::named("ro"),
            MountFlag::named("noatime"),
            MountFlag::named("defaults"),
            MountFlag::named("acl"),
            MountFlag::named("autodefrag"),
            MountFlag::with_value("uid", "1000"),
        ];
        let converted = catalog().to_syscall(&flags).expect("convert flags");
        let expected = libc::MS_RDONLY | libc::MS_NOATIME | libc::MS_POSIXACL;
        assert_eq!(converted.bits, u64::from(expected));
        assert_eq!(converted.data, "autodefrag,uid=1000");
    }

    #[test]
    fn value_on_switch_is_rejected() {
        let mut flag = MountFlag::named("ro");
        flag.value = Some("yes".into());
        let err = catalog().to_syscall(&[flag]).unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[test]
    fn comma_in_value_is_rejected() {
        let flag = MountFlag::with_value("uid", "0,exec");
        assert!(catalog().to_syscall(&[flag]).is_err());
    }

    #[test]
    fn bits_convert_back_to_flags() {
        let bits = u64::from(libc::MS_RDONLY | libc::MS_NOSUID);
        let flags = catalog().from_syscall(bits);
        let names: Vec<_> = flags.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["ro", "nosuid"]);
        assert_eq!(flags[0].description, "Mount read-only");
    }

    #[test]
    fn data_string_picks_up_descriptions() {
        let flags = catalog().from_data("uid=1000, iocharset=utf8,ro");
        assert_eq!(flags.len(), 3);
        assert_eq!(flags[0].value.as_deref(), Some("1000"));
        assert_eq!(flags[0].description, "Set owner of all files to user ID");
        assert!(flags[1].needs_value);
        assert!(!flags[2].needs_value);
    }
}
