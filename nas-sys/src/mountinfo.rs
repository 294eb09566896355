// SPDX-License-Identifier: GPL-3.0-only

use crate::{Result, SysError};

const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// One parsed line of /proc/self/mountinfo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfoEntry {
    pub mount_id: u32,
    pub parent_id: u32,
    pub root: String,
    pub mount_point: String,
    pub mount_options: Vec<String>,
    pub fs_type: String,
    pub source: String,
    pub super_options: Vec<String>,
}

pub async fn read_mountinfo() -> Result<Vec<MountInfoEntry>> {
    let content = tokio::fs::read_to_string(MOUNTINFO_PATH).await?;
    parse_mountinfo(&content)
}

pub fn parse_mountinfo(input: &str) -> Result<Vec<MountInfoEntry>> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Result<MountInfoEntry> {
    let invalid = || SysError::InvalidMountInfoLine(line.to_string());

    let (left, right) = line.split_once(" - ").ok_or_else(invalid)?;

    let mut left_fields = left.split_whitespace();
    let mount_id = left_fields
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(invalid)?;
    let parent_id = left_fields
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(invalid)?;
    let _major_minor = left_fields.next().ok_or_else(invalid)?;
    let root = left_fields.next().ok_or_else(invalid)?;
    let mount_point = left_fields.next().ok_or_else(invalid)?;
    let mount_options = left_fields.next().ok_or_else(invalid)?;

    let mut right_fields = right.split_whitespace();
    let fs_type = right_fields.next().ok_or_else(invalid)?;
    let source = right_fields.next().unwrap_or("none");
    let super_options = right_fields.next().unwrap_or("");

    Ok(MountInfoEntry {
        mount_id,
        parent_id,
        root: unescape_mount_field(root),
        mount_point: unescape_mount_field(mount_point),
        mount_options: split_options(mount_options),
        fs_type: fs_type.to_string(),
        source: unescape_mount_field(source),
        super_options: split_options(super_options),
    })
}

fn split_options(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter(|opt| !opt.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Decode the kernel's octal escapes (`\040` for space, ...)
fn unescape_mount_field(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\'
            && index + 4 <= bytes.len()
            && bytes[index + 1..index + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let octal = &value[index + 1..index + 4];
            if let Ok(num) = u8::from_str_radix(octal, 8) {
                output.push(num);
                index += 4;
                continue;
            }
        }

        output.push(bytes[index]);
        index += 1;
    }

    String::from_utf8_lossy(&output).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
22 1 0:21 / /proc rw,nosuid,nodev,noexec,relatime shared:12 - proc proc rw
98 29 8:17 / /mnt/My\\040Disk rw,noatime shared:50 - ext4 /dev/sdb1 rw,errors=remount-ro
99 29 8:33 / /mnt/backup ro,relatime - vfat /dev/sdc1 ro,fmask=0022,dmask=0022,iocharset=utf8
";

    #[test]
    fn parses_fields_and_options() {
        let entries = parse_mountinfo(SAMPLE).expect("parse mountinfo");
        assert_eq!(entries.len(), 3);

        let ext4 = &entries[1];
        assert_eq!(ext4.mount_id, 98);
        assert_eq!(ext4.parent_id, 29);
        assert_eq!(ext4.mount_point, "/mnt/My Disk");
        assert_eq!(ext4.fs_type, "ext4");
        assert_eq!(ext4.source, "/dev/sdb1");
        assert_eq!(ext4.mount_options, vec!["rw", "noatime"]);
        assert_eq!(ext4.super_options, vec!["rw", "errors=remount-ro"]);

        let vfat = &entries[2];
        assert!(vfat.mount_options.contains(&"ro".to_string()));
        assert!(vfat.super_options.contains(&"iocharset=utf8".to_string()));
    }

    #[test]
    fn rejects_line_without_separator() {
        let result = parse_mountinfo("22 1 0:21 / /proc rw proc proc rw\n");
        assert!(matches!(result, Err(SysError::InvalidMountInfoLine(_))));
    }

    #[test]
    fn unescapes_trailing_escape() {
        assert_eq!(unescape_mount_field("/mnt/a\\040b"), "/mnt/a b");
        assert_eq!(unescape_mount_field("/mnt/tab\\011"), "/mnt/tab\t");
        assert_eq!(unescape_mount_field("/mnt/odd\\09"), "/mnt/odd\\09");
    }
}
