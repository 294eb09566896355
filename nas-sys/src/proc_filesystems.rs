// SPDX-License-Identifier: GPL-3.0-only

use crate::Result;

const PROC_FILESYSTEMS: &str = "/proc/filesystems";

pub async fn read_kernel_filesystems() -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(PROC_FILESYSTEMS).await?;
    Ok(parse_proc_filesystems(&content))
}

/// Filesystem names from /proc/filesystems ("nodev\tsysfs", "\text4")
pub fn parse_proc_filesystems(input: &str) -> Vec<String> {
    input
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .map(ToString::to_string)
        .collect()
}
