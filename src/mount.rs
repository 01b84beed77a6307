//! Enumeration of currently mounted Btrfs filesystems (C3).
//!
//! The original C implementation reads the kernel mount table through
//! `libmount`'s `mnt_table_parse_mtab`. This rewrite reads the same
//! information from `/proc/self/mountinfo`, the documented (`proc(5)`)
//! per-process mount table, using the same line-splitting approach
//! `backup-btrfs::commands::get_mount_information` already applies to that
//! exact file format.

use crate::error::MountEnumeratorError;
use std::fs;

#[cfg(test)]
use mockall::automock;

/// An active Btrfs mountpoint, immutable after discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filesystem {
    pub device_path: String,
    pub mountpoint: String,
    pub device_number: u64,
}

#[cfg_attr(test, automock)]
pub trait MountEnumerator {
    /// Enumerate all currently mounted Btrfs filesystems. Ordering is not
    /// guaranteed; the caller (the Scheduler) sorts as needed.
    fn find_btrfs_mounts(&self) -> Result<Vec<Filesystem>, MountEnumeratorError>;
}

pub struct MountInfoEnumerator;

impl MountEnumerator for MountInfoEnumerator {
    fn find_btrfs_mounts(&self) -> Result<Vec<Filesystem>, MountEnumeratorError> {
        let contents = fs::read_to_string("/proc/self/mountinfo")?;
        parse_mountinfo(&contents)
    }
}

fn parse_mountinfo(contents: &str) -> Result<Vec<Filesystem>, MountEnumeratorError> {
    let mut result = Vec::new();

    for line in contents.lines().filter(|l| !l.is_empty()) {
        if let Some(fs) = parse_mountinfo_line(line)? {
            result.push(fs);
        }
    }

    Ok(result)
}

/// Parse a single `/proc/self/mountinfo` line, returning `Some(Filesystem)`
/// only if its filesystem type is `btrfs`.
fn parse_mountinfo_line(line: &str) -> Result<Option<Filesystem>, MountEnumeratorError> {
    let (pre, post) = line
        .split_once(" - ")
        .ok_or_else(|| MountEnumeratorError::Parse(line.to_string()))?;

    let pre_fields: Vec<&str> = pre.split_whitespace().collect();
    // mount-ID parent-ID major:minor root mountpoint options [optional-fields...]
    if pre_fields.len() < 5 {
        return Err(MountEnumeratorError::Parse(line.to_string()));
    }
    let major_minor = pre_fields[2];
    let mountpoint = pre_fields[4];

    let post_fields: Vec<&str> = post.split_whitespace().collect();
    // fstype source super-options
    if post_fields.len() < 2 {
        return Err(MountEnumeratorError::Parse(line.to_string()));
    }
    let fs_type = post_fields[0];
    let source = post_fields[1];

    if fs_type != "btrfs" {
        return Ok(None);
    }

    let device_number = parse_major_minor(major_minor)
        .ok_or_else(|| MountEnumeratorError::Parse(line.to_string()))?;

    Ok(Some(Filesystem {
        device_path: source.to_string(),
        mountpoint: mountpoint.to_string(),
        device_number,
    }))
}

/// Combine a `"major:minor"` pair into the same opaque 64-bit device number
/// the kernel itself would report via `stat(2)`'s `st_dev`.
fn parse_major_minor(spec: &str) -> Option<u64> {
    let (major, minor) = spec.split_once(':')?;
    let major: u64 = major.parse().ok()?;
    let minor: u64 = minor.parse().ok()?;
    Some(unsafe { libc::makedev(major as libc::c_uint, minor as libc::c_uint) as u64 })
}
