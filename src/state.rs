//! Per-filesystem state records persisted as small INI-style files (C2).
//!
//! Grounded in `backup-btrfs::configuration`'s file-backed, serde-ish
//! load/save pair, generalized to the original's `GKeyFile`-style grammar
//! (the spec asks not to pull in a heavyweight INI crate for two-level,
//! all-integer data).

use crate::action::ActionKind;
use crate::error::StateStoreError;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// A per-filesystem record: `times.<tag>`, `errors.total`,
/// `messages.issue_mail_sent`, `messages.broadcast_sent`, keyed two levels
/// deep (section, key) with integer values throughout.
pub struct StateRecord {
    path: PathBuf,
    is_new: bool,
    sections: BTreeMap<String, BTreeMap<String, i64>>,
}

impl StateRecord {
    /// Construct the in-memory record for `mountpoint` under `state_dir`.
    /// `is_new` reflects whether the backing file exists at this point;
    /// call `load` to actually populate it.
    pub fn open(state_dir: &Path, mountpoint: &str) -> Self {
        let filename = format!("{}.state", encode_mountpoint(mountpoint));
        let path = state_dir.join(filename);
        let is_new = !path.exists();

        StateRecord {
            path,
            is_new,
            sections: BTreeMap::new(),
        }
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Populate the record from its backing file, if one exists. A missing
    /// file is not an error: `times.scrub` and `times.balance` are pre-seeded
    /// to now so a brand-new filesystem doesn't immediately run expensive
    /// actions, while `times.stats` is left at zero so stats runs at once.
    pub fn load(&mut self) -> Result<(), StateStoreError> {
        if !self.path.exists() {
            let now = Utc::now().timestamp();
            self.set_int("times", ActionKind::Scrub.tag(), now);
            self.set_int("times", ActionKind::Balance.tag(), now);
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| StateStoreError::Read {
            path: self.path.display().to_string(),
            source: e,
        })?;

        self.sections = parse_ini(&contents).map_err(|reason| StateStoreError::Parse {
            path: self.path.display().to_string(),
            reason,
        })?;

        Ok(())
    }

    /// Serialize the record to its backing file, creating the containing
    /// directory (mode 0755) if necessary. Writes to a sibling temp file
    /// first and renames it into place, so a crash mid-write can never
    /// leave a truncated `.state` file behind.
    pub fn save(&self) -> Result<(), StateStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StateStoreError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;

            #[cfg(unix)]
            {
                let mut perms = fs::metadata(parent)
                    .map_err(|e| StateStoreError::Write {
                        path: parent.display().to_string(),
                        source: e,
                    })?
                    .permissions();
                perms.set_mode(0o755);
                fs::set_permissions(parent, perms).map_err(|e| StateStoreError::Write {
                    path: parent.display().to_string(),
                    source: e,
                })?;
            }
        }

        let tmp_path = self.path.with_extension("state.tmp");
        fs::write(&tmp_path, serialize_ini(&self.sections)).map_err(|e| StateStoreError::Write {
            path: tmp_path.display().to_string(),
            source: e,
        })?;

        fs::rename(&tmp_path, &self.path).map_err(|e| StateStoreError::Write {
            path: self.path.display().to_string(),
            source: e,
        })
    }

    pub fn last_action_time(&self, action: ActionKind) -> i64 {
        self.get_int("times", action.tag(), 0)
    }

    pub fn set_last_action_time_now(&mut self, action: ActionKind, reference_time: i64) {
        self.set_int("times", action.tag(), reference_time);
    }

    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .copied()
            .unwrap_or(default)
    }

    pub fn set_int(&mut self, section: &str, key: &str, value: i64) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }
}

fn parse_ini(contents: &str) -> Result<BTreeMap<String, BTreeMap<String, i64>>, String> {
    let mut sections: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for raw_line in contents.lines() {
        let line = raw_line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = Some(name.to_string());
            sections.entry(name.to_string()).or_default();
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("malformed line: {raw_line}"))?;
        let section = current
            .clone()
            .ok_or_else(|| format!("key outside of any section: {raw_line}"))?;
        let value: i64 = value
            .trim()
            .parse()
            .map_err(|_| format!("non-integer value: {raw_line}"))?;

        sections
            .entry(section)
            .or_default()
            .insert(key.trim().to_string(), value);
    }

    Ok(sections)
}

fn serialize_ini(sections: &BTreeMap<String, BTreeMap<String, i64>>) -> String {
    let mut out = String::new();

    for (section, entries) in sections {
        out.push_str(&format!("[{section}]\n"));
        for (key, value) in entries {
            out.push_str(&format!("{key}={value}\n"));
        }
        out.push('\n');
    }

    out
}

/// Derive the stable filename stem a mountpoint encodes to under the state
/// directory: leading `/` stripped, remaining `/` and `\` replaced with
/// `-`, a leading `.` prefixed with `_`, and a CRC32 hash of the
/// lexically-normalized path appended as `_<decimal>`. The root path
/// encodes to the bare `-`, with no hash suffix.
pub fn encode_mountpoint(mountpoint: &str) -> String {
    let canonical = normalize_path(mountpoint);

    if canonical == "/" {
        return "-".to_string();
    }

    let stripped = canonical.strip_prefix('/').unwrap_or(&canonical);
    let mut body = stripped.replace('/', "-").replace('\\', "-");

    if body.starts_with('.') {
        body = format!("_{body}");
    }

    let hash = crc32fast::hash(canonical.as_bytes());
    format!("{body}_{hash}")
}

/// Lexically normalize a path the way a mount table entry would already be
/// normalized by the kernel, without touching the filesystem: resolve `.`
/// and `..` components, never ascending past the root.
fn normalize_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn root_encodes_to_bare_dash() {
        assert_eq!(encode_mountpoint("/"), "-");
        assert_eq!(encode_mountpoint(""), "-");
        assert_eq!(encode_mountpoint(".."), "-");
    }

    #[test]
    fn distinct_paths_with_same_stripped_body_get_distinct_hashes() {
        let a = encode_mountpoint("/a/b/c");
        let b = encode_mountpoint("/a-b/c");
        assert!(a.starts_with("a-b-c_"));
        assert!(b.starts_with("a-b-c_"));
        assert_ne!(a, b);
    }

    #[test]
    fn leading_dot_is_escaped() {
        let encoded = encode_mountpoint("/.snapshots");
        assert!(encoded.starts_with("_.snapshots_"));
    }

    #[test]
    fn new_record_seeds_scrub_and_balance_but_not_stats() {
        let dir = tempdir().unwrap();
        let mut record = StateRecord::open(dir.path(), "/mnt/data");
        assert!(record.is_new());
        record.load().unwrap();

        assert_eq!(record.last_action_time(ActionKind::Stats), 0);
        assert!(record.last_action_time(ActionKind::Scrub) > 0);
        assert!(record.last_action_time(ActionKind::Balance) > 0);
    }

    #[test]
    fn save_then_load_round_trips_values() {
        let dir = tempdir().unwrap();
        {
            let mut record = StateRecord::open(dir.path(), "/mnt/data");
            record.load().unwrap();
            record.set_last_action_time_now(ActionKind::Stats, 1_700_000_000);
            record.set_int("errors", "total", 3);
            record.save().unwrap();
        }

        let mut reloaded = StateRecord::open(dir.path(), "/mnt/data");
        assert!(!reloaded.is_new());
        reloaded.load().unwrap();
        assert_eq!(reloaded.last_action_time(ActionKind::Stats), 1_700_000_000);
        assert_eq!(reloaded.get_int("errors", "total", -1), 3);
    }

    #[test]
    fn malformed_line_is_a_parse_error() {
        let result = parse_ini("[times]\nnotakeyvalue\n");
        assert!(result.is_err());
    }

    #[test]
    fn get_int_returns_default_when_absent() {
        let dir = tempdir().unwrap();
        let record = StateRecord::open(dir.path(), "/mnt/data");
        assert_eq!(record.get_int("messages", "issue_mail_sent", 0), 0);
    }
}
