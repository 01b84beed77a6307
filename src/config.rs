//! Settings file parsing and the mountpoint → `[default]` → built-in
//! cascade used to resolve per-action intervals and notification targets.

use crate::action::ActionKind;
use crate::duration::parse_duration;
use crate::error::SchedulerError;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const DEFAULT_SECTION: &str = "default";
const KEY_MAIL_ADDRESS: &str = "mail_address";
const KEY_MAIL_FROM: &str = "mail_from";

pub struct Config {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl Config {
    /// An empty configuration, as if no settings file existed at all.
    pub fn empty() -> Self {
        Config {
            sections: BTreeMap::new(),
        }
    }

    /// Load `<sysconfdir>/btrfsd/settings.conf`-style INI. A missing file is
    /// not an error — it resolves to `empty()`.
    pub fn load(path: &Path) -> Result<Self, SchedulerError> {
        if !path.exists() {
            return Ok(Config::empty());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| SchedulerError::ConfigParseError(e.to_string()))?;

        parse(&contents)
            .map(|sections| Config { sections })
            .map_err(SchedulerError::ConfigParseError)
    }

    /// Resolve `<action>_interval` for `mountpoint` via the cascade
    /// (mountpoint section → `[default]` → the action's built-in default),
    /// and parse the winning spec into seconds.
    pub fn interval_for(&self, mountpoint: &str, action: ActionKind) -> u64 {
        let key = action.interval_key();
        let spec = self
            .lookup(mountpoint, &key)
            .unwrap_or_else(|| action.builtin_default_interval());
        parse_duration(spec)
    }

    pub fn mail_address(&self, mountpoint: &str) -> Option<&str> {
        self.lookup(mountpoint, KEY_MAIL_ADDRESS)
    }

    pub fn mail_from(&self, mountpoint: &str) -> Option<&str> {
        self.lookup(mountpoint, KEY_MAIL_FROM)
    }

    fn lookup(&self, mountpoint: &str, key: &str) -> Option<&str> {
        self.sections
            .get(mountpoint)
            .and_then(|s| s.get(key))
            .or_else(|| self.sections.get(DEFAULT_SECTION).and_then(|s| s.get(key)))
            .map(|s| s.as_str())
    }
}

fn parse(contents: &str) -> Result<BTreeMap<String, BTreeMap<String, String>>, String> {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
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

        sections
            .entry(section)
            .or_default()
            .insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(sections)
}
