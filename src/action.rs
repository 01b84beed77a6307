//! The three maintenance actions and their fixed metadata.

/// A Btrfs maintenance action. Mirrors the original `BtdBtrfsAction` enum
/// (`btd-fs-record.c`'s `btd_btrfs_action_to_string`/`_from_string`), minus
/// the `Unknown` sentinel, which Rust's exhaustive matching makes
/// unnecessary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Stats,
    Scrub,
    Balance,
}

impl ActionKind {
    /// All actions, in the fixed processing order the scheduler runs them.
    pub const ALL: [ActionKind; 3] = [ActionKind::Stats, ActionKind::Scrub, ActionKind::Balance];

    /// The stable lowercase tag used in config keys and state files.
    pub fn tag(self) -> &'static str {
        match self {
            ActionKind::Stats => "stats",
            ActionKind::Scrub => "scrub",
            ActionKind::Balance => "balance",
        }
    }

    /// A human-readable label, used by `--status`.
    pub fn label(self) -> &'static str {
        match self {
            ActionKind::Stats => "Check for Issues",
            ActionKind::Scrub => "Scrub Filesystem",
            ActionKind::Balance => "Balance Filesystem",
        }
    }

    /// Whether this action may run while the host is on battery power.
    /// Only cheap, read-only `Stats` is allowed; `Scrub` and `Balance`
    /// generate heavy disk I/O and are deferred until on AC power.
    pub fn allowed_on_battery(self) -> bool {
        matches!(self, ActionKind::Stats)
    }

    /// The config key that carries this action's interval, e.g. `"scrub_interval"`.
    pub fn interval_key(self) -> String {
        format!("{}_interval", self.tag())
    }

    /// The built-in default interval spec if neither the mountpoint section
    /// nor `[default]` overrides it.
    pub fn builtin_default_interval(self) -> &'static str {
        match self {
            ActionKind::Stats => "1h",
            ActionKind::Scrub => "1M",
            ActionKind::Balance => "never",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stats_allowed_on_battery() {
        assert!(ActionKind::Stats.allowed_on_battery());
        assert!(!ActionKind::Scrub.allowed_on_battery());
        assert!(!ActionKind::Balance.allowed_on_battery());
    }

    #[test]
    fn interval_key_matches_config_convention() {
        assert_eq!(ActionKind::Scrub.interval_key(), "scrub_interval");
    }

    #[test]
    fn fixed_processing_order() {
        assert_eq!(
            ActionKind::ALL,
            [ActionKind::Stats, ActionKind::Scrub, ActionKind::Balance]
        );
    }
}
