//! The scheduling and notification controller (C7) — the hard-engineering
//! core. Enumerates mounts, deduplicates by device number, resolves
//! per-action intervals, drives the per-mount pipeline, and orchestrates
//! state, battery, and notification side effects.

use crate::action::ActionKind;
use crate::btrfs_ops::BtrfsOps;
use crate::config::Config;
use crate::error::SchedulerError;
use crate::mount::{Filesystem, MountEnumerator};
use crate::notifier::Notifier;
use crate::power::PowerProbe;
use crate::state::StateRecord;
use chrono::{Local, Utc};
use std::path::{Path, PathBuf};

/// Timer jitter absorbed by backdating the reference time, so an action
/// whose interval has *just* elapsed at the moment an external timer fires
/// a few seconds late is still considered due.
const REFERENCE_TIME_SKEW_SECONDS: i64 = 60;

/// Suppress re-broadcasting the same steady-state error count more often
/// than this.
const BROADCAST_REPEAT_SECONDS: i64 = 6 * 3_600;

/// Suppress re-mailing the same steady-state error count more often than
/// this.
const MAIL_REPEAT_SECONDS: i64 = 20 * 3_600;

const ERROR_MAIL_TEMPLATE: &str = include_str!("../templates/error-mail.tmpl");

/// Whether an action handler actually spawned work. Determines whether its
/// last-run timestamp advances.
enum Outcome {
    Launched,
    NotLaunched,
}

pub struct Scheduler {
    state_dir: PathBuf,
    mount_enumerator: Box<dyn MountEnumerator>,
    btrfs: Box<dyn BtrfsOps>,
    notifier: Box<dyn Notifier>,
    power_probe: Box<dyn PowerProbe>,
    config: Config,
    mounts: Vec<Filesystem>,
    reference_time: i64,
    loaded: bool,
}

impl Scheduler {
    pub fn new(
        state_dir: PathBuf,
        mount_enumerator: Box<dyn MountEnumerator>,
        btrfs: Box<dyn BtrfsOps>,
        notifier: Box<dyn Notifier>,
        power_probe: Box<dyn PowerProbe>,
    ) -> Self {
        Scheduler {
            state_dir,
            mount_enumerator,
            btrfs,
            notifier,
            power_probe,
            config: Config::empty(),
            mounts: Vec::new(),
            reference_time: 0,
            loaded: false,
        }
    }

    /// Enumerate mounts and load configuration. Idempotent guard: a second
    /// call fails with `AlreadyInitialized`.
    pub fn load(&mut self, config_path: &Path) -> Result<(), SchedulerError> {
        if self.loaded {
            return Err(SchedulerError::AlreadyInitialized);
        }

        self.reference_time = Utc::now().timestamp() - REFERENCE_TIME_SKEW_SECONDS;

        self.mounts = self
            .mount_enumerator
            .find_btrfs_mounts()
            .map_err(|e| SchedulerError::MountTableUnavailable(e.to_string()))?;

        self.config = Config::load(config_path)?;
        self.loaded = true;

        Ok(())
    }

    /// Run the per-mount pipeline across every deduplicated Btrfs mount.
    pub fn run(&self) -> Result<(), SchedulerError> {
        if !is_root() {
            return Err(SchedulerError::NotRoot);
        }

        for filesystem in self.deduplicated_mounts() {
            self.run_for_mount(&filesystem);
        }

        Ok(())
    }

    /// Print a human-readable status block per deduplicated filesystem.
    /// Returns `true` iff every state record loaded cleanly.
    pub fn print_status(&self) -> bool {
        let mut clean = true;

        for filesystem in self.deduplicated_mounts() {
            let mountpoints = self.mountpoints_sharing_device(filesystem.device_number);
            println!("Filesystem (device {}):", filesystem.device_number);
            for mp in &mountpoints {
                println!("  Mountpoint: {mp}");
            }

            let mut record = StateRecord::open(&self.state_dir, &filesystem.mountpoint);
            if let Err(e) = record.load() {
                log::warn!("failed to load state for {}: {e}", filesystem.mountpoint);
                clean = false;
            }

            for action in ActionKind::ALL {
                let interval = self.config.interval_for(&filesystem.mountpoint, action);
                let last_run = record.last_action_time(action);
                let last_run_label = if last_run == 0 || record.is_new() {
                    "Never".to_string()
                } else {
                    format_timestamp(last_run)
                };
                println!(
                    "  {}: interval={} last_run={}",
                    action.label(),
                    crate::duration::humanize_duration(interval),
                    last_run_label
                );
            }

            let mail_target = self
                .config
                .mail_address(&filesystem.mountpoint)
                .unwrap_or("(none configured)");
            println!("  Notification target: {mail_target}");
        }

        clean
    }

    /// Sort by mountpoint, then keep only the first mountpoint seen per
    /// distinct device number.
    fn deduplicated_mounts(&self) -> Vec<Filesystem> {
        let mut sorted = self.mounts.clone();
        sorted.sort_by(|a, b| a.mountpoint.cmp(&b.mountpoint));

        let mut seen = std::collections::HashSet::new();
        sorted
            .into_iter()
            .filter(|fs| seen.insert(fs.device_number))
            .collect()
    }

    fn mountpoints_sharing_device(&self, device_number: u64) -> Vec<String> {
        let mut mps: Vec<String> = self
            .mounts
            .iter()
            .filter(|fs| fs.device_number == device_number)
            .map(|fs| fs.mountpoint.clone())
            .collect();
        mps.sort();
        mps
    }

    fn run_for_mount(&self, filesystem: &Filesystem) {
        let mut record = StateRecord::open(&self.state_dir, &filesystem.mountpoint);
        if let Err(e) = record.load() {
            log::warn!("failed to load state for {}: {e}", filesystem.mountpoint);
        }

        for action in ActionKind::ALL {
            self.run_action(filesystem, &mut record, action);
        }

        if let Err(e) = record.save() {
            log::warn!("failed to save state for {}: {e}", filesystem.mountpoint);
        }
    }

    fn run_action(&self, filesystem: &Filesystem, record: &mut StateRecord, action: ActionKind) {
        let interval = self.config.interval_for(&filesystem.mountpoint, action);
        if interval == 0 {
            log::debug!(
                "{}: {} disabled (interval=0)",
                filesystem.mountpoint,
                action.tag()
            );
            return;
        }

        let last_run = record.last_action_time(action);
        if self.reference_time - last_run <= interval as i64 {
            log::debug!(
                "{}: {} not yet due (last_run={}, interval={}s)",
                filesystem.mountpoint,
                action.tag(),
                last_run,
                interval
            );
            return;
        }

        if !action.allowed_on_battery() && self.power_probe.on_battery() {
            log::debug!(
                "{}: {} deferred, host is on battery",
                filesystem.mountpoint,
                action.tag()
            );
            return;
        }

        let outcome = match action {
            ActionKind::Stats => self.run_stats(filesystem, record),
            ActionKind::Scrub => self.run_scrub(filesystem),
            ActionKind::Balance => self.run_balance(filesystem),
        };

        if let Outcome::Launched = outcome {
            record.set_last_action_time_now(action, self.reference_time);
        }
    }

    fn run_stats(&self, filesystem: &Filesystem, record: &mut StateRecord) -> Outcome {
        let (report, total_errors) = match self.btrfs.read_error_stats(&filesystem.mountpoint) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("{}: failed to read device stats: {e}", filesystem.mountpoint);
                return Outcome::NotLaunched;
            }
        };

        if total_errors == 0 {
            record.set_int("errors", "total", 0);
            return Outcome::Launched;
        }

        let prev_errors = record.get_int("errors", "total", 0) as u64;
        record.set_int("errors", "total", total_errors as i64);

        let new_errors_found = total_errors > prev_errors;
        let broadcast_sent = record.get_int("messages", "broadcast_sent", 0);
        let should_broadcast = new_errors_found
            || self.reference_time - broadcast_sent > BROADCAST_REPEAT_SECONDS;

        if should_broadcast {
            self.notifier.broadcast(&format!(
                "btrfsd: device errors detected on {}. Run `btrfs device stats {}` for details.",
                filesystem.mountpoint, filesystem.mountpoint
            ));
            record.set_int("messages", "broadcast_sent", self.reference_time);
        }

        match self.config.mail_address(&filesystem.mountpoint) {
            Some(to) => {
                self.maybe_send_error_mail(filesystem, record, to, &report, new_errors_found)
            }
            None => {
                log::warn!(
                    "{}: device errors detected but no mail_address configured",
                    filesystem.mountpoint
                );
            }
        }

        Outcome::Launched
    }

    fn maybe_send_error_mail(
        &self,
        filesystem: &Filesystem,
        record: &mut StateRecord,
        to: &str,
        issue_report: &str,
        new_errors_found: bool,
    ) {
        let mail_sent = record.get_int("messages", "issue_mail_sent", 0);
        let elapsed = self.reference_time - mail_sent;

        if !new_errors_found && elapsed < MAIL_REPEAT_SECONDS {
            log::debug!(
                "{}: suppressing error mail, last sent {elapsed}s ago",
                filesystem.mountpoint
            );
            return;
        }

        let fs_usage = self
            .btrfs
            .read_usage(&filesystem.mountpoint)
            .unwrap_or_else(|_| "Failed to read usage data".to_string());

        let mail_from = self
            .config
            .mail_from(&filesystem.mountpoint)
            .unwrap_or("btrfsd@localhost");
        let hostname = hostname();
        let date_time = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let body = crate::notifier::render(
            ERROR_MAIL_TEMPLATE,
            &[
                ("mail_from", Some(mail_from)),
                ("date_time", Some(&date_time)),
                ("hostname", Some(&hostname)),
                ("mountpoint", Some(&filesystem.mountpoint)),
                ("issue_report", Some(issue_report)),
                ("fs_usage", Some(&fs_usage)),
            ],
        );

        match self.notifier.send_email(to, &body) {
            Ok(()) => record.set_int("messages", "issue_mail_sent", self.reference_time),
            Err(e) => log::warn!("{}: failed to send error mail: {e}", filesystem.mountpoint),
        }
    }

    fn run_scrub(&self, filesystem: &Filesystem) -> Outcome {
        match self.btrfs.scrub(&filesystem.mountpoint) {
            Ok(()) => Outcome::Launched,
            Err(e) => {
                log::warn!("{}: scrub failed: {e}", filesystem.mountpoint);
                Outcome::NotLaunched
            }
        }
    }

    fn run_balance(&self, filesystem: &Filesystem) -> Outcome {
        match self.btrfs.balance(&filesystem.mountpoint) {
            Ok(()) => Outcome::Launched,
            Err(e) => {
                log::warn!("{}: balance failed: {e}", filesystem.mountpoint);
                Outcome::NotLaunched
            }
        }
    }
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn hostname() -> String {
    let mut buf = [0u8; 256];
    unsafe {
        if libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) == 0 {
            let cstr = std::ffi::CStr::from_ptr(buf.as_ptr() as *const libc::c_char);
            return cstr.to_string_lossy().to_string();
        }
    }
    "localhost".to_string()
}

fn format_timestamp(unix_seconds: i64) -> String {
    use chrono::TimeZone;
    Local
        .timestamp_opt(unix_seconds, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| unix_seconds.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btrfs_ops::MockBtrfsOps;
    use crate::error::{BtrfsOpsError, MountEnumeratorError};
    use crate::mount::MockMountEnumerator;
    use crate::notifier::MockNotifier;
    use crate::power::MockPowerProbe;
    use tempfile::tempdir;

    fn fs(mountpoint: &str, device_path: &str, device_number: u64) -> Filesystem {
        Filesystem {
            device_path: device_path.to_string(),
            mountpoint: mountpoint.to_string(),
            device_number,
        }
    }

    fn scheduler_with(
        state_dir: PathBuf,
        mounts: Vec<Filesystem>,
        btrfs: MockBtrfsOps,
        notifier: MockNotifier,
        power_probe: MockPowerProbe,
    ) -> Scheduler {
        let mut mount_enumerator = MockMountEnumerator::new();
        mount_enumerator
            .expect_find_btrfs_mounts()
            .returning(move || Ok(mounts.clone()));

        let mut scheduler = Scheduler::new(
            state_dir,
            Box::new(mount_enumerator),
            Box::new(btrfs),
            Box::new(notifier),
            Box::new(power_probe),
        );
        scheduler
            .load(Path::new("/nonexistent/settings.conf"))
            .unwrap();
        scheduler
    }

    #[test]
    fn load_twice_fails_with_already_initialized() {
        let mut mount_enumerator = MockMountEnumerator::new();
        mount_enumerator
            .expect_find_btrfs_mounts()
            .returning(|| Ok(Vec::new()));

        let mut scheduler = Scheduler::new(
            PathBuf::from("/tmp"),
            Box::new(mount_enumerator),
            Box::new(MockBtrfsOps::new()),
            Box::new(MockNotifier::new()),
            Box::new(MockPowerProbe::new()),
        );
        scheduler.load(Path::new("/nonexistent")).unwrap();
        assert!(matches!(
            scheduler.load(Path::new("/nonexistent")),
            Err(SchedulerError::AlreadyInitialized)
        ));
    }

    #[test]
    fn dedup_keeps_lexicographically_first_mountpoint_per_device() {
        let dir = tempdir().unwrap();
        let mounts = vec![
            fs("/mnt/b", "/dev/sda1", 42),
            fs("/mnt/a", "/dev/sda1", 42),
            fs("/mnt/c", "/dev/sdb1", 77),
        ];

        let scheduler = scheduler_with(
            dir.path().to_path_buf(),
            mounts,
            MockBtrfsOps::new(),
            MockNotifier::new(),
            MockPowerProbe::new(),
        );

        let deduped = scheduler.deduplicated_mounts();
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].mountpoint, "/mnt/a");
        assert_eq!(deduped[1].mountpoint, "/mnt/c");
    }

    #[test]
    fn battery_blocked_action_is_never_launched() {
        let dir = tempdir().unwrap();
        let mut btrfs = MockBtrfsOps::new();
        btrfs.expect_scrub().times(0);
        let mut power_probe = MockPowerProbe::new();
        power_probe.expect_on_battery().returning(|| true);

        let scheduler = scheduler_with(
            dir.path().to_path_buf(),
            vec![fs("/mnt/a", "/dev/sda1", 1)],
            btrfs,
            MockNotifier::new(),
            power_probe,
        );

        let mut record = StateRecord::open(&dir.path().to_path_buf(), "/mnt/a");
        record.load().unwrap();
        record.set_int("times", "scrub", 0);
        scheduler.run_action(&fs("/mnt/a", "/dev/sda1", 1), &mut record, ActionKind::Scrub);
    }

    #[test]
    fn mail_suppressed_when_no_new_errors_and_recently_sent() {
        let dir = tempdir().unwrap();
        let mut notifier = MockNotifier::new();
        notifier.expect_send_email().times(0);

        let scheduler = scheduler_with(
            dir.path().to_path_buf(),
            vec![fs("/mnt/a", "/dev/sda1", 1)],
            MockBtrfsOps::new(),
            notifier,
            MockPowerProbe::new(),
        );

        let mut record = StateRecord::open(&dir.path().to_path_buf(), "/mnt/a");
        record.load().unwrap();
        record.set_int(
            "messages",
            "issue_mail_sent",
            scheduler.reference_time - 10 * 3_600,
        );

        scheduler.maybe_send_error_mail(
            &fs("/mnt/a", "/dev/sda1", 1),
            &mut record,
            "ops@example.com",
            "no issues",
            false,
        );
    }

    #[test]
    fn mail_sent_when_new_errors_found_regardless_of_timing() {
        let dir = tempdir().unwrap();
        let mut btrfs = MockBtrfsOps::new();
        btrfs
            .expect_read_usage()
            .returning(|_| Ok("usage text".to_string()));
        let mut notifier = MockNotifier::new();
        notifier.expect_send_email().times(1).returning(|_, _| Ok(()));

        let scheduler = scheduler_with(
            dir.path().to_path_buf(),
            vec![fs("/mnt/a", "/dev/sda1", 1)],
            btrfs,
            notifier,
            MockPowerProbe::new(),
        );

        let mut record = StateRecord::open(&dir.path().to_path_buf(), "/mnt/a");
        record.load().unwrap();
        record.set_int("messages", "issue_mail_sent", scheduler.reference_time);

        scheduler.maybe_send_error_mail(
            &fs("/mnt/a", "/dev/sda1", 1),
            &mut record,
            "ops@example.com",
            "issues found",
            true,
        );
    }

    #[test]
    fn stats_failure_does_not_advance_timestamp() {
        let dir = tempdir().unwrap();
        let mut btrfs = MockBtrfsOps::new();
        btrfs
            .expect_read_error_stats()
            .returning(|_| Err(BtrfsOpsError::CommandFailed("boom".to_string())));

        let scheduler = scheduler_with(
            dir.path().to_path_buf(),
            vec![fs("/mnt/a", "/dev/sda1", 1)],
            btrfs,
            MockNotifier::new(),
            MockPowerProbe::new(),
        );

        let mut record = StateRecord::open(&dir.path().to_path_buf(), "/mnt/a");
        record.load().unwrap();
        record.set_int("times", "stats", 0);

        scheduler.run_action(&fs("/mnt/a", "/dev/sda1", 1), &mut record, ActionKind::Stats);
        assert_eq!(record.last_action_time(ActionKind::Stats), 0);
    }

    #[test]
    fn mount_enumeration_failure_surfaces_as_mount_table_unavailable() {
        let mut mount_enumerator = MockMountEnumerator::new();
        mount_enumerator
            .expect_find_btrfs_mounts()
            .returning(|| Err(MountEnumeratorError::Parse("garbage".to_string())));

        let mut scheduler = Scheduler::new(
            PathBuf::from("/tmp"),
            Box::new(mount_enumerator),
            Box::new(MockBtrfsOps::new()),
            Box::new(MockNotifier::new()),
            Box::new(MockPowerProbe::new()),
        );

        assert!(matches!(
            scheduler.load(Path::new("/nonexistent")),
            Err(SchedulerError::MountTableUnavailable(_))
        ));
    }
}
