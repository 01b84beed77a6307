//! btrfsd — a periodic, privileged host-side Btrfs maintenance daemon.
//!
//! The crate is organized leaf-first: [`duration`] and [`template`] are
//! pure utilities; [`action`], [`mount`], [`state`], [`config`] are the
//! data model; [`btrfs_ops`], [`notifier`], [`power`] are external
//! collaborators reached through subprocess, utmp/sendmail, and DBus; and
//! [`scheduler`] is the core controller that ties them together. [`cli`]
//! and [`logging`] are the process-level ambient concerns.

pub mod action;
pub mod btrfs_ops;
pub mod cli;
pub mod config;
pub mod duration;
pub mod error;
pub mod logging;
pub mod mount;
pub mod notifier;
pub mod power;
pub mod scheduler;
pub mod state;
pub mod template;

use std::path::PathBuf;

pub const SYSCONFDIR: &str = "/etc";
pub const LOCALSTATEDIR: &str = "/var";

pub fn config_path() -> PathBuf {
    PathBuf::from(SYSCONFDIR).join("btrfsd").join("settings.conf")
}

pub fn state_dir() -> PathBuf {
    PathBuf::from(LOCALSTATEDIR).join("lib").join("btrfsd")
}

/// Construct a `Scheduler` wired to the real, production collaborators
/// (live mount table, real `btrfs`/`sendmail` subprocesses, real UPower).
pub fn build_scheduler() -> scheduler::Scheduler {
    scheduler::Scheduler::new(
        state_dir(),
        Box::new(mount::MountInfoEnumerator),
        Box::new(btrfs_ops::BtrfsCli),
        Box::new(notifier::SystemNotifier),
        Box::new(power::UPowerProbe),
    )
}
