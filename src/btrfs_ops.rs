//! Wrapper around the external `btrfs` binary (C4).
//!
//! Every operation shells out via `std::process::Command`, mirroring
//! `backup-btrfs::command::CommandSystem`'s direct use of `process::Command`
//! rather than the `exec_rs` abstraction its newer revision introduces (this
//! daemon only ever runs commands locally, so the local/remote `Context`
//! split that crate exists for has no counterpart here).

use crate::error::BtrfsOpsError;
use serde::Deserialize;
use std::process::{Command, Output};

#[cfg(test)]
use mockall::automock;

/// Path to the `btrfs` binary, resolved at build time. A distro packaging
/// this daemon can override this by changing the constant (the original C
/// sourced the equivalent `BTRFS_CMD` from a configure-time substitution).
const BTRFS_CMD: &str = "/usr/bin/btrfs";

#[derive(Debug, Deserialize)]
struct DeviceStatsReport {
    #[serde(rename = "device-stats")]
    device_stats: Vec<DeviceStat>,
}

#[derive(Debug, Deserialize)]
struct DeviceStat {
    device: String,
    devid: String,
    write_io_errs: u64,
    read_io_errs: u64,
    flush_io_errs: u64,
    corruption_errs: u64,
    generation_errs: u64,
}

impl DeviceStat {
    fn total(&self) -> u64 {
        self.write_io_errs
            + self.read_io_errs
            + self.flush_io_errs
            + self.corruption_errs
            + self.generation_errs
    }
}

#[cfg_attr(test, automock)]
pub trait BtrfsOps {
    /// Run `btrfs --format=json device stats <mountpoint>` and return a
    /// human-readable report plus the accumulated error count across every
    /// device and every counter.
    fn read_error_stats(&self, mountpoint: &str) -> Result<(String, u64), BtrfsOpsError>;

    /// Run `btrfs fi df <mountpoint>` and return its trimmed stdout.
    fn read_usage(&self, mountpoint: &str) -> Result<String, BtrfsOpsError>;

    /// Run a blocking, quiet scrub: `btrfs -q scrub start -B <mountpoint>`.
    fn scrub(&self, mountpoint: &str) -> Result<(), BtrfsOpsError>;

    /// Enqueue a balance with the contractually fixed usage thresholds:
    /// `btrfs balance start --enqueue -dusage=15 -musage=10 <mountpoint>`.
    fn balance(&self, mountpoint: &str) -> Result<(), BtrfsOpsError>;
}

pub struct BtrfsCli;

impl BtrfsOps for BtrfsCli {
    fn read_error_stats(&self, mountpoint: &str) -> Result<(String, u64), BtrfsOpsError> {
        let output = run(&[BTRFS_CMD, "--format=json", "device", "stats", mountpoint])?;
        let stdout = check_output(&output)?;

        let report: DeviceStatsReport = serde_json::from_str(&stdout)
            .map_err(|e| BtrfsOpsError::ParseError(e.to_string()))?;

        Ok(build_stats_report(&report.device_stats))
    }

    fn read_usage(&self, mountpoint: &str) -> Result<String, BtrfsOpsError> {
        let output = run(&[BTRFS_CMD, "fi", "df", mountpoint])?;
        let stdout = check_output(&output)?;
        Ok(stdout.trim().to_string())
    }

    fn scrub(&self, mountpoint: &str) -> Result<(), BtrfsOpsError> {
        let output = run(&[BTRFS_CMD, "-q", "scrub", "start", "-B", mountpoint])?;
        if !output.status.success() {
            return Err(BtrfsOpsError::ScrubFailed(merged_output(&output)));
        }
        Ok(())
    }

    fn balance(&self, mountpoint: &str) -> Result<(), BtrfsOpsError> {
        let output = run(&[
            BTRFS_CMD,
            "balance",
            "start",
            "--enqueue",
            "-dusage=15",
            "-musage=10",
            mountpoint,
        ])?;
        if !output.status.success() {
            return Err(BtrfsOpsError::BalanceFailed(merged_output(&output)));
        }
        Ok(())
    }
}

fn run(argv: &[&str]) -> Result<Output, BtrfsOpsError> {
    Command::new(argv[0])
        .args(&argv[1..])
        .output()
        .map_err(BtrfsOpsError::SpawnFailed)
}

fn check_output(output: &Output) -> Result<String, BtrfsOpsError> {
    if !output.status.success() {
        return Err(BtrfsOpsError::CommandFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn merged_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    match (stdout.is_empty(), stderr.is_empty()) {
        (true, true) => String::new(),
        (true, false) => stderr,
        (false, true) => stdout,
        (false, false) => format!("{stderr}\n{stdout}"),
    }
}

fn build_stats_report(devices: &[DeviceStat]) -> (String, u64) {
    let mut intro = String::from("Registered Devices:\n");
    let mut issues = String::from("Issue Report:\n");
    let mut total_errors: u64 = 0;

    for dev in devices {
        intro.push_str(&format!("  \u{2022} {}\n", dev.device));

        let dev_total = dev.total();
        total_errors += dev_total;

        if dev_total == 0 {
            continue;
        }

        issues.push_str(&format!("Device: {}\n", dev.device));
        issues.push_str(&format!("Devid:  {}\n", dev.devid));
        issues.push_str(&format!("Write IO Errors: {}\n", dev.write_io_errs));
        issues.push_str(&format!("Read IO Errors:  {}\n", dev.read_io_errs));
        issues.push_str(&format!("Flush IO Errors: {}\n", dev.flush_io_errs));
        issues.push_str(&format!("Corruption Errors: {}\n", dev.corruption_errs));
        issues.push_str(&format!("Generation Errors: {}\n\n", dev.generation_errs));
    }

    if total_errors == 0 {
        issues.push_str("  \u{2022} No errors found\n");
    }

    intro.push('\n');
    let report = format!("{intro}{issues}");
    (report.trim_end().to_string(), total_errors)
}
