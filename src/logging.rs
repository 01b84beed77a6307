//! Startup logging-backend selection (C9).
//!
//! Mirrors `btd_logging_setup`'s three-way choice (console / journal /
//! syslog), but realizes "console" via `env_logger`, the crate
//! `backup-btrfs` already initializes with a bare `env_logger::init()` call.

use log::LevelFilter;
use std::io::{self, IsTerminal, Write};
use std::path::Path;

const SYSTEMD_MARKER: &str = "/run/systemd/system";
const SYSLOG_IDENT: &str = "btrfsd";

/// Install the global logger, picking a backend the same way the daemon's
/// original C implementation did: a real terminal gets colorized output; a
/// systemd-managed non-terminal gets plain lines on stderr (journald
/// captures these automatically); anything else falls back to syslog.
pub fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    if io::stdout().is_terminal() {
        env_logger::Builder::new()
            .filter_level(level)
            .target(env_logger::Target::Stderr)
            .init();
        return;
    }

    if Path::new(SYSTEMD_MARKER).exists() {
        log::set_max_level(level);
        if log::set_boxed_logger(Box::new(JournalLogger)).is_err() {
            eprintln!("logger already initialized");
        }
        return;
    }

    let formatter = syslog::Formatter3164 {
        facility: syslog::Facility::LOG_DAEMON,
        hostname: None,
        process: SYSLOG_IDENT.into(),
        pid: std::process::id(),
    };

    match syslog::unix(formatter) {
        Ok(logger) => {
            log::set_max_level(level);
            if log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger))).is_err() {
                eprintln!("logger already initialized");
            }
        }
        Err(e) => {
            eprintln!("could not connect to syslog ({e}), logging disabled");
        }
    }
}

/// A minimal `log::Log` that writes plain `LEVEL message` lines to stderr,
/// relying on the init system to capture and index them — the same effect
/// `sd_journal_print` achieves directly, without linking against libsystemd.
struct JournalLogger;

impl log::Log for JournalLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let mut stderr = io::stderr();
            let _ = writeln!(stderr, "{} {}", record.level(), record.args());
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}
