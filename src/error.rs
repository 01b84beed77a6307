use thiserror::Error;

/// Errors that can abort a whole scheduler invocation.
///
/// Everything else the scheduler encounters (a failed scrub, an unreadable
/// state record, a mailer hiccup) is logged and recovered from locally; see
/// the per-mount pipeline in [`crate::scheduler`].
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("scheduler was already initialized")]
    AlreadyInitialized,
    #[error("this action must be run as root")]
    NotRoot,
    #[error("could not read the kernel mount table: {0}")]
    MountTableUnavailable(String),
    #[error("failed to parse configuration file: {0}")]
    ConfigParseError(String),
}

#[derive(Error, Debug)]
pub enum BtrfsOpsError {
    #[error("could not execute btrfs: {0}")]
    SpawnFailed(#[from] std::io::Error),
    #[error("btrfs command failed: {0}")]
    CommandFailed(String),
    #[error("failed to parse btrfs output: {0}")]
    ParseError(String),
    #[error("scrub failed: {0}")]
    ScrubFailed(String),
    #[error("balance failed: {0}")]
    BalanceFailed(String),
}

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("could not read state file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not write state file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed state file {path}: {reason}")]
    Parse { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("the sendmail binary could not be found in PATH")]
    SendmailMissing,
    #[error("sendmail exited with a failure status: {0}")]
    MailFailed(String),
    #[error("io error talking to sendmail: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PowerProbeError {
    #[error("dbus call failed: {0}")]
    Dbus(String),
    #[error("could not read {path}: {source}")]
    Sys {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum MountEnumeratorError {
    #[error("could not read mount table: {0}")]
    Unavailable(#[from] std::io::Error),
    #[error("malformed mount table line: {0}")]
    Parse(String),
}
