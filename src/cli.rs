//! Command-line surface (C8).

use clap::Parser;

/// Periodic Btrfs maintenance daemon: collects device-error statistics,
/// scrubs, and balances every mounted Btrfs filesystem according to a
/// per-mount interval policy, intended to be invoked periodically by an
/// external timer rather than run as a long-lived service.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Enable debug-level logging.
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,

    /// Print a human-readable status report and exit instead of running
    /// the maintenance pipeline.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub status: bool,
}
