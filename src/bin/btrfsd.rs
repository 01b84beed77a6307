use anyhow::{Context as _, Result};
use btrfsd::cli::Cli;
use clap::Parser;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    btrfsd::logging::init(cli.verbose);

    let mut scheduler = btrfsd::build_scheduler();
    scheduler
        .load(&btrfsd::config_path())
        .context("failed to initialize scheduler")?;

    if cli.status {
        return Ok(if scheduler.print_status() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    match scheduler.run() {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            log::error!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
