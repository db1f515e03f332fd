//! # dockhand — container runtime maintenance console
//!
//! Edits the daemon configuration, relocates the data root with automatic
//! rollback, and snapshots containers and configuration.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;
mod output;
mod prompt;

use std::process::ExitCode;

use clap::Parser;
use dockhand_common::error::DockhandError;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

/// Exit status for failures that leave the host needing attention.
const FATAL_EXIT: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    match commands::execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let fatal = err
                .downcast_ref::<DockhandError>()
                .is_some_and(DockhandError::is_fatal);
            if fatal {
                ExitCode::from(FATAL_EXIT)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
