//! `dedaemon <config file>` — run the daemon in the foreground.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use dedaemon_daemon::{start_blocking, DaemonError};

pub fn run(config_path: &Path) -> Result<ExitCode> {
    match start_blocking(config_path) {
        Ok(0) => Ok(ExitCode::SUCCESS),
        Ok(code) => Ok(ExitCode::from(u8::try_from(code).unwrap_or(1))),
        Err(err @ DaemonError::MissingBinaries(_)) => {
            eprintln!("{err}");
            Ok(ExitCode::FAILURE)
        }
        Err(DaemonError::Config(err)) => {
            Err(err).with_context(|| format!("invalid configuration {}", config_path.display()))
        }
        Err(err) => Err(err).context("dedaemon exited with error"),
    }
}
