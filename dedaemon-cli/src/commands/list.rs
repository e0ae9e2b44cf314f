//! `dedaemon list` — print display and input devices.

use std::process::ExitCode;

use anyhow::{Context, Result};

use dedaemon_daemon::list_blocking;

pub fn run() -> Result<ExitCode> {
    list_blocking().context("failed to list devices")?;
    Ok(ExitCode::SUCCESS)
}
