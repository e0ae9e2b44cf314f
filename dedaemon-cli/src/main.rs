//! dedaemon — desktop environment daemon.
//!
//! # Usage
//!
//! ```text
//! dedaemon <config file>
//! dedaemon list
//! dedaemon reload
//! dedaemon stop
//! ```

mod commands;

use std::convert::Infallible;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::Result;
use clap::Parser;

use dedaemon_daemon::init_tracing;

#[derive(Parser, Debug)]
#[command(
    name = "dedaemon",
    version,
    about = "Keep displays, input devices, wallpaper and helper processes configured",
    long_about = None,
)]
struct Cli {
    /// Configuration file to run with, or one of `list`, `reload`, `stop`.
    invocation: Option<Invocation>,
}

/// What the single positional argument asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Invocation {
    List,
    Reload,
    Stop,
    Run(PathBuf),
}

impl FromStr for Invocation {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "list" => Self::List,
            "reload" => Self::Reload,
            "stop" => Self::Stop,
            path => Self::Run(PathBuf::from(path)),
        })
    }
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    tracing::debug!(invocation = ?cli.invocation, "dedaemon invoked");

    match cli.invocation {
        None => {
            commands::print_usage();
            Ok(ExitCode::FAILURE)
        }
        Some(Invocation::List) => commands::list::run(),
        Some(Invocation::Reload) => commands::control::reload(),
        Some(Invocation::Stop) => commands::control::stop(),
        Some(Invocation::Run(path)) => commands::run::run(&path),
    }
}
