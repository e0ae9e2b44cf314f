//! `dedaemon reload` / `dedaemon stop` — signal the running instance(s).

use std::process::ExitCode;

use anyhow::Result;

use dedaemon_daemon::{ControlSignal, InstanceController};

/// SIGUSR1 to the one running instance.
pub fn reload() -> Result<ExitCode> {
    signal(ControlSignal::Reload, true, false)
}

/// SIGTERM to every running instance, then wait for all of them to exit.
pub fn stop() -> Result<ExitCode> {
    signal(ControlSignal::Stop, false, true)
}

fn signal(signal: ControlSignal, once: bool, wait_for_confirmation: bool) -> Result<ExitCode> {
    let mut controller = InstanceController::system();
    match controller.kill_running_daemon(signal, once, wait_for_confirmation) {
        Ok(pids) => {
            tracing::debug!(?pids, ?signal, "instances signalled");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(ExitCode::FAILURE)
        }
    }
}
