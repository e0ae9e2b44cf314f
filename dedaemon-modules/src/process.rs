//! Supervised child processes.
//!
//! Each entry is spawned at start; with `restart: true` it is respawned
//! `delay` seconds after exiting. Stop sends SIGTERM, escalating to SIGKILL
//! after [`KILL_GRACE`], and waits for every child to exit.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Deserialize;
use serde_yaml::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;

use dedaemon_core::{LogSink, Module, ModuleError, ModuleName, RegistryView};

use crate::activation::{Activation, ActivationSlot};

pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Floor applied to the configured restart delay.
pub const MIN_RESTART_DELAY: Duration = Duration::from_millis(100);

/// Upper bound for the backoff after repeated spawn failures.
pub const MAX_RESTART_BACKOFF: Duration = Duration::from_secs(60);

/// Wait before the next restart. Each consecutive failed spawn beyond the
/// first doubles the delay, up to [`MAX_RESTART_BACKOFF`] (or the configured
/// delay, if that is longer).
pub fn restart_delay(delay: Duration, spawn_failures: u32) -> Duration {
    let base = delay.max(MIN_RESTART_DELAY);
    let factor = 1u32 << spawn_failures.saturating_sub(1).min(16);
    base.saturating_mul(factor).min(MAX_RESTART_BACKOFF.max(base))
}

fn default_delay() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessConfig {
    pub name: String,
    pub run: Vec<String>,
    #[serde(default)]
    pub restart: bool,
    /// Seconds to wait before a restart.
    #[serde(default = "default_delay")]
    pub delay: f64,
}

pub fn parse_config(value: &Value) -> Result<Vec<ProcessConfig>, ModuleError> {
    let entries: Vec<ProcessConfig> = serde_yaml::from_value(value.clone())?;
    for entry in &entries {
        if entry.run.is_empty() {
            return Err(ModuleError::Invalid(format!(
                "process '{}' has an empty 'run' list",
                entry.name
            )));
        }
        if !entry.delay.is_finite() || entry.delay < 0.0 {
            return Err(ModuleError::Invalid(format!(
                "process '{}' has an invalid delay {}",
                entry.name, entry.delay
            )));
        }
    }
    Ok(entries)
}

#[derive(Default)]
pub struct ProcessModule {
    active: ActivationSlot,
}

impl ProcessModule {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Module for ProcessModule {
    fn name(&self) -> ModuleName {
        ModuleName::Process
    }

    fn validate(&self, config: &Value) -> Result<(), ModuleError> {
        parse_config(config).map(|_| ())
    }

    fn start(&self, config: &Value, logger: LogSink, _registry: RegistryView) {
        let entries = match parse_config(config) {
            Ok(entries) => entries,
            Err(err) => {
                logger.error(format!("Invalid configuration: {err}"));
                return;
            }
        };

        let mut activation = Activation::new();
        for entry in entries {
            let shutdown = activation.shutdown_signal();
            activation.spawn(supervise(entry, logger.clone(), shutdown));
        }
        self.active.replace(activation);
    }

    async fn stop(&self) {
        if let Some(activation) = self.active.take() {
            activation.shutdown().await;
        }
    }
}

async fn supervise(entry: ProcessConfig, logger: LogSink, mut shutdown: watch::Receiver<bool>) {
    let delay = Duration::from_secs_f64(entry.delay);
    let mut spawn_failures = 0u32;
    loop {
        match spawn(&entry, &logger) {
            Ok(mut child) => {
                spawn_failures = 0;
                let exited = tokio::select! {
                    status = child.wait() => Some(status),
                    _ = shutdown.changed() => None,
                };
                match exited {
                    Some(Ok(status)) => logger.info(format!("{} exited with {status}", entry.name)),
                    Some(Err(err)) => {
                        logger.error(format!("Failed to wait for {}: {err}", entry.name))
                    }
                    None => {
                        terminate(&entry.name, &mut child, &logger).await;
                        return;
                    }
                }
            }
            Err(err) => {
                spawn_failures = spawn_failures.saturating_add(1);
                logger.error(format!("Failed to start {}: {err}", entry.name));
            }
        }

        if !entry.restart {
            return;
        }
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(restart_delay(delay, spawn_failures)) => {}
        }
        logger.info(format!("Restarting {}", entry.name));
    }
}

fn spawn(entry: &ProcessConfig, logger: &LogSink) -> Result<Child, ModuleError> {
    let (program, args) = entry
        .run
        .split_first()
        .ok_or_else(|| ModuleError::Invalid(format!("process '{}' has nothing to run", entry.name)))?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ModuleError::Spawn {
            program: program.clone(),
            source,
        })?;

    logger.info(format!(
        "Started {} (pid {})",
        entry.name,
        child.id().map(|pid| pid.to_string()).unwrap_or_default()
    ));
    forward_lines(child.stdout.take(), &entry.name, logger);
    forward_lines(child.stderr.take(), &entry.name, logger);
    Ok(child)
}

fn forward_lines<R>(reader: Option<R>, name: &str, logger: &LogSink)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(reader) = reader else { return };
    let name = name.to_string();
    let logger = logger.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            logger.info(format!("{name}: {line}"));
        }
    });
}

async fn terminate(name: &str, child: &mut Child, logger: &LogSink) {
    let pid = child.id().and_then(|pid| i32::try_from(pid).ok());
    if let Some(pid) = pid {
        if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
            tracing::debug!(pid, error = %err, "SIGTERM delivery failed");
        }
    }

    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(Ok(status)) => logger.info(format!("Stopped {name} ({status})")),
        Ok(Err(err)) => logger.error(format!("Failed to wait for {name}: {err}")),
        Err(_) => {
            logger.warn(format!("{name} ignored SIGTERM; killing"));
            if let Err(err) = child.kill().await {
                logger.error(format!("Failed to kill {name}: {err}"));
            }
        }
    }
}
