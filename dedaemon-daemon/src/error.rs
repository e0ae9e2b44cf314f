use std::path::PathBuf;

use thiserror::Error;

use dedaemon_core::ConfigError;
use dedaemon_modules::DeviceError;

/// Error surface for the daemon runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("device events: {0}")]
    Device(#[from] DeviceError),

    #[error("Missing binaries, exiting.")]
    MissingBinaries(Vec<String>),

    #[error(transparent)]
    Instance(#[from] InstanceError),
}

/// Failures of the `reload` / `stop` instance controller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstanceError {
    #[error("No dedaemon process is running.")]
    NoneRunning,

    #[error("There are multiple dedaemon processes running.")]
    Multiple { pids: Vec<u32> },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
