use std::path::PathBuf;

use thiserror::Error;

/// Errors from the device-event subsystem.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}
