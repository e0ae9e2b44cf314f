//! dedaemon daemon runtime: module orchestration, signal handling, and the
//! instance controller used by the `reload` / `stop` commands.

mod error;
pub mod instance;
pub mod log_rotation;
pub mod paths;
mod runtime;

pub use error::{DaemonError, InstanceError};
pub use instance::{ControlSignal, InstanceController};
pub use runtime::{
    forward_signals, init_tracing, list_blocking, load_config, run, start_blocking,
    write_listing, ControlEvent, Daemon, DaemonState,
};
