//! dedaemon core library — configuration, log sinks, join barrier, and the
//! module lifecycle contract.
//!
//! - [`config`] — YAML configuration loading and module sections
//! - [`logger`] — [`LogFile`] / [`LogSink`] shared log file writers
//! - [`barrier`] — join-on-N completion primitive
//! - [`module`] — [`Module`] trait and [`ModuleRegistry`]
//! - [`error`] — [`ConfigError`], [`ModuleError`]

pub mod barrier;
pub mod config;
pub mod error;
pub mod logger;
pub mod module;
pub mod types;

pub use barrier::{join, join_with, JoinSignal, JoinWait};
pub use config::{Config, GeneralConfig};
pub use error::{ConfigError, ModuleError};
pub use logger::{LogFile, LogSink};
pub use module::{Module, ModuleRegistry, RegistryView};
pub use types::{LogLevel, ModuleName};
