//! Built-in dedaemon modules and the device-event subsystem they share.
//!
//! [`builtin_registry`] wires the four modules (display, input, wallpaper,
//! process) to one [`DeviceEvents`] handle in registry order.

mod activation;
mod command;
pub mod devices;
pub mod display;
pub mod error;
pub mod input;
pub mod process;
pub mod syscheck;
pub mod wallpaper;

use std::sync::Arc;

use dedaemon_core::{Module, ModuleRegistry};

pub use devices::{DeviceAction, DeviceEvent, DeviceEvents, Subsystem};
pub use display::DisplayModule;
pub use error::DeviceError;
pub use input::InputModule;
pub use process::ProcessModule;
pub use wallpaper::WallpaperModule;

/// The fixed module set: display, input, wallpaper, process.
pub fn builtin_registry(devices: &DeviceEvents) -> ModuleRegistry {
    let modules: Vec<Arc<dyn Module>> = vec![
        Arc::new(DisplayModule::new(devices.clone())),
        Arc::new(InputModule::new(devices.clone())),
        Arc::new(WallpaperModule::new(devices.clone())),
        Arc::new(ProcessModule::new()),
    ];
    ModuleRegistry::new(modules)
}
