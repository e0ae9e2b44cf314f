//! Wallpaper via `feh`, re-applied whenever the display layout changes.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Value;

use dedaemon_core::config::expand_home;
use dedaemon_core::{LogSink, Module, ModuleError, ModuleName, RegistryView};

use crate::activation::{next_device_event, Activation, ActivationSlot};
use crate::command;
use crate::devices::{DeviceEvents, Subsystem};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WallpaperMode {
    #[default]
    Fill,
    Scale,
    Center,
    Tile,
    Max,
}

impl WallpaperMode {
    fn feh_flag(self) -> &'static str {
        match self {
            WallpaperMode::Fill => "--bg-fill",
            WallpaperMode::Scale => "--bg-scale",
            WallpaperMode::Center => "--bg-center",
            WallpaperMode::Tile => "--bg-tile",
            WallpaperMode::Max => "--bg-max",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WallpaperConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub mode: WallpaperMode,
}

pub fn parse_config(value: &Value) -> Result<WallpaperConfig, ModuleError> {
    let mut config: WallpaperConfig = serde_yaml::from_value(value.clone())?;
    config.path = expand_home(&config.path);
    Ok(config)
}

/// Arguments for `feh`; `--no-fehbg` keeps it from writing `~/.fehbg`.
pub fn feh_args(config: &WallpaperConfig) -> Vec<String> {
    vec![
        "--no-fehbg".to_string(),
        config.mode.feh_flag().to_string(),
        config.path.display().to_string(),
    ]
}

pub struct WallpaperModule {
    devices: DeviceEvents,
    active: ActivationSlot,
}

impl WallpaperModule {
    pub fn new(devices: DeviceEvents) -> Self {
        Self {
            devices,
            active: ActivationSlot::default(),
        }
    }
}

#[async_trait]
impl Module for WallpaperModule {
    fn name(&self) -> ModuleName {
        ModuleName::Wallpaper
    }

    fn validate(&self, config: &Value) -> Result<(), ModuleError> {
        parse_config(config).map(|_| ())
    }

    fn start(&self, config: &Value, logger: LogSink, registry: RegistryView) {
        let config = match parse_config(config) {
            Ok(config) => config,
            Err(err) => {
                logger.error(format!("Invalid configuration: {err}"));
                return;
            }
        };
        if !config.path.exists() {
            logger.warn(format!("Wallpaper {} does not exist", config.path.display()));
        }

        let mut activation = Activation::new();
        let mut events = self.devices.subscribe();
        let mut shutdown = activation.shutdown_signal();
        activation.spawn(async move {
            set_wallpaper(&config, &logger).await;
            while next_device_event(&mut events, &mut shutdown, |e| {
                e.subsystem == Subsystem::Drm
            })
            .await
            {
                // Let the display module settle the new layout first.
                if registry.is_running(ModuleName::Display) {
                    tokio::time::sleep(crate::activation::SETTLE_WINDOW).await;
                }
                set_wallpaper(&config, &logger).await;
            }
        });
        self.active.replace(activation);
    }

    async fn stop(&self) {
        if let Some(activation) = self.active.take() {
            activation.shutdown().await;
        }
    }
}

async fn set_wallpaper(config: &WallpaperConfig, logger: &LogSink) {
    match command::run("feh", &feh_args(config)).await {
        Ok(_) => logger.info(format!("Set wallpaper {}", config.path.display())),
        Err(err) => logger.error(format!("Failed to set wallpaper: {err}")),
    }
}
