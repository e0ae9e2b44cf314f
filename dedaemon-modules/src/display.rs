//! Display layout via `xrandr`, re-applied on DRM hotplug.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Value;

use dedaemon_core::{LogSink, Module, ModuleError, ModuleName, RegistryView};

use crate::activation::{next_device_event, Activation, ActivationSlot};
use crate::command;
use crate::devices::{DeviceEvents, Subsystem};

pub const DRM_SYSFS: &str = "/sys/class/drm";

/// Output name matching every connected output without its own entry.
pub const ANY_OUTPUT: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Normal,
    Left,
    Right,
    Inverted,
}

impl Rotation {
    fn as_str(self) -> &'static str {
        match self {
            Rotation::Normal => "normal",
            Rotation::Left => "left",
            Rotation::Right => "right",
            Rotation::Inverted => "inverted",
        }
    }
}

/// One entry of the `display` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub name: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub rotate: Option<Rotation>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub off: bool,
}

pub fn parse_config(value: &Value) -> Result<Vec<OutputConfig>, ModuleError> {
    Ok(serde_yaml::from_value(value.clone())?)
}

pub struct DisplayModule {
    devices: DeviceEvents,
    sysfs: PathBuf,
    active: ActivationSlot,
}

impl DisplayModule {
    pub fn new(devices: DeviceEvents) -> Self {
        Self::with_sysfs(devices, DRM_SYSFS)
    }

    pub fn with_sysfs(devices: DeviceEvents, sysfs: impl Into<PathBuf>) -> Self {
        Self {
            devices,
            sysfs: sysfs.into(),
            active: ActivationSlot::default(),
        }
    }
}

#[async_trait]
impl Module for DisplayModule {
    fn name(&self) -> ModuleName {
        ModuleName::Display
    }

    fn validate(&self, config: &Value) -> Result<(), ModuleError> {
        parse_config(config).map(|_| ())
    }

    fn start(&self, config: &Value, logger: LogSink, _registry: RegistryView) {
        let outputs = match parse_config(config) {
            Ok(outputs) => outputs,
            Err(err) => {
                logger.error(format!("Invalid configuration: {err}"));
                return;
            }
        };

        let mut activation = Activation::new();
        let mut events = self.devices.subscribe();
        let mut shutdown = activation.shutdown_signal();
        activation.spawn(async move {
            apply_layout(&outputs, &logger).await;
            while next_device_event(&mut events, &mut shutdown, |e| {
                e.subsystem == Subsystem::Drm
            })
            .await
            {
                logger.info("Display change detected.");
                apply_layout(&outputs, &logger).await;
            }
        });
        self.active.replace(activation);
    }

    async fn stop(&self) {
        if let Some(activation) = self.active.take() {
            activation.shutdown().await;
        }
    }

    async fn list(&self) -> Result<Vec<String>, ModuleError> {
        list_connectors(&self.sysfs)
    }
}

async fn apply_layout(outputs: &[OutputConfig], logger: &LogSink) {
    let query = match command::run("xrandr", &["--query".to_string()]).await {
        Ok(query) => query,
        Err(err) => {
            logger.error(format!("Failed to query outputs: {err}"));
            return;
        }
    };
    let connected = connected_outputs(&query);
    let args = xrandr_args(outputs, &connected);
    if args.is_empty() {
        logger.warn(format!(
            "No configured output among connected outputs: {}",
            connected.join(", ")
        ));
        return;
    }

    match command::run("xrandr", &args).await {
        Ok(_) => logger.info(format!("Applied layout: xrandr {}", args.join(" "))),
        Err(err) => logger.error(format!("Failed to apply layout: {err}")),
    }
}

/// Names of outputs reported as `connected` by `xrandr --query`.
pub fn connected_outputs(query: &str) -> Vec<String> {
    query
        .lines()
        .filter(|line| !line.starts_with(char::is_whitespace))
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            match (words.next(), words.next()) {
                (Some(name), Some("connected")) => Some(name.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Build one `xrandr` invocation covering every connected, configured output.
/// Exact name matches win over the `*` entry.
pub fn xrandr_args(outputs: &[OutputConfig], connected: &[String]) -> Vec<String> {
    let mut args = Vec::new();
    for name in connected {
        let entry = outputs
            .iter()
            .find(|o| o.name == *name)
            .or_else(|| outputs.iter().find(|o| o.name == ANY_OUTPUT));
        let Some(entry) = entry else { continue };

        args.extend(["--output".to_string(), name.clone()]);
        if entry.off {
            args.push("--off".to_string());
            continue;
        }
        match &entry.mode {
            Some(mode) => args.extend(["--mode".to_string(), mode.clone()]),
            None => args.push("--auto".to_string()),
        }
        if let Some(rate) = entry.rate {
            args.extend(["--rate".to_string(), rate.to_string()]);
        }
        if let Some(position) = &entry.position {
            args.extend(["--pos".to_string(), position.clone()]);
        }
        if let Some(rotate) = entry.rotate {
            args.extend(["--rotate".to_string(), rotate.as_str().to_string()]);
        }
        if entry.primary {
            args.push("--primary".to_string());
        }
    }
    args
}

/// `<connector>: <status>` for each DRM connector under `root`.
pub fn list_connectors(root: &Path) -> Result<Vec<String>, ModuleError> {
    let entries = fs::read_dir(root).map_err(|source| ModuleError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let mut connectors = Vec::new();
    for entry in entries.flatten() {
        let status_path = entry.path().join("status");
        let Ok(status) = fs::read_to_string(&status_path) else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let connector = match name.split_once('-') {
            Some((card, rest)) if card.starts_with("card") => rest.to_string(),
            _ => name,
        };
        connectors.push(format!("{connector}: {}", status.trim()));
    }
    connectors.sort();
    Ok(connectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const QUERY: &str = "\
Screen 0: minimum 320 x 200, current 3840 x 1080, maximum 16384 x 16384
eDP-1 connected primary 1920x1080+0+0 (normal left inverted right x axis y axis) 309mm x 174mm
   1920x1080     60.01*+  59.97
HDMI-1 connected 1920x1080+1920+0 (normal left inverted right x axis y axis) 527mm x 296mm
   1920x1080     60.00*+
DP-1 disconnected (normal left inverted right x axis y axis)
";

    fn outputs(yaml: &str) -> Vec<OutputConfig> {
        parse_config(&serde_yaml::from_str(yaml).unwrap()).unwrap()
    }

    #[test]
    fn parses_connected_outputs_only() {
        assert_eq!(connected_outputs(QUERY), vec!["eDP-1", "HDMI-1"]);
    }

    #[test]
    fn exact_entry_wins_over_wildcard() {
        let config = outputs(
            "- name: HDMI-1\n  mode: 1920x1080\n  rate: 60\n  position: 1920x0\n  primary: true\n- name: '*'\n",
        );
        let args = xrandr_args(&config, &connected_outputs(QUERY));
        assert_eq!(
            args,
            vec![
                "--output", "eDP-1", "--auto", "--output", "HDMI-1", "--mode", "1920x1080",
                "--rate", "60", "--pos", "1920x0", "--primary",
            ]
        );
    }

    #[test]
    fn off_and_rotation_are_rendered() {
        let config = outputs("- name: eDP-1\n  off: true\n- name: HDMI-1\n  rotate: left\n");
        let args = xrandr_args(&config, &connected_outputs(QUERY));
        assert_eq!(
            args,
            vec!["--output", "eDP-1", "--off", "--output", "HDMI-1", "--auto", "--rotate", "left"]
        );
    }

    #[test]
    fn unmatched_outputs_are_left_alone() {
        let config = outputs("- name: DP-2\n");
        assert!(xrandr_args(&config, &connected_outputs(QUERY)).is_empty());
    }

    #[test]
    fn unknown_keys_fail_validation() {
        let module = DisplayModule::new(DeviceEvents::new());
        let value: Value = serde_yaml::from_str("- name: x\n  resolution: 4k\n").unwrap();
        assert!(module.validate(&value).is_err());
    }

    #[test]
    fn lists_sysfs_connectors() {
        let dir = TempDir::new().unwrap();
        for (name, status) in [("card0-HDMI-A-1", "disconnected\n"), ("card0-eDP-1", "connected\n")] {
            let connector = dir.path().join(name);
            fs::create_dir(&connector).unwrap();
            fs::write(connector.join("status"), status).unwrap();
        }
        fs::create_dir(dir.path().join("card0")).unwrap();

        let listed = list_connectors(dir.path()).unwrap();
        assert_eq!(listed, vec!["HDMI-A-1: disconnected", "eDP-1: connected"]);
    }
}
