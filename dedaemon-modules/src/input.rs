//! Input device properties via `xinput`, re-applied when devices appear.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Value;

use dedaemon_core::{LogSink, Module, ModuleError, ModuleName, RegistryView};

use crate::activation::{next_device_event, Activation, ActivationSlot};
use crate::command;
use crate::devices::{DeviceAction, DeviceEvents, Subsystem};

pub const PROC_INPUT_DEVICES: &str = "/proc/bus/input/devices";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Pointer,
    Keyboard,
}

/// Properties applied to every device whose name contains `pattern`
/// (case-insensitive), optionally restricted to one kind of device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputRule {
    #[serde(rename = "match")]
    pub pattern: String,
    #[serde(default, rename = "type")]
    pub kind: Option<DeviceKind>,
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

impl InputRule {
    fn matches(&self, device: &XinputDevice) -> bool {
        let kind_ok = self.kind.map_or(true, |kind| device.kind == Some(kind));
        kind_ok
            && device
                .name
                .to_lowercase()
                .contains(&self.pattern.to_lowercase())
    }
}

/// A slave device from `xinput list --short`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XinputDevice {
    pub name: String,
    pub kind: Option<DeviceKind>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<InputRule>),
    One(InputRule),
}

pub fn parse_config(value: &Value) -> Result<Vec<InputRule>, ModuleError> {
    let rules = match serde_yaml::from_value(value.clone())? {
        OneOrMany::Many(rules) => rules,
        OneOrMany::One(rule) => vec![rule],
    };
    for rule in &rules {
        for (prop, value) in &rule.options {
            if prop_values(value).is_none() {
                return Err(ModuleError::Invalid(format!(
                    "option '{prop}' of '{}' must be a scalar or a list of scalars",
                    rule.pattern
                )));
            }
        }
    }
    Ok(rules)
}

pub struct InputModule {
    devices: DeviceEvents,
    proc_devices: PathBuf,
    active: ActivationSlot,
}

impl InputModule {
    pub fn new(devices: DeviceEvents) -> Self {
        Self::with_proc_devices(devices, PROC_INPUT_DEVICES)
    }

    pub fn with_proc_devices(devices: DeviceEvents, proc_devices: impl Into<PathBuf>) -> Self {
        Self {
            devices,
            proc_devices: proc_devices.into(),
            active: ActivationSlot::default(),
        }
    }
}

#[async_trait]
impl Module for InputModule {
    fn name(&self) -> ModuleName {
        ModuleName::Input
    }

    fn validate(&self, config: &Value) -> Result<(), ModuleError> {
        parse_config(config).map(|_| ())
    }

    fn start(&self, config: &Value, logger: LogSink, _registry: RegistryView) {
        let rules = match parse_config(config) {
            Ok(rules) => rules,
            Err(err) => {
                logger.error(format!("Invalid configuration: {err}"));
                return;
            }
        };

        let mut activation = Activation::new();
        let mut events = self.devices.subscribe();
        let mut shutdown = activation.shutdown_signal();
        activation.spawn(async move {
            apply_rules(&rules, &logger).await;
            while next_device_event(&mut events, &mut shutdown, |e| {
                e.subsystem == Subsystem::Input && e.action == DeviceAction::Add
            })
            .await
            {
                logger.info("Input device added.");
                apply_rules(&rules, &logger).await;
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
        read_device_names(&self.proc_devices)
    }
}

async fn apply_rules(rules: &[InputRule], logger: &LogSink) {
    let devices = match command::run("xinput", &["list".to_string(), "--short".to_string()]).await {
        Ok(out) => parse_xinput_list(&out),
        Err(err) => {
            logger.error(format!("Failed to list input devices: {err}"));
            return;
        }
    };

    for args in set_prop_commands(rules, &devices) {
        match command::run("xinput", &args).await {
            Ok(_) => logger.info(format!("Set {} on '{}'", args[2], args[1])),
            Err(err) => logger.warn(format!("Failed to set {} on '{}': {err}", args[2], args[1])),
        }
    }
}

/// `xinput` argument lists (`set-prop <device> <prop> <values..>`) for every
/// device matched by a rule.
pub fn set_prop_commands(rules: &[InputRule], devices: &[XinputDevice]) -> Vec<Vec<String>> {
    let mut commands = Vec::new();
    for rule in rules {
        for device in devices.iter().filter(|d| rule.matches(d)) {
            for (prop, value) in &rule.options {
                let Some(values) = prop_values(value) else { continue };
                let mut args = vec!["set-prop".to_string(), device.name.clone(), prop.clone()];
                args.extend(values);
                commands.push(args);
            }
        }
    }
    commands
}

/// Slave devices from `xinput list --short`. Master devices are skipped.
pub fn parse_xinput_list(text: &str) -> Vec<XinputDevice> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let name = fields
                .next()?
                .trim_start_matches(|c: char| !c.is_alphanumeric())
                .trim_end();
            let role = fields.find(|f| f.starts_with('['))?;
            if name.is_empty() || !role.contains("slave") {
                return None;
            }
            let kind = if role.contains("pointer") {
                Some(DeviceKind::Pointer)
            } else if role.contains("keyboard") {
                Some(DeviceKind::Keyboard)
            } else {
                None
            };
            Some(XinputDevice {
                name: name.to_string(),
                kind,
            })
        })
        .collect()
}

fn prop_values(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Sequence(items) => items.iter().map(scalar).collect(),
        other => scalar(other).map(|s| vec![s]),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Device names from a `/proc/bus/input/devices` style listing.
pub fn read_device_names(path: &Path) -> Result<Vec<String>, ModuleError> {
    let text = fs::read_to_string(path).map_err(|source| ModuleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_device_names(&text))
}

fn parse_device_names(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("N: Name="))
        .map(|name| name.trim().trim_matches('"').to_string())
        .collect()
}
