//! Configuration loading and whole-file validation through the registry.

use std::path::PathBuf;
use std::sync::Arc;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use async_trait::async_trait;
use serde_yaml::Value;

use dedaemon_core::{
    Config, ConfigError, LogSink, Module, ModuleError, ModuleName, ModuleRegistry, RegistryView,
};

/// Accepts only sequence sections.
struct WantsList(ModuleName);

#[async_trait]
impl Module for WantsList {
    fn name(&self) -> ModuleName {
        self.0
    }

    fn validate(&self, config: &Value) -> Result<(), ModuleError> {
        match config {
            Value::Sequence(_) => Ok(()),
            _ => Err(ModuleError::Invalid("expected a list".into())),
        }
    }

    fn start(&self, _config: &Value, _logger: LogSink, _registry: RegistryView) {}

    async fn stop(&self) {}
}

fn registry() -> ModuleRegistry {
    ModuleRegistry::new(
        ModuleName::ALL
            .into_iter()
            .map(|name| Arc::new(WantsList(name)) as Arc<dyn Module>)
            .collect(),
    )
}

fn write(dir: &TempDir, text: &str) -> PathBuf {
    let file = dir.child("dedaemon.yaml");
    file.write_str(text).expect("write config");
    file.path().to_path_buf()
}

#[test]
fn valid_file_loads_and_validates() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(
        &dir,
        "general:\n  log: /tmp/dedaemon.log\ndisplay:\n  - name: eDP-1\nprocess:\n  - name: x\n",
    );

    let config = Config::load(&path).unwrap();
    registry().validate(&config).unwrap();

    assert_eq!(config.path(), path.as_path());
    assert_eq!(
        config.enabled_modules().collect::<Vec<_>>(),
        vec![ModuleName::Display, ModuleName::Process]
    );
}

#[test]
fn rejected_section_names_module_and_file() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "general:\n  log: /tmp/dedaemon.log\nwallpaper:\n  path: /a.png\n");

    let config = Config::load(&path).unwrap();
    let err = registry().validate(&config).unwrap_err();

    assert!(
        matches!(err, ConfigError::Module { module: ModuleName::Wallpaper, .. }),
        "got: {err}"
    );
    let msg = err.to_string();
    assert!(msg.contains("wallpaper"), "got: {msg}");
    assert!(msg.contains("dedaemon.yaml"), "got: {msg}");
}

#[test]
fn disabled_sections_are_not_validated() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(
        &dir,
        "general:\n  log: /tmp/dedaemon.log\ndisplay: null\ninput: false\nwallpaper: []\n",
    );

    let config = Config::load(&path).unwrap();
    registry().validate(&config).unwrap();
    assert_eq!(config.enabled_modules().count(), 0);
}

#[test]
fn corrupt_yaml_is_a_parse_error_with_path() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, ": : corrupt : yaml : !!!\n  - broken: [unclosed");

    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("dedaemon.yaml"));
}
