//! Configuration file loading.
//!
//! # File layout
//!
//! ```yaml
//! general:
//!   log: ~/.local/share/dedaemon.log
//! display:
//!   - name: "*"
//! input:
//!   - match: touchpad
//!     options:
//!       "libinput Tapping Enabled": 1
//! wallpaper:
//!   path: ~/pictures/wall.png
//! process:
//!   - name: compositor
//!     run: [picom]
//! ```
//!
//! Module sections are kept as raw YAML; each module decodes its own section.
//! A section that is absent, `null`, `false`, or an empty sequence disables
//! that module.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;

use crate::error::{io_err, ConfigError};
use crate::types::ModuleName;

/// The `general` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Shared log file written by every log sink.
    pub log: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    general: GeneralConfig,
    #[serde(default)]
    display: Option<Value>,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    wallpaper: Option<Value>,
    #[serde(default)]
    process: Option<Value>,
}

/// A fully parsed configuration. Replaced as a whole on reload, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub general: GeneralConfig,
    path: PathBuf,
    sections: BTreeMap<ModuleName, Value>,
}

impl Config {
    /// Read and parse the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        Self::parse(path, &contents)
    }

    /// Parse configuration text; `path` is only used for error context.
    pub fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut sections = BTreeMap::new();
        for (name, value) in [
            (ModuleName::Display, raw.display),
            (ModuleName::Input, raw.input),
            (ModuleName::Wallpaper, raw.wallpaper),
            (ModuleName::Process, raw.process),
        ] {
            if let Some(value) = value {
                sections.insert(name, value);
            }
        }

        Ok(Self {
            general: GeneralConfig {
                log: expand_home(&raw.general.log),
            },
            path: path.to_path_buf(),
            sections,
        })
    }

    /// File this configuration was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw section for `name`, if present in the file.
    pub fn section(&self, name: ModuleName) -> Option<&Value> {
        self.sections.get(&name)
    }

    /// Whether `name` should be started under this configuration.
    pub fn is_enabled(&self, name: ModuleName) -> bool {
        self.section(name).is_some_and(section_enabled)
    }

    /// Enabled modules in registry order.
    pub fn enabled_modules(&self) -> impl Iterator<Item = ModuleName> + '_ {
        ModuleName::ALL
            .into_iter()
            .filter(move |name| self.is_enabled(*name))
    }
}

/// `null`, `false`, and empty sequences count as "not configured".
pub fn section_enabled(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::Sequence(items) => !items.is_empty(),
        _ => true,
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
