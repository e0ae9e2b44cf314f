//! Small shared domain types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed set of subsystems the daemon coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleName {
    Display,
    Input,
    Wallpaper,
    Process,
}

impl ModuleName {
    /// Registry order. Start and stop episodes walk modules in this order.
    pub const ALL: [ModuleName; 4] = [
        ModuleName::Display,
        ModuleName::Input,
        ModuleName::Wallpaper,
        ModuleName::Process,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleName::Display => "display",
            ModuleName::Input => "input",
            ModuleName::Wallpaper => "wallpaper",
            ModuleName::Process => "process",
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown module '{s}'"))
    }
}

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_round_trip_through_from_str() {
        for name in ModuleName::ALL {
            assert_eq!(name.as_str().parse::<ModuleName>(), Ok(name));
        }
        assert!("keyboard".parse::<ModuleName>().is_err());
    }
}
