//! Presence check for the external programs the enabled modules drive.

use dedaemon_core::{Config, ModuleName};

/// Binary each module shells out to, if any.
pub fn required_binary(module: ModuleName) -> Option<&'static str> {
    match module {
        ModuleName::Display => Some("xrandr"),
        ModuleName::Input => Some("xinput"),
        ModuleName::Wallpaper => Some("feh"),
        ModuleName::Process => None,
    }
}

/// Binaries needed by the modules `config` enables.
pub fn required_binaries(config: &Config) -> Vec<&'static str> {
    config.enabled_modules().filter_map(required_binary).collect()
}

/// Required binaries not found on `PATH`.
pub fn missing_binaries(config: &Config) -> Vec<&'static str> {
    missing_with(config, |binary| which::which(binary).is_ok())
}

pub fn missing_with(config: &Config, present: impl Fn(&str) -> bool) -> Vec<&'static str> {
    required_binaries(config)
        .into_iter()
        .filter(|binary| !present(binary))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config(yaml: &str) -> Config {
        Config::parse(Path::new("c.yaml"), yaml).unwrap()
    }

    #[test]
    fn only_enabled_modules_require_binaries() {
        let config = config(
            "general:\n  log: /tmp/l\ndisplay: []\ninput: [{match: a}]\nwallpaper: {path: /x}\nprocess: [{name: p, run: [x]}]\n",
        );
        assert_eq!(required_binaries(&config), vec!["xinput", "feh"]);
    }

    #[test]
    fn missing_filters_by_presence() {
        let config = config("general:\n  log: /tmp/l\ninput: [{match: a}]\nwallpaper: {path: /x}\n");
        assert_eq!(missing_with(&config, |b| b == "feh"), vec!["xinput"]);
        assert!(missing_with(&config, |_| true).is_empty());
    }

    #[test]
    fn process_only_config_needs_nothing() {
        let config = config("general:\n  log: /tmp/l\nprocess: [{name: p, run: [x]}]\n");
        assert!(missing_binaries(&config).is_empty());
    }
}
