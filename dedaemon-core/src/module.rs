//! Module lifecycle contract and the fixed module registry.
//!
//! The daemon owns every `running` flag; modules only get a read-only
//! [`RegistryView`] of their siblings.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_yaml::Value;

use crate::config::Config;
use crate::error::{ConfigError, ModuleError};
use crate::logger::LogSink;
use crate::types::ModuleName;

/// A pluggable subsystem driven by one configuration section.
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> ModuleName;

    /// Reject a section this module could not start with. Runs at parse
    /// time so a bad section invalidates the whole configuration.
    fn validate(&self, _config: &Value) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Activate with this module's section. Must not block: long-running
    /// work belongs in spawned tasks.
    fn start(&self, config: &Value, logger: LogSink, registry: RegistryView);

    /// Tear down everything `start` set up. Resolves once teardown is done.
    async fn stop(&self);

    /// Enumerate the devices or resources this module manages.
    async fn list(&self) -> Result<Vec<String>, ModuleError> {
        Err(ModuleError::ListUnsupported(self.name()))
    }
}

struct Slot {
    module: Arc<dyn Module>,
    running: Arc<AtomicBool>,
}

/// The fixed, ordered set of modules.
pub struct ModuleRegistry {
    slots: Vec<Slot>,
}

impl ModuleRegistry {
    pub fn new(modules: Vec<Arc<dyn Module>>) -> Self {
        Self {
            slots: modules
                .into_iter()
                .map(|module| Slot {
                    module,
                    running: Arc::new(AtomicBool::new(false)),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn names(&self) -> Vec<ModuleName> {
        self.slots.iter().map(|slot| slot.module.name()).collect()
    }

    pub fn get(&self, name: ModuleName) -> Option<Arc<dyn Module>> {
        self.slot(name).map(|slot| slot.module.clone())
    }

    /// Modules in registry order.
    pub fn modules(&self) -> impl Iterator<Item = &Arc<dyn Module>> + '_ {
        self.slots.iter().map(|slot| &slot.module)
    }

    pub fn is_running(&self, name: ModuleName) -> bool {
        self.slot(name)
            .is_some_and(|slot| slot.running.load(Ordering::SeqCst))
    }

    pub fn set_running(&self, name: ModuleName, running: bool) {
        if let Some(slot) = self.slot(name) {
            slot.running.store(running, Ordering::SeqCst);
        }
    }

    pub fn running_modules(&self) -> Vec<ModuleName> {
        self.slots
            .iter()
            .filter(|slot| slot.running.load(Ordering::SeqCst))
            .map(|slot| slot.module.name())
            .collect()
    }

    /// Read-only view handed to modules at start.
    pub fn view(&self) -> RegistryView {
        RegistryView {
            entries: self
                .slots
                .iter()
                .map(|slot| (slot.module.name(), slot.running.clone()))
                .collect(),
        }
    }

    /// Let every module check its enabled section of `config`.
    pub fn validate(&self, config: &Config) -> Result<(), ConfigError> {
        for module in self.modules() {
            let name = module.name();
            let Some(section) = config.section(name) else {
                continue;
            };
            if !config.is_enabled(name) {
                continue;
            }
            module
                .validate(section)
                .map_err(|source| ConfigError::Module {
                    path: config.path().to_path_buf(),
                    module: name,
                    source,
                })?;
        }
        Ok(())
    }

    fn slot(&self, name: ModuleName) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.module.name() == name)
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .field("running", &self.running_modules())
            .finish()
    }
}

/// What a module can see of its siblings.
#[derive(Clone, Debug)]
pub struct RegistryView {
    entries: Arc<[(ModuleName, Arc<AtomicBool>)]>,
}

impl RegistryView {
    pub fn names(&self) -> impl Iterator<Item = ModuleName> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    pub fn is_running(&self, name: ModuleName) -> bool {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .is_some_and(|(_, running)| running.load(Ordering::SeqCst))
    }
}
