//! Device hotplug notifications.
//!
//! Watches the device node directories (`/dev/input`, `/dev/dri`) and fans
//! events out over a broadcast channel. Modules may subscribe before
//! [`DeviceEvents::init`]; they simply see nothing until watching starts.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast;

use crate::error::DeviceError;

pub const INPUT_DIR: &str = "/dev/input";
pub const DRM_DIR: &str = "/dev/dri";

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Input,
    Drm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Add,
    Remove,
    Change,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub subsystem: Subsystem,
    pub action: DeviceAction,
    pub path: PathBuf,
}

/// Shared handle to the device-event subsystem.
#[derive(Clone)]
pub struct DeviceEvents {
    tx: broadcast::Sender<DeviceEvent>,
    roots: Arc<[(Subsystem, PathBuf)]>,
    watcher: Arc<Mutex<Option<RecommendedWatcher>>>,
}

impl Default for DeviceEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceEvents {
    pub fn new() -> Self {
        Self::with_roots(vec![
            (Subsystem::Input, PathBuf::from(INPUT_DIR)),
            (Subsystem::Drm, PathBuf::from(DRM_DIR)),
        ])
    }

    /// Watch custom directories instead of the `/dev` defaults.
    pub fn with_roots(roots: Vec<(Subsystem, PathBuf)>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            roots: roots.into(),
            watcher: Arc::new(Mutex::new(None)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }

    /// Deliver an event to every subscriber.
    pub fn emit(&self, event: DeviceEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub fn is_active(&self) -> bool {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Start watching. Missing directories are skipped; calling twice is a no-op.
    pub fn init(&self) -> Result<(), DeviceError> {
        let mut slot = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Ok(());
        }

        let tx = self.tx.clone();
        let roots = self.roots.clone();
        let mut watcher = recommended_watcher(move |event: notify::Result<Event>| match event {
            Ok(event) => {
                for device in classify(&roots, &event) {
                    let _ = tx.send(device);
                }
            }
            Err(err) => tracing::warn!(error = %err, "device watcher error"),
        })?;

        for (subsystem, root) in self.roots.iter() {
            if !root.exists() {
                tracing::warn!(path = %root.display(), ?subsystem, "device directory missing; not watching");
                continue;
            }
            watcher
                .watch(root, RecursiveMode::NonRecursive)
                .map_err(|source| DeviceError::Watch {
                    path: root.clone(),
                    source,
                })?;
            tracing::debug!(path = %root.display(), ?subsystem, "watching device directory");
        }

        *slot = Some(watcher);
        Ok(())
    }

    /// Stop watching and release the watcher.
    pub fn exit(&self) {
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if watcher.is_some() {
            tracing::debug!("device watcher released");
        }
    }
}

fn classify(roots: &[(Subsystem, PathBuf)], event: &Event) -> Vec<DeviceEvent> {
    let action = match event.kind {
        EventKind::Create(_) => DeviceAction::Add,
        EventKind::Remove(_) => DeviceAction::Remove,
        EventKind::Modify(_) => DeviceAction::Change,
        _ => return Vec::new(),
    };
    event
        .paths
        .iter()
        .filter_map(|path| {
            subsystem_for(roots, path).map(|subsystem| DeviceEvent {
                subsystem,
                action,
                path: path.clone(),
            })
        })
        .collect()
}

fn subsystem_for(roots: &[(Subsystem, PathBuf)], path: &Path) -> Option<Subsystem> {
    roots
        .iter()
        .find(|(_, root)| path.starts_with(root))
        .map(|(subsystem, _)| *subsystem)
}
