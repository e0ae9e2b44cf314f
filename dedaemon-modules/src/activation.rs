//! Per-start task bookkeeping shared by the built-in modules.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::devices::DeviceEvent;

/// Quiet period after a hotplug event before reacting, so a burst of node
/// creations triggers one re-apply.
pub(crate) const SETTLE_WINDOW: Duration = Duration::from_millis(300);

/// Tasks spawned by one `start`, torn down together by `stop`.
pub(crate) struct Activation {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Activation {
    pub(crate) fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub(crate) fn spawn(&mut self, task: impl std::future::Future<Output = ()> + Send + 'static) {
        self.tasks.push(tokio::spawn(task));
    }

    pub(crate) async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "module task ended abnormally");
            }
        }
    }
}

/// Holds the current activation of a module, if any.
#[derive(Default)]
pub(crate) struct ActivationSlot {
    inner: Mutex<Option<Activation>>,
}

impl ActivationSlot {
    pub(crate) fn replace(&self, activation: Activation) {
        let previous = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(activation);
        if previous.is_some() {
            tracing::warn!("module started twice without stop; previous tasks detached");
        }
    }

    pub(crate) fn take(&self) -> Option<Activation> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Wait for a device event accepted by `wanted`, then let the burst settle.
/// Returns `false` once the module is shutting down or the channel closes.
pub(crate) async fn next_device_event(
    events: &mut broadcast::Receiver<DeviceEvent>,
    shutdown: &mut watch::Receiver<bool>,
    wanted: impl Fn(&DeviceEvent) -> bool,
) -> bool {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return false,
            event = events.recv() => match event {
                Ok(event) if wanted(&event) => break,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "device events lagged; re-applying");
                    break;
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }

    tokio::select! {
        _ = shutdown.changed() => return false,
        _ = tokio::time::sleep(SETTLE_WINDOW) => {}
    }

    loop {
        match events.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Closed) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{DeviceAction, Subsystem};
    use std::path::PathBuf;

    fn event(subsystem: Subsystem) -> DeviceEvent {
        DeviceEvent {
            subsystem,
            action: DeviceAction::Add,
            path: PathBuf::from("/dev/x"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_matching_events_collapses_to_one() {
        let (tx, mut rx) = broadcast::channel(16);
        let activation = Activation::new();
        let mut shutdown = activation.shutdown_signal();

        tx.send(event(Subsystem::Input)).unwrap();
        tx.send(event(Subsystem::Drm)).unwrap();
        tx.send(event(Subsystem::Drm)).unwrap();

        assert!(next_device_event(&mut rx, &mut shutdown, |e| e.subsystem == Subsystem::Drm).await);
        assert!(
            matches!(rx.try_recv(), Err(TryRecvError::Empty)),
            "burst should be drained"
        );
    }

    #[tokio::test]
    async fn shutdown_ends_the_wait() {
        let (_tx, mut rx) = broadcast::channel::<DeviceEvent>(16);
        let activation = Activation::new();
        let mut shutdown = activation.shutdown_signal();
        activation.shutdown().await;

        assert!(!next_device_event(&mut rx, &mut shutdown, |_| true).await);
    }
}
