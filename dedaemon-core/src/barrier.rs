//! Join-on-N completion barrier.
//!
//! [`join_with`] fires a callback once exactly `n` participants have called
//! [`JoinSignal::signal`]; [`join`] exposes the same thing as an awaitable
//! [`JoinWait`]. Participants may signal from any task, in any order.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

type Callback = Box<dyn FnOnce() + Send>;

struct Inner {
    remaining: AtomicUsize,
    on_complete: Mutex<Option<Callback>>,
}

/// Completion handle handed to each participant.
#[derive(Clone)]
pub struct JoinSignal {
    inner: Arc<Inner>,
}

impl JoinSignal {
    /// Report one participant as done. The call that brings the count to
    /// zero runs the completion callback; calls past zero are ignored.
    pub fn signal(&self) {
        let previous = self
            .inner
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                left.checked_sub(1)
            });
        match previous {
            Ok(1) => self.complete(),
            Ok(_) => {}
            Err(_) => tracing::debug!("join signalled after completion; ignoring"),
        }
    }

    /// Participants that have not signalled yet.
    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::Acquire)
    }

    fn complete(&self) {
        let callback = self
            .inner
            .on_complete
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl fmt::Debug for JoinSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinSignal")
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Resolves once every participant of the matching [`JoinSignal`] is done.
#[derive(Debug)]
pub struct JoinWait {
    rx: oneshot::Receiver<()>,
}

impl JoinWait {
    pub async fn wait(self) {
        // The sender lives inside the callback, which is only dropped
        // unfired if every signal handle is dropped first.
        let _ = self.rx.await;
    }
}

/// Barrier over `n` participants running `on_complete` exactly once.
/// With `n == 0` the callback runs immediately.
pub fn join_with(n: usize, on_complete: impl FnOnce() + Send + 'static) -> JoinSignal {
    let signal = JoinSignal {
        inner: Arc::new(Inner {
            remaining: AtomicUsize::new(n),
            on_complete: Mutex::new(Some(Box::new(on_complete))),
        }),
    };
    if n == 0 {
        signal.complete();
    }
    signal
}

/// Barrier over `n` participants with an awaitable completion.
pub fn join(n: usize) -> (JoinSignal, JoinWait) {
    let (tx, rx) = oneshot::channel();
    let signal = join_with(n, move || {
        let _ = tx.send(());
    });
    (signal, JoinWait { rx })
}
