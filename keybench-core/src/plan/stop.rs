use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// A cloneable handle to the one-shot stop signal of a [`Plan`](super::Plan).
///
/// Workers poll the signal between operations, so stopping takes effect once every in-flight
/// operation has returned.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<Latch>);

#[derive(Debug, Default)]
struct Latch {
    stopped: AtomicBool,
    lock: Mutex<()>,
    changed: Condvar,
}

impl StopHandle {
    /// Signals the plan to stop. Only the first call has an effect.
    pub fn stop(&self) {
        if self.0.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let _guard = self.0.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.0.changed.notify_all();
        tracing::debug!("plan stopped");
    }

    /// Returns `true` once [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.0.stopped.load(Ordering::SeqCst)
    }

    /// Waits for the stop signal for at most `timeout`, returning whether the plan is stopped.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.0.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self
            .0
            .changed
            .wait_timeout_while(guard, timeout, |_| !self.is_stopped())
            .unwrap_or_else(PoisonError::into_inner);

        self.is_stopped()
    }
}
