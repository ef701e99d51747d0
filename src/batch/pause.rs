//! Cooperative pause / cancel between pairs

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    paused: bool,
    cancelled: bool,
}

/// Shared handle a driver uses to pause, resume or cancel a running batch
///
/// The worker calls `wait_if_paused` before each pair; while paused it blocks on a
/// condition variable instead of polling.
#[derive(Debug, Clone, Default)]
pub struct PauseToken {
    inner: Arc<(Mutex<State>, Condvar)>,
}

impl PauseToken {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // State is two flags; a panicked holder cannot leave it inconsistent
        self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pause(&self) {
        self.state().paused = true;
        log::info!("Batch paused");
    }

    pub fn resume(&self) {
        self.state().paused = false;
        self.inner.1.notify_all();
        log::info!("Batch resumed");
    }

    /// Stop before the next pair; also releases a paused worker
    pub fn cancel(&self) {
        self.state().cancelled = true;
        self.inner.1.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.state().cancelled
    }

    /// Block while paused; returns `false` if the batch was cancelled
    pub fn wait_if_paused(&self) -> bool {
        let mut state = self.state();
        while state.paused && !state.cancelled {
            state = self
                .inner
                .1
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        !state.cancelled
    }
}
