//! Busy/idle signal shared by the engine thread and the control handle.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Raised while the engine handles a command or runs a move.
#[derive(Debug, Default)]
pub struct BusySignal {
    busy: Mutex<bool>,
    changed: Condvar,
}

impl BusySignal {
    /// Create a signal in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.busy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, busy: bool) {
        *self.lock() = busy;
        self.changed.notify_all();
    }

    /// Raise the signal until the returned guard is dropped.
    pub fn hold(&self) -> BusyGuard<'_> {
        self.set(true);
        BusyGuard { signal: self }
    }

    /// Whether the engine is busy right now.
    pub fn is_busy(&self) -> bool {
        *self.lock()
    }

    /// Block until the engine is idle.
    pub fn wait_idle(&self) {
        let mut busy = self.lock();
        while *busy {
            busy = self
                .changed
                .wait(busy)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the engine is idle or `timeout` elapses.
    ///
    /// Returns `true` if the engine went idle.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut busy = self.lock();
        while *busy {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            busy = self
                .changed
                .wait_timeout(busy, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// Lowers the [`BusySignal`] when dropped.
#[derive(Debug)]
pub struct BusyGuard<'a> {
    signal: &'a BusySignal,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.signal.set(false);
    }
}
