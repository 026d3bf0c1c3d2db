//! Single-slot wake primitive.
//!
//! [`BinarySignal`] is an auto-reset event: any number of `give` calls
//! before a `take` collapse into one wake.  It is used for the dispatcher's
//! "mode pending" flag, the sampler's period tick, and a worker's stop
//! acknowledgment.  Mutual exclusion is never done with it; that is what
//! the surrounding `Mutex`es are for.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct BinarySignal {
    set: Mutex<bool>,
    cond: Condvar,
}

impl BinarySignal {
    pub const fn new() -> Self {
        Self {
            set: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Raise the signal and wake one waiter.  Giving an already-raised
    /// signal is a no-op.
    pub fn give(&self) {
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        *set = true;
        self.cond.notify_one();
    }

    /// Wait up to `timeout` for the signal and consume it.
    ///
    /// Returns `false` if the timeout expired with the signal still clear.
    pub fn take(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        while !*set {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(set, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            set = guard;
        }
        *set = false;
        true
    }

    /// Consume the signal if raised, without waiting.
    pub fn try_take(&self) -> bool {
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        core::mem::replace(&mut *set, false)
    }

    /// Observe the signal without consuming it.
    pub fn is_set(&self) -> bool {
        *self.set.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
