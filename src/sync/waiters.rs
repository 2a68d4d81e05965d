//! Wake-all waiter set for writers blocked on a full buffer
//!
//! A thin layer over `Condvar` that only exposes "notify all". Every woken
//! waiter must re-check the condition it was waiting for; there is no way to
//! wake a single waiter, so one drain can never strand the others.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, MutexGuard, PoisonError};

/// Set of execution contexts suspended on one buffer
#[derive(Debug, Default)]
pub struct WaiterSet {
    cond: Condvar,
    /// Waiters currently suspended; only changed while the caller holds the
    /// mutex paired with `cond`
    waiting: AtomicUsize,
    wake_count: AtomicU64,
    wait_count: AtomicU64,
}

impl WaiterSet {
    /// Create an empty waiter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend on `guard` until the next wake (or a spurious wakeup).
    ///
    /// The mutex is released while suspended and re-acquired before
    /// returning. The caller must re-check its condition.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.waiting.fetch_add(1, Ordering::Relaxed);
        self.wait_count.fetch_add(1, Ordering::Relaxed);
        let guard = self
            .cond
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner);
        self.waiting.fetch_sub(1, Ordering::Relaxed);
        guard
    }

    /// Wake every suspended waiter
    pub fn wake_all(&self) {
        self.wake_count.fetch_add(1, Ordering::Relaxed);
        self.cond.notify_all();
    }

    /// Number of waiters currently suspended.
    ///
    /// Exact only when read under the mutex the waiters suspend on.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }

    /// Get wait/wake statistics
    pub fn stats(&self) -> WaiterStats {
        WaiterStats {
            waiting: self.waiting(),
            wake_count: self.wake_count.load(Ordering::Relaxed),
            wait_count: self.wait_count.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for a waiter set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaiterStats {
    /// Waiters suspended right now
    pub waiting: usize,
    /// Number of wake-all calls
    pub wake_count: u64,
    /// Number of suspensions
    pub wait_count: u64,
}
