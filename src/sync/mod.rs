//! Synchronization primitives shared by sessions, timers and views
//!
//! Key features:
//! - Wake-all waiter set for writers blocked on a full buffer
//! - Poison-tolerant locking

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod waiters;

pub use waiters::{WaiterSet, WaiterStats};

/// Lock a mutex, recovering the guard if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
