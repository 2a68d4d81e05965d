//! One-shot deferred drain timer
//!
//! Each `DrainTimer` owns a lazily spawned worker thread. Armed callbacks run
//! on that thread, never on the thread that armed them. The timer keeps no
//! reference to whatever the callback acts on; callbacks that touch a buffer
//! capture a `Weak` and treat a failed upgrade as a no-op.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, trace};

use crate::{
    config::RearmPolicy,
    error::{CdataError, Result},
    sync::lock,
};

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// What `arm` did to the pending firings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// Nothing was pending; one firing is now scheduled
    Armed,
    /// A pending firing was replaced (`RearmPolicy::Replace`)
    Replaced,
    /// Added alongside pending firings (`RearmPolicy::Accumulate`)
    Stacked,
}

/// Timer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerStats {
    /// Successful `arm` calls
    pub arms: u64,
    /// Callbacks run
    pub firings: u64,
    /// Pending firings removed by `cancel`
    pub cancelled: u64,
    /// Pending firings dropped by a replacing `arm`
    pub replaced: u64,
    /// Firings currently scheduled
    pub pending: usize,
}

struct Pending {
    deadline: Instant,
    callback: Callback,
}

#[derive(Default)]
struct TimerState {
    pending: Vec<Pending>,
    shutdown: bool,
    arms: u64,
    firings: u64,
    cancelled: u64,
    replaced: u64,
}

impl TimerState {
    fn earliest(&self) -> Option<(usize, Instant)> {
        self.pending
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.deadline))
            .min_by_key(|&(_, deadline)| deadline)
    }
}

struct TimerShared {
    state: Mutex<TimerState>,
    cond: Condvar,
}

/// A deferred-execution primitive that runs callbacks once after a delay
pub struct DrainTimer {
    name: String,
    policy: RearmPolicy,
    shared: Arc<TimerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DrainTimer {
    /// Create a disarmed timer. No thread is started until the first `arm`.
    pub fn new(name: impl Into<String>, policy: RearmPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            shared: Arc::new(TimerShared {
                state: Mutex::new(TimerState::default()),
                cond: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Schedule `callback` to run once, `delay` from now, on the timer thread
    pub fn arm<F>(&self, delay: Duration, callback: F) -> Result<ArmOutcome>
    where
        F: FnOnce() + Send + 'static,
    {
        if lock(&self.shared.state).shutdown {
            return Err(CdataError::timer(format!("{} is shut down", self.name)));
        }
        self.ensure_worker()?;

        let mut state = lock(&self.shared.state);
        if state.shutdown {
            return Err(CdataError::timer(format!("{} is shut down", self.name)));
        }

        let outcome = match (self.policy, state.pending.is_empty()) {
            (_, true) => ArmOutcome::Armed,
            (RearmPolicy::Replace, false) => {
                state.replaced += state.pending.len() as u64;
                state.pending.clear();
                ArmOutcome::Replaced
            }
            (RearmPolicy::Accumulate, false) => ArmOutcome::Stacked,
        };

        state.pending.push(Pending {
            deadline: Instant::now() + delay,
            callback: Box::new(callback),
        });
        state.arms += 1;
        self.shared.cond.notify_all();

        trace!("{}: armed for {:?} ({:?})", self.name, delay, outcome);
        Ok(outcome)
    }

    /// Drop every pending firing.
    ///
    /// Returns `false` when nothing was pending, which includes the case of a
    /// firing that has already been taken by the timer thread and is running
    /// or about to run. Callers must tolerate both outcomes.
    pub fn cancel(&self) -> bool {
        let mut state = lock(&self.shared.state);
        let dropped = state.pending.len();
        state.pending.clear();
        state.cancelled += dropped as u64;
        self.shared.cond.notify_all();
        dropped > 0
    }

    /// Whether a firing is scheduled
    pub fn is_armed(&self) -> bool {
        !lock(&self.shared.state).pending.is_empty()
    }

    /// Number of scheduled firings
    pub fn pending(&self) -> usize {
        lock(&self.shared.state).pending.len()
    }

    /// Rearm policy
    pub fn policy(&self) -> RearmPolicy {
        self.policy
    }

    /// Get timer statistics
    pub fn stats(&self) -> TimerStats {
        let state = lock(&self.shared.state);
        TimerStats {
            arms: state.arms,
            firings: state.firings,
            cancelled: state.cancelled,
            replaced: state.replaced,
            pending: state.pending.len(),
        }
    }

    /// Cancel pending firings and stop the timer thread.
    ///
    /// Waits for an in-flight callback to finish, unless called from that
    /// callback itself.
    pub fn shutdown(&self) {
        {
            let mut state = lock(&self.shared.state);
            if !state.shutdown {
                state.shutdown = true;
                state.cancelled += state.pending.len() as u64;
                state.pending.clear();
            }
            self.shared.cond.notify_all();
        }

        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("{}: timer thread panicked", self.name);
            }
        }
    }

    fn ensure_worker(&self) -> Result<()> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-drain", self.name))
            .spawn(move || run_timer(shared, name))
            .map_err(|e| CdataError::timer(format!("failed to spawn timer thread: {}", e)))?;

        *worker = Some(handle);
        Ok(())
    }
}

impl std::fmt::Debug for DrainTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrainTimer")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("pending", &self.pending())
            .finish()
    }
}

impl Drop for DrainTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn wait_state<'a>(
    shared: &'a TimerShared,
    state: MutexGuard<'a, TimerState>,
    timeout: Option<Duration>,
) -> MutexGuard<'a, TimerState> {
    match timeout {
        Some(timeout) => {
            shared
                .cond
                .wait_timeout(state, timeout)
                .unwrap_or_else(PoisonError::into_inner)
                .0
        }
        None => shared.cond.wait(state).unwrap_or_else(PoisonError::into_inner),
    }
}

fn run_timer(shared: Arc<TimerShared>, name: String) {
    debug!("{}: timer thread started", name);
    let mut state = lock(&shared.state);

    loop {
        if state.shutdown {
            break;
        }

        let now = Instant::now();
        let due = match state.earliest() {
            None => {
                state = wait_state(&shared, state, None);
                continue;
            }
            Some((_, deadline)) if deadline > now => {
                state = wait_state(&shared, state, Some(deadline - now));
                continue;
            }
            Some((index, _)) => index,
        };

        let firing = state.pending.swap_remove(due);
        state.firings += 1;
        drop(state);

        if panic::catch_unwind(AssertUnwindSafe(firing.callback)).is_err() {
            error!("{}: drain callback panicked", name);
        }

        state = lock(&shared.state);
    }

    debug!("{}: timer thread stopped", name);
}
