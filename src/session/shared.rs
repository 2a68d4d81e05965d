//! Per-open core shared by a writer session, its drain callback, its side
//! channel and its views

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use log::{debug, info};

use crate::{
    buffers::{AtomicSessionStats, BufferState, Snapshot},
    config::{CancelReporting, DeviceConfig},
    error::Result,
    sink::DrainSink,
    sync::{lock, WaiterSet, WaiterStats},
    timer::{ArmOutcome, DrainTimer},
};

/// State guarded by the buffer lock
#[derive(Debug)]
pub(crate) struct BufferCore {
    pub(crate) buffer: BufferState,
    /// Interrupt raised while no writer was suspended; consumed by the next
    /// suspension
    interrupt_pending: bool,
    /// Bumped by an interrupt that hits suspended writers
    interrupt_generation: u64,
}

/// How a suspension ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Suspension {
    /// Woken by a drain or spuriously; the caller must re-check for room
    Woken,
    /// An interrupt was raised for this session
    Interrupted,
}

/// One buffer, its lock, its waiter set and its drain timer.
///
/// Lock order: session write lock, then control lock, then buffer lock, then
/// the timer's internal lock. The drain callback only takes the buffer lock.
pub(crate) struct DrainBuffer {
    id: u64,
    name: String,
    drain_delay: Duration,
    cancel_reporting: CancelReporting,
    core: Mutex<BufferCore>,
    writable: WaiterSet,
    control_lock: Mutex<()>,
    timer: DrainTimer,
    sink: Arc<dyn DrainSink>,
    stats: Arc<AtomicSessionStats>,
    this: Weak<DrainBuffer>,
}

impl DrainBuffer {
    pub(crate) fn new(
        id: u64,
        config: &DeviceConfig,
        sink: Arc<dyn DrainSink>,
    ) -> Result<Arc<Self>> {
        let buffer = BufferState::new(config)?;
        let name = format!("{}#{}", config.name, id);

        Ok(Arc::new_cyclic(|this| Self {
            id,
            timer: DrainTimer::new(name.clone(), config.rearm_policy),
            name,
            drain_delay: config.drain_delay,
            cancel_reporting: config.cancel_reporting,
            core: Mutex::new(BufferCore {
                buffer,
                interrupt_pending: false,
                interrupt_generation: 0,
            }),
            writable: WaiterSet::new(),
            control_lock: Mutex::new(()),
            sink,
            stats: Arc::new(AtomicSessionStats::new()),
            this: this.clone(),
        }))
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn cancel_reporting(&self) -> CancelReporting {
        self.cancel_reporting
    }

    pub(crate) fn stats(&self) -> &AtomicSessionStats {
        &self.stats
    }

    pub(crate) fn timer(&self) -> &DrainTimer {
        &self.timer
    }

    pub(crate) fn weak(&self) -> Weak<DrainBuffer> {
        self.this.clone()
    }

    pub(crate) fn lock_core(&self) -> MutexGuard<'_, BufferCore> {
        lock(&self.core)
    }

    pub(crate) fn lock_control(&self) -> MutexGuard<'_, ()> {
        lock(&self.control_lock)
    }

    pub(crate) fn waiter_stats(&self) -> WaiterStats {
        let _core = self.lock_core();
        self.writable.stats()
    }

    /// Writers suspended right now
    pub(crate) fn waiting_writers(&self) -> usize {
        let _core = self.lock_core();
        self.writable.waiting()
    }

    /// Schedule a drain on the timer thread
    fn arm_drain(&self) -> Result<ArmOutcome> {
        let callback = drain_callback(self.this.clone(), Arc::clone(&self.stats));
        let outcome = self.timer.arm(self.drain_delay, callback)?;
        self.stats.record_timer_arm();
        Ok(outcome)
    }

    /// Hand the committed bytes to the sink, reset the cursor and wake every
    /// suspended writer, all under the buffer lock.
    pub(crate) fn drain_and_wake(&self) -> usize {
        let mut core = self.lock_core();
        self.sink.drain(core.buffer.committed());
        let discarded = core.buffer.drain();
        self.writable.wake_all();
        self.stats.record_drain();
        debug!(
            "{}: drained {} byte(s), woke {} writer(s)",
            self.name,
            discarded,
            self.writable.waiting()
        );
        discarded
    }

    /// Arm the drain (if needed) and block until woken.
    ///
    /// Takes the buffer lock guard from a caller that found the buffer full;
    /// the caller must already have released its session lock. `retry` marks
    /// a re-suspension after a wake that found the buffer still full: the
    /// timer is then armed only if nothing is pending.
    pub(crate) fn suspend(&self, mut core: MutexGuard<'_, BufferCore>, retry: bool) -> Result<Suspension> {
        if core.interrupt_pending {
            core.interrupt_pending = false;
            return Ok(Suspension::Interrupted);
        }

        if !retry || !self.timer.is_armed() {
            self.arm_drain()?;
        }

        let generation = core.interrupt_generation;
        self.stats.record_suspension();
        debug!("{}: buffer full at idx = {}, suspending", self.name, core.buffer.idx());

        let core = self.writable.wait(core);

        if core.interrupt_generation != generation {
            if self.writable.waiting() == 0 && self.timer.cancel() {
                debug!("{}: last writer interrupted, drain disarmed", self.name);
            }
            return Ok(Suspension::Interrupted);
        }

        Ok(Suspension::Woken)
    }

    /// Interrupt every writer suspended on this buffer, or the next one to
    /// suspend if none is suspended now
    pub(crate) fn raise_interrupt(&self) {
        let mut core = self.lock_core();
        if self.writable.waiting() > 0 {
            core.interrupt_generation += 1;
            self.writable.wake_all();
        } else {
            core.interrupt_pending = true;
        }
    }

    /// Withdraw an interrupt that no writer has consumed yet
    pub(crate) fn clear_interrupt(&self) -> bool {
        std::mem::replace(&mut self.lock_core().interrupt_pending, false)
    }

    /// Close-time cleanup: disarm the drain and report what is left
    pub(crate) fn release(&self) -> Snapshot {
        self.timer.cancel();
        let snapshot = self.lock_core().buffer.snapshot();
        info!("{}: data in buffer: {}", self.name, snapshot.to_text());
        self.timer.shutdown();
        snapshot
    }
}

/// Build the callback a drain timer runs: upgrade, drain, wake. A firing
/// after the buffer is gone only counts itself.
fn drain_callback(
    target: Weak<DrainBuffer>,
    stats: Arc<AtomicSessionStats>,
) -> impl FnOnce() + Send + 'static {
    move || match target.upgrade() {
        Some(buffer) => {
            buffer.drain_and_wake();
        }
        None => {
            stats.record_stale_firing();
            debug!("drain fired after its session closed");
        }
    }
}
