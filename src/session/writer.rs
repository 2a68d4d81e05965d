//! Blocking writer session

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::{debug, warn};

use crate::{
    buffers::{BufferPhase, SessionStats, Snapshot},
    config::{BackingType, CancelReporting, RearmPolicy},
    control::SideChannel,
    error::{CdataError, Result},
    sync::{lock, WaiterStats},
    timer::TimerStats,
    view::{DirectView, ViewAccess},
};

use super::shared::{DrainBuffer, Suspension};

/// Per-open context: one buffer, one drain timer, one session lock.
///
/// `write` blocks while the buffer is full and resumes after the drain timer
/// fires. Several threads may share a session; their writes are serialized by
/// the session lock except while a writer is suspended.
pub struct WriterSession {
    inner: Arc<DrainBuffer>,
    write_lock: Mutex<()>,
    open_sessions: Arc<AtomicUsize>,
    released: bool,
}

impl WriterSession {
    pub(crate) fn new(inner: Arc<DrainBuffer>, open_sessions: Arc<AtomicUsize>) -> Self {
        open_sessions.fetch_add(1, Ordering::SeqCst);
        Self {
            inner,
            write_lock: Mutex::new(()),
            open_sessions,
            released: false,
        }
    }

    /// Write `bytes`, suspending whenever the buffer is full.
    ///
    /// Returns the number of bytes admitted, which is `bytes.len()` unless the
    /// write is interrupted. Bytes admitted before an interrupt stay in the
    /// buffer; the rest are discarded. An interrupted write returns
    /// `Err(Cancelled { admitted })` or `Ok(admitted)` depending on the
    /// configured `CancelReporting`.
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        let inner = &self.inner;
        let stats = inner.stats();
        let mut session = lock(&self.write_lock);
        let mut admitted = 0;
        let mut woken = false;

        loop {
            let mut core = inner.lock_core();
            let progress = core.buffer.append_from(&bytes[admitted..]);
            admitted += progress;
            stats.record_admitted(progress);

            if admitted == bytes.len() {
                break;
            }

            let still_full = woken && progress == 0;
            if still_full {
                stats.record_timer_race();
                warn!(
                    "{}: race condition: woken with idx = {}",
                    inner.name(),
                    core.buffer.idx()
                );
            }

            drop(session);
            let outcome = inner.suspend(core, still_full);
            session = lock(&self.write_lock);

            match outcome? {
                Suspension::Woken => woken = true,
                Suspension::Interrupted => {
                    stats.record_cancelled();
                    debug!(
                        "{}: write interrupted after {} of {} byte(s)",
                        inner.name(),
                        admitted,
                        bytes.len()
                    );
                    return match inner.cancel_reporting() {
                        CancelReporting::Error => Err(CdataError::cancelled(admitted)),
                        CancelReporting::ShortWrite => Ok(admitted),
                    };
                }
            }
        }

        drop(session);
        stats.record_write_completed();
        Ok(admitted)
    }

    /// Copy of the committed bytes
    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock_core().buffer.snapshot()
    }

    /// Cursor position
    pub fn idx(&self) -> usize {
        self.inner.lock_core().buffer.idx()
    }

    /// Current admission phase
    pub fn phase(&self) -> BufferPhase {
        self.inner.lock_core().buffer.phase()
    }

    /// Whether writers must wait for a drain
    pub fn is_full(&self) -> bool {
        self.phase() == BufferPhase::Full
    }

    /// Bytes of backing storage
    pub fn capacity(&self) -> usize {
        self.inner.lock_core().buffer.capacity()
    }

    /// Admission limit
    pub fn limit(&self) -> usize {
        self.inner.lock_core().buffer.limit()
    }

    /// Writers suspended on this session right now
    pub fn waiting_writers(&self) -> usize {
        self.inner.waiting_writers()
    }

    /// Whether a drain is scheduled
    pub fn drain_armed(&self) -> bool {
        self.inner.timer().is_armed()
    }

    /// Session id, unique per device
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Non-blocking control path onto this session's buffer
    pub fn side_channel(&self) -> SideChannel {
        SideChannel::new(self.inner.weak())
    }

    /// Lock-coordinated view of the backing storage
    pub fn direct_view(&self, access: ViewAccess) -> DirectView {
        self.inner.stats().record_view_opened();
        DirectView::new(self.inner.weak(), access)
    }

    /// Handle that interrupts writers suspended on this session
    pub fn interrupt_handle(&self) -> Interrupt {
        Interrupt {
            target: self.inner.weak(),
        }
    }

    /// Get session statistics
    pub fn stats(&self) -> SessionStats {
        self.inner.stats().snapshot()
    }

    /// Kind of memory backing the buffer
    pub fn backing(&self) -> BackingType {
        self.inner.lock_core().buffer.backing()
    }

    /// Rearm policy of the drain timer
    pub fn rearm_policy(&self) -> RearmPolicy {
        self.inner.timer().policy()
    }

    /// Get wait/wake statistics for writers blocked on this session
    pub fn waiter_stats(&self) -> WaiterStats {
        self.inner.waiter_stats()
    }

    /// Get drain timer statistics
    pub fn timer_stats(&self) -> TimerStats {
        self.inner.timer().stats()
    }

    /// Disarm the drain, log the committed bytes and release the buffer
    pub fn close(mut self) -> Snapshot {
        self.release()
    }

    fn release(&mut self) -> Snapshot {
        self.released = true;
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        self.inner.release()
    }
}

impl fmt::Debug for WriterSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterSession")
            .field("name", &self.inner.name())
            .field("idx", &self.idx())
            .field("timer", self.inner.timer())
            .finish()
    }
}

impl Drop for WriterSession {
    fn drop(&mut self) {
        if !self.released {
            self.release();
        }
    }
}

/// Interrupts writers suspended on one session.
///
/// Raising while a writer is suspended cancels every suspended write on the
/// session. Raising while none is suspended leaves the interrupt pending; the
/// next write that has to suspend is cancelled instead.
#[derive(Debug, Clone)]
pub struct Interrupt {
    target: Weak<DrainBuffer>,
}

impl Interrupt {
    /// Raise the interrupt
    pub fn raise(&self) -> Result<()> {
        let target = self.target.upgrade().ok_or(CdataError::SessionClosed)?;
        target.raise_interrupt();
        Ok(())
    }

    /// Withdraw a pending interrupt; returns whether one was pending
    pub fn clear(&self) -> Result<bool> {
        let target = self.target.upgrade().ok_or(CdataError::SessionClosed)?;
        Ok(target.clear_interrupt())
    }
}
