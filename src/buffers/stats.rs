//! Session statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing what a session has done so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Bytes admitted by the blocking write path
    pub bytes_admitted: u64,
    /// Writes that admitted every byte they were given
    pub writes_completed: u64,
    /// Times a writer suspended on a full buffer
    pub suspensions: u64,
    /// Drains run by the deferred callback
    pub drains: u64,
    /// Wakes that found the buffer still full
    pub timer_races: u64,
    /// Writes aborted by an interrupt
    pub cancelled_writes: u64,
    /// Drain timer arms
    pub timer_arms: u64,
    /// Firings that found the session already gone
    pub stale_firings: u64,
    /// Side-channel resets
    pub side_resets: u64,
    /// Bytes admitted through the side channel
    pub side_bytes_admitted: u64,
    /// Side-channel appends that overflowed
    pub side_overflows: u64,
    /// Direct views handed out
    pub views_opened: u64,
}

impl SessionStats {
    /// Create new statistics instance
    pub fn new() -> Self {
        Default::default()
    }

    /// Fraction of suspensions whose wake found the buffer still full
    pub fn race_rate(&self) -> f64 {
        if self.suspensions == 0 {
            return 0.0;
        }
        self.timer_races as f64 / self.suspensions as f64
    }

    /// Get a summary string of the statistics
    pub fn summary(&self) -> String {
        format!(
            "SessionStats {{ admitted: {}, writes: {}, suspensions: {}, drains: {}, \
             races: {}, cancelled: {}, side_resets: {}, overflows: {}, race_rate: {:.2}% }}",
            self.bytes_admitted,
            self.writes_completed,
            self.suspensions,
            self.drains,
            self.timer_races,
            self.cancelled_writes,
            self.side_resets,
            self.side_overflows,
            self.race_rate() * 100.0
        )
    }
}

/// Thread-safe counters, shared between a session and its drain callback
#[derive(Debug, Default)]
pub struct AtomicSessionStats {
    bytes_admitted: AtomicU64,
    writes_completed: AtomicU64,
    suspensions: AtomicU64,
    drains: AtomicU64,
    timer_races: AtomicU64,
    cancelled_writes: AtomicU64,
    timer_arms: AtomicU64,
    stale_firings: AtomicU64,
    side_resets: AtomicU64,
    side_bytes_admitted: AtomicU64,
    side_overflows: AtomicU64,
    views_opened: AtomicU64,
}

impl AtomicSessionStats {
    /// Create new atomic statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admitted(&self, bytes: usize) {
        self.bytes_admitted.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_write_completed(&self) {
        self.writes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suspension(&self) {
        self.suspensions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drain(&self) {
        self.drains.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timer_race(&self) {
        self.timer_races.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timer_arm(&self) {
        self.timer_arms.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_firing(&self) {
        self.stale_firings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_side_reset(&self) {
        self.side_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_side_admitted(&self, bytes: usize) {
        self.side_bytes_admitted
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_side_overflow(&self) {
        self.side_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_view_opened(&self) {
        self.views_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            bytes_admitted: self.bytes_admitted.load(Ordering::Relaxed),
            writes_completed: self.writes_completed.load(Ordering::Relaxed),
            suspensions: self.suspensions.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
            timer_races: self.timer_races.load(Ordering::Relaxed),
            cancelled_writes: self.cancelled_writes.load(Ordering::Relaxed),
            timer_arms: self.timer_arms.load(Ordering::Relaxed),
            stale_firings: self.stale_firings.load(Ordering::Relaxed),
            side_resets: self.side_resets.load(Ordering::Relaxed),
            side_bytes_admitted: self.side_bytes_admitted.load(Ordering::Relaxed),
            side_overflows: self.side_overflows.load(Ordering::Relaxed),
            views_opened: self.views_opened.load(Ordering::Relaxed),
        }
    }
}
