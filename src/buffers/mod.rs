//! Buffer storage, admission state and session counters
//!
//! `BufferState` is the single owner of a session's bytes. Everything else
//! (writer sessions, the drain callback, the side channel, direct views)
//! reaches it through the session's buffer lock.

pub mod backing;
pub mod state;
pub mod stats;

// Re-export main types
pub use backing::BackingStore;
pub use state::{Admission, BufferPhase, BufferState, Snapshot};
pub use stats::{AtomicSessionStats, SessionStats};
