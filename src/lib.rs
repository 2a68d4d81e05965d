//! # cdata - Bounded Drain Buffer
//!
//! A fixed-capacity byte buffer fed by a blocking writer and drained by a
//! deferred callback. When a write finds the buffer full, the writer arms a
//! drain timer and suspends; the timer fires on its own thread, hands the
//! committed bytes to a sink, resets the cursor and wakes every suspended
//! writer, which then re-check for room and resume where they stopped.
//!
//! ## Features
//!
//! - **Blocking writes**: partial progress is never re-copied after a wake
//! - **Wake-all drains**: every suspended writer re-validates independently
//! - **Interruptible**: a suspended write can be cancelled, keeping what it
//!   already admitted
//! - **Side channel**: non-blocking append/reset/inspect commands
//! - **Direct views**: lock-coordinated access to the backing storage
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 Device                          │
//! │   open() ──▶ WriterSession (one per handle)     │
//! ├─────────────────────────────────────────────────┤
//! │  DrainBuffer (per session)                      │
//! │  - buffer lock ─ BufferState { storage, idx }   │
//! │  - WaiterSet (wake-all)                         │
//! │  - DrainTimer (weak ref back to the buffer)     │
//! └─────────────────────────────────────────────────┘
//!      ▲              ▲                 ▲
//!  write()      SideChannel        DirectView
//! ```

// Core modules
pub mod buffers;
pub mod config;
pub mod error;
pub mod sync;
pub mod timer;

// Sessions and their access paths
pub mod control;
pub mod device;
pub mod session;
pub mod sink;
pub mod view;

// Main API re-exports
pub use buffers::{Admission, BufferPhase, BufferState, SessionStats, Snapshot};
pub use config::{BackingType, CancelReporting, DeviceConfig, DeviceConfigBuilder, RearmPolicy};
pub use control::{ControlCommand, ControlReply, SideChannel};
pub use device::Device;
pub use error::{CdataError, Result};
pub use session::{Interrupt, WriterSession};
pub use sink::{DrainSink, FrameBufferSink, LogSink};
pub use sync::WaiterStats;
pub use timer::{ArmOutcome, DrainTimer, TimerStats};
pub use view::{DirectView, ViewAccess};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration constants
pub mod defaults {
    use std::time::Duration;

    /// Device name
    pub const DEVICE_NAME: &str = "cdata-misc";

    /// Bytes of storage per session
    pub const BUF_SIZE: usize = 8;

    /// Delay between full-detection and drain
    pub const DRAIN_DELAY: Duration = Duration::from_millis(10);
}
