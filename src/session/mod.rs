//! Writer sessions and the per-open buffer core they share with the drain
//! callback
//!
//! ```text
//!   WriterSession::write ──append──▶ ┌──────────────────────┐ ◀──drain+wake── DrainTimer
//!        │  full: arm, suspend       │ DrainBuffer          │                 (own thread)
//!        ▼                           │  buffer lock         │
//!   WaiterSet (wake-all)  ◀──────────│  BufferState         │ ◀──append/reset── SideChannel
//!                                    └──────────────────────┘ ◀──read/write──── DirectView
//! ```

pub(crate) mod shared;
pub mod writer;

pub use writer::{Interrupt, WriterSession};
