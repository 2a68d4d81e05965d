//! Non-blocking side channel onto a session's buffer
//!
//! The side channel serializes its callers on a control lock of its own and
//! never waits for room. It still takes the buffer lock for every mutation,
//! so it cannot tear the cursor under a concurrent writer or drain.
//!
//! `Reset` moves the cursor to 0 without running the drain sink and without
//! waking suspended writers. Writers blocked on a full buffer keep waiting
//! for the drain timer.

use std::sync::Weak;

use log::{info, warn};

use crate::{
    buffers::Snapshot,
    error::{CdataError, Result},
    session::shared::{BufferCore, DrainBuffer},
};

/// Command code: reset the cursor
pub const CMD_RESET: u32 = 0;
/// Command code: log and return the committed bytes
pub const CMD_INSPECT: u32 = 1;
/// Command code: non-blocking append of the payload
pub const CMD_APPEND: u32 = 2;

/// Side-channel command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// cursor := 0, no wake
    Reset,
    /// Diagnostics only
    Inspect,
    /// Append without blocking; overflow fails immediately
    Append(Vec<u8>),
}

impl ControlCommand {
    /// Decode a numeric command; `payload` is only used by `CMD_APPEND`
    pub fn from_code(code: u32, payload: &[u8]) -> Result<Self> {
        match code {
            CMD_RESET => Ok(Self::Reset),
            CMD_INSPECT => Ok(Self::Inspect),
            CMD_APPEND => Ok(Self::Append(payload.to_vec())),
            _ => Err(CdataError::UnknownCommand { code }),
        }
    }

    /// Numeric code of this command
    pub fn code(&self) -> u32 {
        match self {
            Self::Reset => CMD_RESET,
            Self::Inspect => CMD_INSPECT,
            Self::Append(_) => CMD_APPEND,
        }
    }
}

/// Outcome of a successful command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    /// Bytes the reset discarded
    Reset { discarded: usize },
    /// Committed bytes at the time of the command
    Inspect(Snapshot),
    /// Bytes appended
    Appended(usize),
}

/// Control path onto one session's buffer
#[derive(Debug, Clone)]
pub struct SideChannel {
    target: Weak<DrainBuffer>,
}

impl SideChannel {
    pub(crate) fn new(target: Weak<DrainBuffer>) -> Self {
        Self { target }
    }

    /// Run one command
    pub fn execute(&self, command: &ControlCommand) -> Result<ControlReply> {
        match command {
            ControlCommand::Reset => self
                .reset()
                .map(|discarded| ControlReply::Reset { discarded }),
            ControlCommand::Inspect => self.inspect().map(ControlReply::Inspect),
            ControlCommand::Append(bytes) => self.append(bytes).map(ControlReply::Appended),
        }
    }

    /// Decode and run a numeric command
    pub fn ioctl(&self, code: u32, payload: &[u8]) -> Result<ControlReply> {
        self.execute(&ControlCommand::from_code(code, payload)?)
    }

    /// Reset the cursor without waking writers; returns bytes discarded
    pub fn reset(&self) -> Result<usize> {
        self.with_buffer(|target, core| {
            let discarded = core.buffer.drain();
            target.stats().record_side_reset();
            Ok(discarded)
        })
    }

    /// Committed bytes, logged at info level
    pub fn inspect(&self) -> Result<Snapshot> {
        self.with_buffer(|target, core| {
            let snapshot = core.buffer.snapshot();
            info!("{}: inspect: {}", target.name(), snapshot);
            Ok(snapshot)
        })
    }

    /// Append without blocking.
    ///
    /// Bytes that fit are committed even when the rest overflow; the error
    /// reports how many went in.
    pub fn append(&self, bytes: &[u8]) -> Result<usize> {
        self.with_buffer(|target, core| {
            let admitted = core.buffer.append_from(bytes);
            target.stats().record_side_admitted(admitted);

            if admitted < bytes.len() {
                let rejected = bytes.len() - admitted;
                target.stats().record_side_overflow();
                warn!("{}: side-channel overflow, {} byte(s) rejected", target.name(), rejected);
                return Err(CdataError::overflow(admitted, rejected));
            }
            Ok(admitted)
        })
    }

    fn with_buffer<R>(&self, f: impl FnOnce(&DrainBuffer, &mut BufferCore) -> Result<R>) -> Result<R> {
        let target = self.target.upgrade().ok_or(CdataError::SessionClosed)?;
        let _control = target.lock_control();
        let mut core = target.lock_core();
        f(&*target, &mut *core)
    }
}
