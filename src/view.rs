//! Lock-coordinated direct view of a session's backing storage
//!
//! A view never aliases the storage outside the buffer lock: every access
//! runs inside a closure while the lock is held. Writes require a
//! `ReadWrite` view and never move the cursor.

use std::sync::Weak;

use crate::{
    buffers::Snapshot,
    error::{CdataError, Result},
    session::shared::DrainBuffer,
};

/// Access granted to a view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAccess {
    ReadOnly,
    ReadWrite,
}

/// View onto the full backing storage of one session
#[derive(Debug, Clone)]
pub struct DirectView {
    target: Weak<DrainBuffer>,
    access: ViewAccess,
}

impl DirectView {
    pub(crate) fn new(target: Weak<DrainBuffer>, access: ViewAccess) -> Self {
        Self { target, access }
    }

    /// Whether `write` is permitted
    pub fn is_writable(&self) -> bool {
        self.access == ViewAccess::ReadWrite
    }

    /// Run `f` over the whole storage, including bytes past the cursor
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let target = self.target.upgrade().ok_or(CdataError::SessionClosed)?;
        let core = target.lock_core();
        Ok(f(core.buffer.storage()))
    }

    /// Run `f` over the whole storage with write access
    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        if !self.is_writable() {
            return Err(CdataError::permission_denied("write through read-only view"));
        }
        let target = self.target.upgrade().ok_or(CdataError::SessionClosed)?;
        let mut core = target.lock_core();
        Ok(f(core.buffer.storage_mut()))
    }

    /// Copy of the committed bytes
    pub fn snapshot(&self) -> Result<Snapshot> {
        let target = self.target.upgrade().ok_or(CdataError::SessionClosed)?;
        let snapshot = target.lock_core().buffer.snapshot();
        Ok(snapshot)
    }
}
