//! Fixed-capacity byte store and its admission state machine

use std::fmt;

use crate::{
    config::{BackingType, DeviceConfig},
    error::Result,
};

use super::backing::BackingStore;

/// Result of offering one byte to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The byte was stored and the cursor advanced
    Admitted,
    /// The buffer is full; nothing changed
    Rejected,
}

/// Writer-admission state of the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPhase {
    /// `idx < limit`
    Accepting,
    /// `idx >= limit`; only a drain leaves this phase
    Full,
}

/// Backing storage plus the write cursor `idx`.
///
/// `0 <= idx <= limit <= capacity` holds in every reachable state. `limit` is
/// `capacity - 1` when the terminator slot is reserved, `capacity` otherwise.
#[derive(Debug)]
pub struct BufferState {
    storage: BackingStore,
    idx: usize,
    limit: usize,
}

impl BufferState {
    /// Create an empty buffer for the given configuration
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        config.validate()?;
        let storage = BackingStore::new(config.backing, config.capacity)?;

        Ok(Self {
            storage,
            idx: 0,
            limit: config.limit(),
        })
    }

    /// Offer one byte
    pub fn append(&mut self, byte: u8) -> Admission {
        if self.idx >= self.limit {
            return Admission::Rejected;
        }
        self.storage[self.idx] = byte;
        self.idx += 1;
        Admission::Admitted
    }

    /// Offer bytes in order until one is rejected; returns how many were admitted
    pub fn append_from(&mut self, bytes: &[u8]) -> usize {
        let mut admitted = 0;
        for &byte in bytes {
            if self.append(byte) == Admission::Rejected {
                break;
            }
            admitted += 1;
        }
        admitted
    }

    /// Reset the cursor to 0. Idempotent; returns the number of bytes discarded.
    pub fn drain(&mut self) -> usize {
        std::mem::replace(&mut self.idx, 0)
    }

    /// Copy of the committed bytes
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            bytes: self.committed().to_vec(),
            capacity: self.capacity(),
        }
    }

    /// Committed bytes, `storage[..idx]`
    pub fn committed(&self) -> &[u8] {
        &self.storage[..self.idx]
    }

    /// Full backing storage, including bytes past the cursor
    pub fn storage(&self) -> &[u8] {
        &self.storage
    }

    /// Mutable backing storage. Does not move the cursor.
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Current phase
    pub fn phase(&self) -> BufferPhase {
        if self.idx >= self.limit {
            BufferPhase::Full
        } else {
            BufferPhase::Accepting
        }
    }

    /// Whether writers must wait for a drain
    pub fn is_full(&self) -> bool {
        self.phase() == BufferPhase::Full
    }

    /// Cursor position
    pub fn idx(&self) -> usize {
        self.idx
    }

    /// Admission limit
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes of backing storage
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Kind of memory backing the storage
    pub fn backing(&self) -> BackingType {
        self.storage.backing_type()
    }
}

/// Copy of a buffer's committed bytes at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    bytes: Vec<u8>,
    capacity: usize,
}

impl Snapshot {
    /// Cursor position at the time of the snapshot
    pub fn idx(&self) -> usize {
        self.bytes.len()
    }

    /// Capacity of the buffer the snapshot was taken from
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Committed bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether nothing was committed
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Committed bytes as text, lossily decoded
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {:?}", self.idx(), self.capacity, self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackingType;

    fn state() -> BufferState {
        BufferState::new(&DeviceConfig::default()).unwrap()
    }

    #[test]
    fn test_append_until_full() {
        let mut buf = state();
        assert_eq!(buf.limit(), 7);

        for (i, &b) in b"abcdefg".iter().enumerate() {
            assert_eq!(buf.phase(), BufferPhase::Accepting);
            assert_eq!(buf.append(b), Admission::Admitted);
            assert_eq!(buf.idx(), i + 1);
        }

        assert!(buf.is_full());
        assert_eq!(buf.append(b'h'), Admission::Rejected);
        assert_eq!(buf.idx(), 7);
        assert_eq!(buf.committed(), b"abcdefg");
    }

    #[test]
    fn test_drain_is_idempotent() {
        let mut buf = state();
        buf.append_from(b"hello");

        assert_eq!(buf.drain(), 5);
        assert_eq!(buf.idx(), 0);
        assert_eq!(buf.drain(), 0);
        assert_eq!(buf.idx(), 0);
        assert_eq!(buf.phase(), BufferPhase::Accepting);
    }

    #[test]
    fn test_append_from_stops_at_limit() {
        let mut buf = state();
        assert_eq!(buf.append_from(b"0123456789"), 7);
        assert!(buf.is_full());
        assert_eq!(buf.append_from(b"x"), 0);
    }

    #[test]
    fn test_no_terminator_uses_every_slot() {
        let config = DeviceConfig::default().with_reserve_terminator(false);
        let mut buf = BufferState::new(&config).unwrap();
        assert_eq!(buf.append_from(b"0123456789"), 8);
        assert_eq!(buf.idx(), buf.capacity());
    }

    #[test]
    fn test_snapshot_copies_committed_bytes() {
        let mut buf = state();
        buf.append_from(b"he");
        buf.append_from(b"llo");

        let snap = buf.snapshot();
        assert_eq!(snap.idx(), 5);
        assert_eq!(snap.as_bytes(), b"hello");
        assert_eq!(snap.to_text(), "hello");
        assert_eq!(snap.to_string(), "[5/8] \"hello\"");

        buf.drain();
        assert_eq!(snap.as_bytes(), b"hello");
    }

    #[test]
    fn test_storage_survives_drain() {
        let mut buf = state();
        buf.append_from(b"abc");
        buf.drain();
        assert!(buf.committed().is_empty());
        assert_eq!(&buf.storage()[..3], b"abc");
    }

    #[test]
    fn test_anonymous_backing() {
        let config = DeviceConfig::default().with_backing(BackingType::Anonymous);
        let mut buf = BufferState::new(&config).unwrap();
        buf.append_from(b"mapped");
        assert_eq!(buf.snapshot().as_bytes(), b"mapped");
    }
}
