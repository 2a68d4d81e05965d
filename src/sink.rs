//! Destinations for drained bytes
//!
//! The drain callback hands the committed bytes to a `DrainSink` while it
//! still holds the buffer lock, then resets the cursor.

use std::sync::Mutex;

use log::info;
use memmap2::MmapMut;

use crate::{
    error::{CdataError, Result},
    sync::lock,
};

/// Receives the committed bytes of each drain
pub trait DrainSink: Send + Sync {
    /// Called once per drain, before the cursor is reset
    fn drain(&self, bytes: &[u8]);
}

/// Logs drained bytes as text
#[derive(Debug, Clone)]
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl DrainSink for LogSink {
    fn drain(&self, bytes: &[u8]) {
        info!("{}: buf = {}", self.name, String::from_utf8_lossy(bytes));
    }
}

#[derive(Debug)]
struct Frame {
    map: MmapMut,
    offset: usize,
}

/// Copies drained bytes into a fixed-size frame at a rolling offset.
///
/// The offset wraps to 0 once it reaches the end of the frame, so the frame
/// always holds the most recent bytes written at each position.
#[derive(Debug)]
pub struct FrameBufferSink {
    frame: Mutex<Frame>,
}

impl FrameBufferSink {
    /// Map an anonymous frame of `size` bytes
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(CdataError::invalid_parameter(
                "size",
                "Frame size must be greater than 0",
            ));
        }

        let map = MmapMut::map_anon(size)
            .map_err(|e| CdataError::from_io(e, "Failed to map frame buffer"))?;

        Ok(Self {
            frame: Mutex::new(Frame { map, offset: 0 }),
        })
    }

    /// Next write position in the frame
    pub fn offset(&self) -> usize {
        lock(&self.frame).offset
    }

    /// Frame size in bytes
    pub fn size(&self) -> usize {
        lock(&self.frame).map.len()
    }

    /// Copy of the whole frame
    pub fn contents(&self) -> Vec<u8> {
        lock(&self.frame).map.to_vec()
    }
}

impl DrainSink for FrameBufferSink {
    fn drain(&self, bytes: &[u8]) {
        let mut frame = lock(&self.frame);
        let size = frame.map.len();
        for &byte in bytes {
            if frame.offset >= size {
                frame.offset = 0;
            }
            let offset = frame.offset;
            frame.map[offset] = byte;
            frame.offset += 1;
        }
    }
}
