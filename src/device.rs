//! Device: hands out independent writer sessions

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;

use crate::{
    buffers::Snapshot,
    config::DeviceConfig,
    error::Result,
    session::{shared::DrainBuffer, WriterSession},
    sink::{DrainSink, LogSink},
};

/// Source of writer sessions.
///
/// Every `open` allocates a fresh buffer, drain timer and session lock; no
/// state is shared between sessions except the drain sink.
pub struct Device {
    config: DeviceConfig,
    sink: Arc<dyn DrainSink>,
    next_id: AtomicU64,
    open_sessions: Arc<AtomicUsize>,
}

impl Device {
    /// Create a device that logs drained bytes
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let sink = Arc::new(LogSink::new(config.name.clone()));
        Self::with_sink(config, sink)
    }

    /// Create a device with a custom drain sink
    pub fn with_sink(config: DeviceConfig, sink: Arc<dyn DrainSink>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sink,
            next_id: AtomicU64::new(1),
            open_sessions: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Open a new session with an empty buffer and a disarmed timer
    pub fn open(&self) -> Result<WriterSession> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = DrainBuffer::new(id, &self.config, Arc::clone(&self.sink))?;
        debug!("{}: opened session {}", self.config.name, id);
        Ok(WriterSession::new(inner, Arc::clone(&self.open_sessions)))
    }

    /// Close a session; same as `WriterSession::close`
    pub fn close(&self, session: WriterSession) -> Snapshot {
        session.close()
    }

    /// Sessions currently open
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Sessions opened since the device was created
    pub fn sessions_opened(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed) - 1
    }

    /// Device configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("config", &self.config)
            .field("open_sessions", &self.open_sessions())
            .finish()
    }
}
