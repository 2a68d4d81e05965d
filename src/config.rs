//! Device configuration

use std::time::Duration;

use crate::defaults;
use crate::error::{CdataError, Result};

/// Longest drain delay accepted by `validate`
pub const MAX_DRAIN_DELAY: Duration = Duration::from_secs(3600);

/// What happens when the drain timer is armed while a firing is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RearmPolicy {
    /// The new deadline replaces the pending one; one firing per armed period
    Replace,
    /// Every arm adds its own firing; a pending firing is never dropped
    Accumulate,
}

/// How a write interrupted while suspended reports its outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReporting {
    /// `Err(CdataError::Cancelled { admitted })`
    Error,
    /// `Ok(admitted)`, a short write
    ShortWrite,
}

/// Memory backing the buffer storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingType {
    /// Boxed slice on the heap
    Heap,
    /// Anonymous shared memory map
    Anonymous,
}

/// Configuration for a cdata device and every session it opens
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Device name, used in log lines
    pub name: String,
    /// Bytes of storage per session
    pub capacity: usize,
    /// Keep the last slot free; "full" then means `idx >= capacity - 1`
    pub reserve_terminator: bool,
    /// Delay between full-detection and drain
    pub drain_delay: Duration,
    /// Rearm behavior of the drain timer
    pub rearm_policy: RearmPolicy,
    /// Outcome of an interrupted write
    pub cancel_reporting: CancelReporting,
    /// Storage backing
    pub backing: BackingType,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: defaults::DEVICE_NAME.to_string(),
            capacity: defaults::BUF_SIZE,
            reserve_terminator: true,
            drain_delay: defaults::DRAIN_DELAY,
            rearm_policy: RearmPolicy::Replace,
            cancel_reporting: CancelReporting::Error,
            backing: BackingType::Heap,
        }
    }
}

impl DeviceConfig {
    /// Create a new configuration with custom name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set storage capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Reserve (or not) the terminator slot
    pub fn with_reserve_terminator(mut self, reserve: bool) -> Self {
        self.reserve_terminator = reserve;
        self
    }

    /// Set drain delay
    pub fn with_drain_delay(mut self, delay: Duration) -> Self {
        self.drain_delay = delay;
        self
    }

    /// Set timer rearm policy
    pub fn with_rearm_policy(mut self, policy: RearmPolicy) -> Self {
        self.rearm_policy = policy;
        self
    }

    /// Set how interrupted writes are reported
    pub fn with_cancel_reporting(mut self, reporting: CancelReporting) -> Self {
        self.cancel_reporting = reporting;
        self
    }

    /// Set storage backing
    pub fn with_backing(mut self, backing: BackingType) -> Self {
        self.backing = backing;
        self
    }

    /// Number of bytes a session admits before it is full
    pub fn limit(&self) -> usize {
        if self.reserve_terminator {
            self.capacity.saturating_sub(1)
        } else {
            self.capacity
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CdataError::invalid_parameter(
                "capacity",
                "Capacity cannot be zero",
            ));
        }

        if self.limit() == 0 {
            return Err(CdataError::invalid_parameter(
                "capacity",
                "No usable slot left after reserving the terminator",
            ));
        }

        if self.drain_delay > MAX_DRAIN_DELAY {
            return Err(CdataError::invalid_parameter(
                "drain_delay",
                format!("Drain delay cannot exceed {:?}", MAX_DRAIN_DELAY),
            ));
        }

        Ok(())
    }
}

/// Builder pattern for device configuration
pub struct DeviceConfigBuilder {
    config: DeviceConfig,
}

impl DeviceConfigBuilder {
    /// Create a new builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: DeviceConfig::new(name),
        }
    }

    /// Set capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Reserve the terminator slot
    pub fn reserve_terminator(mut self, reserve: bool) -> Self {
        self.config.reserve_terminator = reserve;
        self
    }

    /// Set drain delay
    pub fn drain_delay(mut self, delay: Duration) -> Self {
        self.config.drain_delay = delay;
        self
    }

    /// Drain as soon as the deferred context runs
    pub fn immediate_drain(mut self) -> Self {
        self.config.drain_delay = Duration::ZERO;
        self
    }

    /// Set rearm policy
    pub fn rearm_policy(mut self, policy: RearmPolicy) -> Self {
        self.config.rearm_policy = policy;
        self
    }

    /// Set cancel reporting
    pub fn cancel_reporting(mut self, reporting: CancelReporting) -> Self {
        self.config.cancel_reporting = reporting;
        self
    }

    /// Set backing
    pub fn backing(mut self, backing: BackingType) -> Self {
        self.config.backing = backing;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<DeviceConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
