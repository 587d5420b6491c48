// Profiler configuration
//
// Plain data the host fills in from wherever it keeps settings; `build()`
// turns it into live `Settings` through a `Registry`.

use crate::circular_buffer::CircularBuffer;
use crate::error::{ProfilerError, Result};
use crate::registry::Registry;
use crate::settings::{default_machine_name, Settings};
use crate::storage::{QueueMode, StoragePipeline};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for capture, storage and the live buffer
///
/// # Example
/// ```
/// use stepwatch::{ProfilerConfig, Registry};
///
/// let config = ProfilerConfig::default();
/// assert_eq!(config.buffer_capacity, 100);
/// let settings = config.build(&Registry::new()).unwrap();
/// assert!(settings.storage.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Machine identity recorded on every session (default: host name)
    pub machine_name: Option<String>,

    /// Storage queueing mode
    ///
    /// - `inline`: save on the caller's thread (tests, CLI tools)
    /// - `infinite`: never drop, unbounded memory
    /// - `bounded(n)` (default n = 10000): drop oldest pending on overflow
    pub queue_mode: QueueMode,

    /// Longest the storage worker sleeps without a signal
    pub worker_sleep_ms: u64,

    /// Keep recent sessions in a circular buffer for live view and merge
    pub buffer_enabled: bool,

    /// Sessions retained by the circular buffer (default: 100)
    pub buffer_capacity: usize,

    /// Filter expressions checked at start; matches are not captured
    pub capture_filters: Vec<String>,

    /// Filter expressions checked at stop; matches are neither stored nor buffered
    pub storage_filters: Vec<String>,

    /// Sink expression resolved through the registry
    pub sink: String,

    /// Per-link timeout for remote session fetches
    pub fetch_timeout_ms: u64,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            machine_name: None,
            queue_mode: QueueMode::default(),
            worker_sleep_ms: 100,
            buffer_enabled: true,
            buffer_capacity: crate::circular_buffer::DEFAULT_CAPACITY,
            capture_filters: Vec::new(),
            storage_filters: Vec::new(),
            sink: "memory".to_string(),
            fetch_timeout_ms: 30_000,
        }
    }
}

impl ProfilerConfig {
    /// Synchronous storage, small buffer. Use for tests and short-lived tools.
    pub fn inline() -> Self {
        Self {
            queue_mode: QueueMode::Inline,
            buffer_capacity: 20,
            ..Self::default()
        }
    }

    /// Larger queue and buffer for busy services; drops health checks.
    pub fn high_volume() -> Self {
        Self {
            queue_mode: QueueMode::Bounded(50_000),
            worker_sleep_ms: 50,
            buffer_capacity: 500,
            capture_filters: vec!["contains:/health".to_string()],
            ..Self::default()
        }
    }

    pub fn worker_sleep(&self) -> Duration {
        Duration::from_millis(self.worker_sleep_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.buffer_enabled && self.buffer_capacity == 0 {
            return Err(ProfilerError::InvalidConfig(
                "buffer_capacity must be > 0 when the buffer is enabled".to_string(),
            ));
        }

        if let QueueMode::Bounded(0) = self.queue_mode {
            return Err(ProfilerError::InvalidConfig(
                "bounded queue limit must be > 0".to_string(),
            ));
        }

        if self.worker_sleep_ms == 0 {
            return Err(ProfilerError::InvalidConfig(
                "worker_sleep_ms must be > 0".to_string(),
            ));
        }

        if self.fetch_timeout_ms == 0 {
            return Err(ProfilerError::InvalidConfig(
                "fetch_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.machine_name.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(ProfilerError::InvalidConfig(
                "machine_name must not be blank".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate and construct live settings
    pub fn build(&self, registry: &Registry) -> Result<Settings> {
        self.validate()?;

        let sink = registry.build_sink(&self.sink)?;
        let storage = StoragePipeline::with_sleep_interval(sink, self.queue_mode, self.worker_sleep());

        let mut settings = Settings::new()
            .with_machine_name(
                self.machine_name
                    .clone()
                    .unwrap_or_else(default_machine_name),
            )
            .with_storage(Arc::new(storage));
        settings.capture_filters = registry.build_filters(&self.capture_filters)?;
        settings.storage_filters = registry.build_filters(&self.storage_filters)?;

        if self.buffer_enabled {
            settings = settings.with_buffer(Arc::new(CircularBuffer::try_new(self.buffer_capacity)?));
        }

        Ok(settings)
    }
}
