//! Explicit profiler settings
//!
//! `Settings` replaces process-wide "current storage" / "current buffer"
//! singletons: the host constructs one (directly or from a
//! [`crate::ProfilerConfig`]) and every profiler started from it publishes
//! to the pipeline and buffer it references. Cloning is cheap; all heavy
//! members are shared.

use crate::circular_buffer::CircularBuffer;
use crate::clock::{Clock, MonotonicClock};
use crate::context::{SessionContext, ThreadLocalContext};
use crate::filter::{FilterSet, SessionFilter};
use crate::profiler::Profiler;
use crate::session::Session;
use crate::storage::StoragePipeline;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct Settings {
    pub machine_name: String,
    pub clock: Arc<dyn Clock>,
    pub context: Arc<dyn SessionContext>,
    pub storage: Option<Arc<StoragePipeline>>,
    pub buffer: Option<Arc<CircularBuffer>>,
    /// Checked at start: a match yields a no-op profiler
    pub capture_filters: FilterSet,
    /// Checked at stop: a match skips storage and buffer
    pub storage_filters: FilterSet,
}

impl Settings {
    /// Monotonic clock, thread-local context, nothing attached
    pub fn new() -> Self {
        Self {
            machine_name: default_machine_name(),
            clock: Arc::new(MonotonicClock::new()),
            context: Arc::new(ThreadLocalContext::new()),
            storage: None,
            buffer: None,
            capture_filters: FilterSet::new(),
            storage_filters: FilterSet::new(),
        }
    }

    pub fn with_machine_name(mut self, name: impl Into<String>) -> Self {
        self.machine_name = name.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_context(mut self, context: Arc<dyn SessionContext>) -> Self {
        self.context = context;
        self
    }

    pub fn with_storage(mut self, storage: Arc<StoragePipeline>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_buffer(mut self, buffer: Arc<CircularBuffer>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    pub fn with_capture_filter(mut self, filter: impl SessionFilter + 'static) -> Self {
        self.capture_filters.push(Arc::new(filter));
        self
    }

    pub fn with_storage_filter(mut self, filter: impl SessionFilter + 'static) -> Self {
        self.storage_filters.push(Arc::new(filter));
        self
    }

    /// Shorthand for [`Profiler::start`]
    pub fn start(&self, name: &str, tags: &[&str]) -> Profiler {
        Profiler::start(self, name, tags)
    }

    /// Route a finished session to storage and the live buffer
    pub(crate) fn publish(&self, session: &Arc<Session>) {
        if self.storage_filters.excludes(session.name(), &session.root.tags) {
            debug!(session = %session.id(), name = session.name(), "session excluded from storage");
            return;
        }
        if let Some(storage) = &self.storage {
            storage.enqueue(session.clone());
        }
        if let Some(buffer) = &self.buffer {
            buffer.add(session.clone());
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("machine_name", &self.machine_name)
            .field("clock", &self.clock)
            .field("storage", &self.storage)
            .field("buffer", &self.buffer)
            .field("capture_filters", &self.capture_filters)
            .field("storage_filters", &self.storage_filters)
            .finish()
    }
}

/// Host name from the environment, falling back to "localhost"
pub fn default_machine_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}
