//! Scoped step guards
//!
//! A [`Step`] measures one nested timing. Opening it records the start
//! offset and makes it the current step of its flow; closing it (explicitly
//! or on drop, including while unwinding) appends the finalized timing to
//! the session and restores the previous current step.
//!
//! # Example
//!
//! ```
//! use stepwatch::{Profiler, Settings};
//!
//! let settings = Settings::new();
//! let profiler = Profiler::start(&settings, "import batch", &[]);
//! {
//!     let _parse = profiler.step("parse").unwrap();
//!     let mut speculative = profiler.step("fast path").unwrap();
//!     speculative.discard(); // no timing recorded for this one
//! }
//! let session = profiler.stop().unwrap();
//! assert_eq!(session.timings.len(), 1);
//! ```

use crate::context::SessionContext;
use crate::error::{ProfilerError, Result};
use crate::profiler::{record_custom, ProfilerInner};
use crate::timing::{Timing, TimingId, TimingType, CORRELATION_ID_KEY, REMOTE_ADDRESS_KEY};
use std::sync::Arc;
use tracing::warn;

/// Guard for one open timing
pub struct Step {
    state: Option<OpenStep>,
    noop: bool,
}

struct OpenStep {
    profiler: Arc<ProfilerInner>,
    context: Arc<dyn SessionContext>,
    timing: Timing,
    previous_step: Option<TimingId>,
    discarded: bool,
}

impl Step {
    /// Open a step on the profiler currently registered in `context`
    pub fn current(context: Arc<dyn SessionContext>, name: &str, tags: &[&str]) -> Result<Step> {
        let profiler = context
            .current_profiler()
            .ok_or(ProfilerError::NoActiveProfiler)?;
        match profiler.inner() {
            Some(inner) => Self::open(inner.clone(), context, TimingType::Step, name, tags),
            None => Self::checked_noop(name),
        }
    }

    pub(crate) fn open(
        profiler: Arc<ProfilerInner>,
        context: Arc<dyn SessionContext>,
        timing_type: TimingType,
        name: &str,
        tags: &[&str],
    ) -> Result<Step> {
        if name.trim().is_empty() {
            return Err(ProfilerError::invalid_argument("step name must not be empty"));
        }
        if profiler.is_stopped() {
            return Ok(Self::noop());
        }

        let previous_step = context.current_step_id(profiler.session_id);
        let mut timing = Timing::new(timing_type, name)
            .with_parent(previous_step.unwrap_or(profiler.session_id))
            .with_offset(profiler.elapsed_ms());
        timing.tags.extend(tags.iter().map(|t| t.to_string()));
        timing.sort_key = profiler.next_sort_key();

        if let Err(e) = context.set_current_step_id(profiler.session_id, Some(timing.id)) {
            warn!("failed to push step '{}' onto session context: {}", name, e);
        }

        Ok(Step {
            state: Some(OpenStep {
                profiler,
                context,
                timing,
                previous_step,
                discarded: false,
            }),
            noop: false,
        })
    }

    /// A step that records nothing
    pub fn noop() -> Step {
        Step {
            state: None,
            noop: true,
        }
    }

    pub(crate) fn checked_noop(name: &str) -> Result<Step> {
        if name.trim().is_empty() {
            return Err(ProfilerError::invalid_argument("step name must not be empty"));
        }
        Ok(Self::noop())
    }

    pub fn is_noop(&self) -> bool {
        self.noop
    }

    /// True until the step is closed
    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub fn id(&self) -> Option<TimingId> {
        self.state.as_ref().map(|s| s.timing.id)
    }

    pub fn parent_id(&self) -> Option<TimingId> {
        self.state.as_ref().and_then(|s| s.timing.parent_id)
    }

    pub fn start_offset_ms(&self) -> Option<u64> {
        self.state.as_ref().map(|s| s.timing.start_offset_ms)
    }

    pub fn add_tag(&mut self, tag: &str) {
        if let Some(state) = &mut self.state {
            state.timing.tags.insert(tag.to_string());
        }
    }

    pub fn add_data(&mut self, key: &str, value: &str) {
        if let Some(state) = &mut self.state {
            state.timing.data.insert(key.to_string(), value.to_string());
        }
    }

    /// Link this step to a session captured by a remote instance
    ///
    /// `remote_address` is the base address of the remote profiler endpoint;
    /// pass `None` when the step name is already the remote URL.
    pub fn set_correlation(&mut self, correlation_id: &str, remote_address: Option<&str>) {
        self.add_data(CORRELATION_ID_KEY, correlation_id);
        if let Some(addr) = remote_address {
            self.add_data(REMOTE_ADDRESS_KEY, addr);
        }
    }

    /// Record an externally measured operation as a child of this step
    pub fn custom(
        &self,
        category: &str,
        name: &str,
        start_offset_ms: u64,
        duration_ms: u64,
    ) -> Result<Option<TimingId>> {
        match &self.state {
            Some(state) => record_custom(
                &state.profiler,
                state.timing.id,
                category,
                name,
                start_offset_ms,
                duration_ms,
            )
            .map(Some),
            None => Self::checked_noop(name).map(|_| None),
        }
    }

    /// Abandon this measurement: closing will not record a timing
    pub fn discard(&mut self) {
        if let Some(state) = &mut self.state {
            state.discarded = true;
        }
    }

    /// Close the step. Subsequent calls do nothing.
    pub fn close(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };

        // A stopped session has already left the context.
        if !state.profiler.is_stopped() {
            if let Err(e) = state
                .context
                .set_current_step_id(state.profiler.session_id, state.previous_step)
            {
                warn!(
                    "failed to restore session context after step '{}': {}",
                    state.timing.name, e
                );
            }
        }

        if state.discarded {
            return;
        }

        let mut timing = state.timing;
        timing.duration_ms = state
            .profiler
            .elapsed_ms()
            .saturating_sub(timing.start_offset_ms);
        state.profiler.append(timing);
    }

    /// Close and consume the step
    pub fn finish(mut self) {
        self.close();
    }
}

impl Drop for Step {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            Some(state) => f
                .debug_struct("Step")
                .field("id", &state.timing.id)
                .field("name", &state.timing.name)
                .field("discarded", &state.discarded)
                .finish(),
            None => f.debug_struct("Step").field("noop", &self.noop).finish(),
        }
    }
}
