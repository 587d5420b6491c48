//! Profiler: drives the lifecycle of one capture session
//!
//! # Capture Protocol
//!
//! ```text
//! Profiler::start(settings, "GET /orders")      session id allocated, clock marked,
//!   │                                           registered as current in the context
//!   ├─ step("load")      ─┐                     start offset = elapsed, parent = current step
//!   │    └─ step("sql")  ─┤  Step guards        close: duration = elapsed - start,
//!   │                     ┘                     timing appended (lock-free)
//!   └─ stop()                                   duration frozen, timings drained,
//!                                               Arc<Session> published to storage + buffer
//! ```
//!
//! Everything here is fail-open: a profiler excluded by a capture filter is a
//! no-op handle, and faults in the session context are logged and ignored.
//! Only programmer errors (empty names, no active profiler) are returned.

use crate::context::{FlowContext, SessionContext};
use crate::error::{ProfilerError, Result};
use crate::session::Session;
use crate::settings::Settings;
use crate::step::Step;
use crate::timing::{Timing, TimingId, TimingType, CATEGORY_KEY, CORRELATION_ID_KEY};
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle to a running capture session
///
/// Cloning is cheap and every clone drives the same session. A profiler that
/// was filtered out (or failed to start) is inactive: all of its operations
/// are silent no-ops.
#[derive(Clone)]
pub struct Profiler {
    inner: Option<Arc<ProfilerInner>>,
}

pub(crate) struct ProfilerInner {
    pub(crate) session_id: TimingId,
    name: String,
    tags: BTreeSet<String>,
    started: DateTime<Utc>,
    start_mark_ms: u64,
    /// Closed timings, appended concurrently by steps on any flow
    timings: SegQueue<Timing>,
    /// Root data entries, applied in order at stop
    root_data: SegQueue<(String, String)>,
    sort_seq: AtomicI64,
    stopped: AtomicBool,
    pub(crate) settings: Settings,
}

impl ProfilerInner {
    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.settings.clock.elapsed_since(self.start_mark_ms)
    }

    pub(crate) fn next_sort_key(&self) -> i64 {
        self.sort_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Append a finalized timing; ignored once the session is frozen
    pub(crate) fn append(&self, timing: Timing) {
        if self.is_stopped() {
            debug!(
                session = %self.session_id,
                timing = %timing.name,
                "timing closed after stop, ignored"
            );
            return;
        }
        self.timings.push(timing);
    }
}

impl Profiler {
    /// Start a new session, registering it as current in the settings' context.
    ///
    /// Never fails: an excluded or invalid session yields an inactive profiler.
    pub fn start(settings: &Settings, name: &str, tags: &[&str]) -> Self {
        match Self::try_start(settings, name, tags) {
            Ok(profiler) => profiler,
            Err(e) => {
                warn!("profiler not started: {}", e);
                Self::noop()
            }
        }
    }

    /// Like [`Profiler::start`] but reports an empty name as an error
    pub fn try_start(settings: &Settings, name: &str, tags: &[&str]) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(ProfilerError::invalid_argument("session name must not be empty"));
        }

        let tags: BTreeSet<String> = tags.iter().map(|t| t.to_string()).collect();
        if settings.capture_filters.excludes(name, &tags) {
            debug!(name, "session excluded from capture");
            return Ok(Self::noop());
        }

        let inner = Arc::new(ProfilerInner {
            session_id: TimingId::new(),
            name: name.to_string(),
            tags,
            started: Utc::now(),
            start_mark_ms: settings.clock.now_ms(),
            timings: SegQueue::new(),
            root_data: SegQueue::new(),
            sort_seq: AtomicI64::new(1),
            stopped: AtomicBool::new(false),
            settings: settings.clone(),
        });

        let profiler = Self { inner: Some(inner) };
        if let Err(e) = settings.context.enter_profiler(profiler.clone()) {
            warn!("failed to register profiler in session context: {}", e);
        }

        Ok(profiler)
    }

    /// An inactive profiler
    pub fn noop() -> Self {
        Self { inner: None }
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }

    /// Session id, None for an inactive profiler
    pub fn id(&self) -> Option<TimingId> {
        self.inner.as_ref().map(|i| i.session_id)
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.as_deref().map(|i| i.name.as_str())
    }

    /// Milliseconds since start (0 for an inactive profiler)
    pub fn elapsed_ms(&self) -> u64 {
        self.inner.as_deref().map_or(0, ProfilerInner::elapsed_ms)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.as_deref().map_or(true, ProfilerInner::is_stopped)
    }

    pub(crate) fn inner(&self) -> Option<&Arc<ProfilerInner>> {
        self.inner.as_ref()
    }

    /// True when both handles drive the same session
    pub fn same_session(&self, other: &Profiler) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Open a step on the settings' context
    pub fn step(&self, name: &str) -> Result<Step> {
        self.step_with_tags(name, &[])
    }

    pub fn step_with_tags(&self, name: &str, tags: &[&str]) -> Result<Step> {
        match &self.inner {
            Some(inner) => Step::open(
                inner.clone(),
                inner.settings.context.clone(),
                TimingType::Step,
                name,
                tags,
            ),
            None => Step::checked_noop(name),
        }
    }

    /// Open a step on an explicit flow context
    pub fn step_in(&self, flow: Arc<dyn SessionContext>, name: &str, tags: &[&str]) -> Result<Step> {
        match &self.inner {
            Some(inner) => Step::open(inner.clone(), flow, TimingType::Step, name, tags),
            None => Step::checked_noop(name),
        }
    }

    /// Open a scoped custom timing, e.g. around an outbound HTTP call
    pub fn custom_step(&self, category: &str, name: &str) -> Result<Step> {
        let mut step = match &self.inner {
            Some(inner) => Step::open(
                inner.clone(),
                inner.settings.context.clone(),
                TimingType::Custom,
                name,
                &[],
            )?,
            None => return Step::checked_noop(name),
        };
        step.add_data(CATEGORY_KEY, category);
        Ok(step)
    }

    /// Record an externally measured operation under the current step
    pub fn custom_timing(
        &self,
        category: &str,
        name: &str,
        start_offset_ms: u64,
        duration_ms: u64,
    ) -> Result<Option<TimingId>> {
        let Some(inner) = &self.inner else {
            return Step::checked_noop(name).map(|_| None);
        };
        let parent = inner
            .settings
            .context
            .current_step_id(inner.session_id)
            .unwrap_or(inner.session_id);
        record_custom(inner, parent, category, name, start_offset_ms, duration_ms).map(Some)
    }

    /// New explicit flow positioned at the current step, for fan-out work
    pub fn flow(&self) -> Arc<FlowContext> {
        match &self.inner {
            Some(inner) => FlowContext::attached(
                self,
                inner.settings.context.current_step_id(inner.session_id),
            ),
            None => FlowContext::new(),
        }
    }

    /// Attach a key/value pair to the session root
    pub fn add_session_data(&self, key: &str, value: &str) {
        if let Some(inner) = &self.inner {
            if inner.is_stopped() {
                return;
            }
            inner.root_data.push((key.to_string(), value.to_string()));
        }
    }

    /// Mark this session as answering a remote caller's correlation id
    pub fn set_correlation_id(&self, correlation_id: &str) {
        self.add_session_data(CORRELATION_ID_KEY, correlation_id);
    }

    /// Finish the session and publish it.
    ///
    /// Returns the frozen session on the first call and `None` afterwards
    /// (or for an inactive profiler).
    pub fn stop(&self) -> Option<Arc<Session>> {
        let inner = self.inner.as_ref()?;
        if inner
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let duration_ms = inner.elapsed_ms();
        let mut timings = Vec::with_capacity(inner.timings.len());
        while let Some(timing) = inner.timings.pop() {
            timings.push(timing);
        }

        let mut data = BTreeMap::new();
        while let Some((key, value)) = inner.root_data.pop() {
            data.insert(key, value);
        }

        let session = Arc::new(Session {
            root: Timing {
                id: inner.session_id,
                parent_id: None,
                timing_type: TimingType::Session,
                name: inner.name.clone(),
                tags: inner.tags.clone(),
                start_offset_ms: 0,
                duration_ms,
                sort_key: 0,
                data,
            },
            machine_name: inner.settings.machine_name.clone(),
            started: inner.started,
            timings,
        });

        self.unregister();
        inner.settings.publish(&session);
        Some(session)
    }

    /// Leave the context of the flow calling `stop()`. Flows that registered
    /// this profiler elsewhere drop it lazily once they see it stopped.
    fn unregister(&self) {
        let Some(inner) = &self.inner else { return };
        if let Err(e) = inner.settings.context.leave_profiler(inner.session_id) {
            warn!("failed to clear session context: {}", e);
        }
    }
}

impl std::fmt::Debug for Profiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Some(inner) => f
                .debug_struct("Profiler")
                .field("session_id", &inner.session_id)
                .field("name", &inner.name)
                .field("stopped", &inner.is_stopped())
                .finish(),
            None => f.write_str("Profiler(noop)"),
        }
    }
}

pub(crate) fn record_custom(
    inner: &ProfilerInner,
    parent: TimingId,
    category: &str,
    name: &str,
    start_offset_ms: u64,
    duration_ms: u64,
) -> Result<TimingId> {
    if name.trim().is_empty() {
        return Err(ProfilerError::invalid_argument("timing name must not be empty"));
    }
    let mut timing = Timing::new(TimingType::Custom, name)
        .with_parent(parent)
        .with_offset(start_offset_ms)
        .with_duration(duration_ms);
    if !category.is_empty() {
        timing = timing.with_data(CATEGORY_KEY, category);
    }
    timing.sort_key = inner.next_sort_key();
    let id = timing.id;
    inner.append(timing);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::context::FlowContext;
    use crate::filter::ContainsFilter;

    fn manual_settings() -> (Settings, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let settings = Settings::new()
            .with_clock(clock.clone())
            .with_context(FlowContext::new())
            .with_machine_name("test-host");
        (settings, clock)
    }

    #[test]
    fn test_start_stop_freezes_duration() {
        let (settings, clock) = manual_settings();
        let profiler = Profiler::start(&settings, "job", &["batch"]);
        clock.advance(42);
        let session = profiler.stop().unwrap();
        assert_eq!(session.duration_ms(), 42);
        assert_eq!(session.name(), "job");
        assert_eq!(session.machine_name, "test-host");
        assert!(session.root.tags.contains("batch"));
    }

    #[test]
    fn test_stop_twice_is_noop() {
        let (settings, _) = manual_settings();
        let profiler = Profiler::start(&settings, "job", &[]);
        assert!(profiler.stop().is_some());
        assert!(profiler.stop().is_none());
        assert!(profiler.is_stopped());
    }

    #[test]
    fn test_capture_filter_yields_noop() {
        let (settings, _) = manual_settings();
        let settings = settings.with_capture_filter(ContainsFilter::new("health"));
        let profiler = Profiler::start(&settings, "GET /Health", &[]);
        assert!(!profiler.is_active());
        assert!(profiler.id().is_none());
        assert!(profiler.step("anything").unwrap().is_noop());
        assert!(profiler.stop().is_none());
    }

    #[test]
    fn test_empty_name_rejected_by_try_start() {
        let (settings, _) = manual_settings();
        let err = Profiler::try_start(&settings, "  ", &[]).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(!Profiler::start(&settings, "", &[]).is_active());
    }

    #[test]
    fn test_start_registers_and_stop_clears_context() {
        let (settings, _) = manual_settings();
        let profiler = Profiler::start(&settings, "job", &[]);
        let current = settings.context.current_profiler().unwrap();
        assert!(current.same_session(&profiler));
        profiler.stop();
        assert!(settings.context.current_profiler().is_none());
    }

    #[test]
    fn test_custom_timing_parents_to_current_step() {
        let (settings, clock) = manual_settings();
        let profiler = Profiler::start(&settings, "job", &[]);
        let step = profiler.step("query").unwrap();
        let step_id = step.id().unwrap();
        let custom = profiler.custom_timing("sql", "SELECT 1", 0, 3).unwrap().unwrap();
        drop(step);
        clock.advance(5);
        let session = profiler.stop().unwrap();
        let timing = session.timing(custom).unwrap();
        assert_eq!(timing.parent_id, Some(step_id));
        assert_eq!(timing.timing_type, TimingType::Custom);
        assert_eq!(timing.data.get(CATEGORY_KEY).map(String::as_str), Some("sql"));
    }

    #[test]
    fn test_session_data_and_correlation_id() {
        let (settings, _) = manual_settings();
        let profiler = Profiler::start(&settings, "rpc", &[]);
        profiler.set_correlation_id("corr-7");
        profiler.add_session_data("user", "42");
        let session = profiler.stop().unwrap();
        assert_eq!(session.correlation_id(), Some("corr-7"));
        assert_eq!(session.root.data.get("user").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_noop_profiler_debug() {
        assert_eq!(format!("{:?}", Profiler::noop()), "Profiler(noop)");
    }
}
