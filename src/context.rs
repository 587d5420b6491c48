//! Session context: where "the current profiler" and "the current step" live
//!
//! The capture protocol never reaches for hidden global state. Profilers and
//! steps resolve their ambient position through a [`SessionContext`]
//! capability supplied in [`crate::Settings`] or passed explicitly.
//!
//! Two implementations ship with the crate:
//!
//! - [`ThreadLocalContext`] stores the current profiler/step per OS thread.
//!   Good for request-per-thread hosts where a unit of work never hops
//!   threads.
//! - [`FlowContext`] is an explicit value owned by one logical flow. This is
//!   the recommended pattern for fan-out: fork one flow per concurrent branch
//!   and every branch parents its steps to the step that was current at the
//!   fork point.
//!
//! ```text
//!   request flow ──► step "fan out" ──┬─ fork ──► flow A ──► step "shard 1"
//!                                     └─ fork ──► flow B ──► step "shard 2"
//!   both shard steps have parent_id = id("fan out")
//! ```
//!
//! Both keep profilers as a stack and current steps keyed by session id. A
//! profiler started inside another one on the same flow hides it only until
//! it stops, and a step is never resolved as the parent of a timing that
//! belongs to a different session.

use crate::error::Result;
use crate::profiler::Profiler;
use crate::timing::TimingId;
use std::cell::RefCell;
use std::sync::{Arc, Mutex, PoisonError};

/// Resolves and updates the current profiler and step for one execution flow
pub trait SessionContext: Send + Sync {
    /// Innermost running profiler registered on this flow
    fn current_profiler(&self) -> Option<Profiler>;

    /// Register `profiler` as current, above any profiler already running
    fn enter_profiler(&self, profiler: Profiler) -> Result<()>;

    /// Drop the registration of `session` and its current step
    fn leave_profiler(&self, session: TimingId) -> Result<()>;

    /// Current step of `session` on this flow (None = session root)
    fn current_step_id(&self, session: TimingId) -> Option<TimingId>;

    fn set_current_step_id(&self, session: TimingId, step: Option<TimingId>) -> Result<()>;
}

/// Profiler stack plus one current-step slot per session
#[derive(Clone, Default)]
struct Frames {
    profilers: Vec<Profiler>,
    steps: Vec<(TimingId, TimingId)>,
}

impl Frames {
    const fn new() -> Self {
        Self {
            profilers: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Forget profilers stopped elsewhere, along with their step slots
    fn prune(&mut self) {
        if !self.profilers.iter().any(Profiler::is_stopped) {
            return;
        }
        let stopped: Vec<TimingId> = self
            .profilers
            .iter()
            .filter(|p| p.is_stopped())
            .filter_map(Profiler::id)
            .collect();
        self.profilers.retain(|p| !p.is_stopped());
        self.steps.retain(|(session, _)| !stopped.contains(session));
    }

    fn current_profiler(&mut self) -> Option<Profiler> {
        self.prune();
        self.profilers.last().cloned()
    }

    fn enter(&mut self, profiler: Profiler) {
        self.prune();
        if profiler.is_active() {
            self.profilers.push(profiler);
        }
    }

    fn leave(&mut self, session: TimingId) {
        self.profilers.retain(|p| p.id() != Some(session));
        self.steps.retain(|(s, _)| *s != session);
    }

    fn step(&self, session: TimingId) -> Option<TimingId> {
        self.steps
            .iter()
            .find(|(s, _)| *s == session)
            .map(|(_, step)| *step)
    }

    fn set_step(&mut self, session: TimingId, step: Option<TimingId>) {
        match step {
            Some(step) => match self.steps.iter_mut().find(|(s, _)| *s == session) {
                Some(slot) => slot.1 = step,
                None => self.steps.push((session, step)),
            },
            None => self.steps.retain(|(s, _)| *s != session),
        }
    }
}

thread_local! {
    static FRAMES: RefCell<Frames> = const { RefCell::new(Frames::new()) };
}

/// Per-thread session context
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadLocalContext;

impl ThreadLocalContext {
    pub fn new() -> Self {
        Self
    }

    fn with_frames<T>(&self, f: impl FnOnce(&mut Frames) -> T) -> Result<T> {
        FRAMES
            .try_with(|slot| match slot.try_borrow_mut() {
                Ok(mut frames) => Ok(f(&mut frames)),
                Err(e) => Err(crate::ProfilerError::Capture(format!(
                    "thread-local session context busy: {}",
                    e
                ))),
            })
            .map_err(|e| crate::ProfilerError::Capture(e.to_string()))?
    }
}

impl SessionContext for ThreadLocalContext {
    fn current_profiler(&self) -> Option<Profiler> {
        self.with_frames(Frames::current_profiler).ok().flatten()
    }

    fn enter_profiler(&self, profiler: Profiler) -> Result<()> {
        self.with_frames(|frames| frames.enter(profiler))
    }

    fn leave_profiler(&self, session: TimingId) -> Result<()> {
        self.with_frames(|frames| frames.leave(session))
    }

    fn current_step_id(&self, session: TimingId) -> Option<TimingId> {
        self.with_frames(|frames| frames.step(session)).ok().flatten()
    }

    fn set_current_step_id(&self, session: TimingId, step: Option<TimingId>) -> Result<()> {
        self.with_frames(|frames| frames.set_step(session, step))
    }
}

/// Explicit context for one logical flow of execution
#[derive(Default)]
pub struct FlowContext {
    frames: Mutex<Frames>,
}

impl FlowContext {
    /// Empty flow with no profiler attached
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Flow bound to `profiler`, positioned at `step` (None = session root)
    pub fn attached(profiler: &Profiler, step: Option<TimingId>) -> Arc<Self> {
        let mut frames = Frames::new();
        if let Some(session) = profiler.id().filter(|_| !profiler.is_stopped()) {
            frames.enter(profiler.clone());
            frames.set_step(session, step);
        }
        Arc::new(Self {
            frames: Mutex::new(frames),
        })
    }

    /// New sibling flow sharing this flow's profilers and current steps
    pub fn fork(&self) -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(self.lock().clone()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Frames> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let frames = self.lock();
        f.debug_struct("FlowContext")
            .field(
                "profilers",
                &frames.profilers.iter().filter_map(Profiler::id).collect::<Vec<_>>(),
            )
            .field("steps", &frames.steps)
            .finish()
    }
}

impl SessionContext for FlowContext {
    fn current_profiler(&self) -> Option<Profiler> {
        self.lock().current_profiler()
    }

    fn enter_profiler(&self, profiler: Profiler) -> Result<()> {
        self.lock().enter(profiler);
        Ok(())
    }

    fn leave_profiler(&self, session: TimingId) -> Result<()> {
        self.lock().leave(session);
        Ok(())
    }

    fn current_step_id(&self, session: TimingId) -> Option<TimingId> {
        self.lock().step(session)
    }

    fn set_current_step_id(&self, session: TimingId, step: Option<TimingId>) -> Result<()> {
        self.lock().set_step(session, step);
        Ok(())
    }
}
