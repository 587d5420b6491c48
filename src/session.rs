//! Sessions: one root timing plus every timing captured during a unit of work
//!
//! A [`Session`] is only ever observed finalized. While a profiler is running
//! its timings live in a lock-free queue owned by the profiler; `stop()`
//! drains them into a `Session` and wraps it in an `Arc`, after which the
//! storage pipeline and the circular buffer share it read-only.

use crate::timing::{Timing, TimingId, TimingType, CORRELATION_ID_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Timings of one session that reference the same remote correlation id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationLink<'a> {
    pub correlation_id: &'a str,
    /// Referencing timings in append order
    pub timings: Vec<&'a Timing>,
}

/// A finalized capture session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Root timing (`timing_type == Session`), flattened into the session object
    #[serde(flatten)]
    pub root: Timing,

    pub machine_name: String,

    /// Wall-clock anchor for all start offsets
    pub started: DateTime<Utc>,

    /// Child timings in append order (excludes the root)
    #[serde(default)]
    pub timings: Vec<Timing>,
}

impl Session {
    /// Create an empty session anchored at the current time
    pub fn new(name: impl Into<String>, machine_name: impl Into<String>) -> Self {
        Self {
            root: Timing::new(TimingType::Session, name),
            machine_name: machine_name.into(),
            started: Utc::now(),
            timings: Vec::new(),
        }
    }

    pub fn id(&self) -> TimingId {
        self.root.id
    }

    pub fn name(&self) -> &str {
        &self.root.name
    }

    pub fn duration_ms(&self) -> u64 {
        self.root.duration_ms
    }

    /// Look up a timing (root included) by id
    pub fn timing(&self, id: TimingId) -> Option<&Timing> {
        if self.root.id == id {
            return Some(&self.root);
        }
        self.timings.iter().find(|t| t.id == id)
    }

    /// Direct children of `parent`, ordered by sort key
    pub fn children_of(&self, parent: TimingId) -> Vec<&Timing> {
        let mut children: Vec<&Timing> = self
            .timings
            .iter()
            .filter(|t| t.parent_id == Some(parent))
            .collect();
        children.sort_by_key(|t| (t.sort_key, t.start_offset_ms));
        children
    }

    /// Correlation id under which this session can be requested remotely
    pub fn correlation_id(&self) -> Option<&str> {
        self.root
            .data
            .get(CORRELATION_ID_KEY)
            .map(String::as_str)
            .filter(|cid| !cid.is_empty())
    }

    /// Correlation ids referenced by child timings, in first-seen order, each
    /// with every timing that carries it
    pub fn correlation_links(&self) -> Vec<CorrelationLink<'_>> {
        let mut links: Vec<CorrelationLink<'_>> = Vec::new();
        for timing in &self.timings {
            let Some(cid) = timing.correlation_id() else {
                continue;
            };
            match links.iter_mut().find(|l| l.correlation_id == cid) {
                Some(link) => link.timings.push(timing),
                None => links.push(CorrelationLink {
                    correlation_id: cid,
                    timings: vec![timing],
                }),
            }
        }
        links
    }

    /// Check structural invariants and report violations.
    ///
    /// Violations indicate a capture bug, never a fatal condition, so this
    /// returns diagnostics instead of an error.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let ids: HashSet<TimingId> = std::iter::once(self.root.id)
            .chain(self.timings.iter().map(|t| t.id))
            .collect();

        if ids.len() != self.timings.len() + 1 {
            problems.push("duplicate timing ids".to_string());
        }

        for timing in &self.timings {
            match timing.parent_id {
                Some(parent) if !ids.contains(&parent) => problems.push(format!(
                    "timing '{}' references parent {} outside the session",
                    timing.name, parent
                )),
                None => problems.push(format!("timing '{}' has no parent", timing.name)),
                _ => {}
            }
            if timing.end_offset_ms() > self.duration_ms() {
                problems.push(format!(
                    "timing '{}' ends at {}ms, after session end {}ms",
                    timing.name,
                    timing.end_offset_ms(),
                    self.duration_ms()
                ));
            }
        }

        problems
    }
}
