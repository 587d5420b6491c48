//! Timing records
//!
//! A [`Timing`] is one measured operation inside a session: the session root
//! itself, a nested step, or a custom timing recorded by an integration
//! (SQL command, outbound HTTP call, ...). Timings are plain data; they are
//! built by [`crate::step::Step`] and frozen once appended to a session.
//!
//! # Wire Mapping
//!
//! ```text
//! Timing (Rust)                 →  JSON field
//! ├─ id: TimingId               →  "id"            (uuid string)
//! ├─ parent_id: Option<..>      →  "parentId"      (omitted when None)
//! ├─ timing_type: TimingType    →  "type"          ("session" | "step" | "custom")
//! ├─ name: String               →  "name"
//! ├─ tags: BTreeSet<String>     →  "tags"
//! ├─ start_offset_ms: u64       →  "startOffsetMs"
//! ├─ duration_ms: u64           →  "durationMs"
//! ├─ sort_key: i64              →  "sortKey"
//! └─ data: BTreeMap<..>         →  "data"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Data key carrying the correlation id that links a timing to a remote session
pub const CORRELATION_ID_KEY: &str = "correlationId";

/// Data key carrying the base address of the remote instance owning a correlated session
pub const REMOTE_ADDRESS_KEY: &str = "remoteAddress";

/// Data key holding the category of a custom timing (e.g. "sql", "http")
pub const CATEGORY_KEY: &str = "category";

/// Opaque timing identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimingId(Uuid);

impl TimingId {
    /// Allocate a fresh random identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TimingId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TimingId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for TimingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TimingId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Kind of measured operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimingType {
    /// Root timing of a session
    Session,
    /// Nested scoped step
    #[default]
    Step,
    /// Externally measured operation recorded by an integration
    Custom,
}

/// A single measured operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub id: TimingId,

    /// Parent timing within the same session (None only for the session root)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_id: Option<TimingId>,

    #[serde(rename = "type")]
    pub timing_type: TimingType,

    pub name: String,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Offset from session start in milliseconds
    pub start_offset_ms: u64,

    pub duration_ms: u64,

    /// Capture order within the session; ties broken by start offset
    #[serde(default)]
    pub sort_key: i64,

    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Timing {
    pub fn new(timing_type: TimingType, name: impl Into<String>) -> Self {
        Self {
            id: TimingId::new(),
            parent_id: None,
            timing_type,
            name: name.into(),
            tags: BTreeSet::new(),
            start_offset_ms: 0,
            duration_ms: 0,
            sort_key: 0,
            data: BTreeMap::new(),
        }
    }

    pub fn with_parent(mut self, parent: TimingId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn with_offset(mut self, start_offset_ms: u64) -> Self {
        self.start_offset_ms = start_offset_ms;
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// End offset from session start
    pub fn end_offset_ms(&self) -> u64 {
        self.start_offset_ms.saturating_add(self.duration_ms)
    }

    /// Correlation id referenced by this timing, if any
    pub fn correlation_id(&self) -> Option<&str> {
        self.data
            .get(CORRELATION_ID_KEY)
            .map(String::as_str)
            .filter(|cid| !cid.is_empty())
    }

    /// Explicit remote address recorded alongside a correlation id
    pub fn remote_address(&self) -> Option<&str> {
        self.data
            .get(REMOTE_ADDRESS_KEY)
            .map(String::as_str)
            .filter(|addr| !addr.is_empty())
    }
}
