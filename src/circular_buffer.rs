//! Fixed-capacity ring of the most recent sessions
//!
//! The buffer backs live inspection (export endpoint) and is the local store
//! that the import/correlation protocol merges remote sessions into.
//!
//! # Design
//!
//! ```text
//!   add(s5) ──►  [ s1 | s2 | s3 | s4 ]  capacity 4
//!                  │
//!                  └─ evicted (oldest by insertion, never by access)
//!                       [ s2 | s3 | s4 | s5 ]
//! ```
//!
//! Entries are `Arc<Session>`, so a snapshot is a short read-locked clone of
//! pointers: readers always get a consistent point-in-time view and never
//! hold the lock while serializing.

use crate::error::{ProfilerError, Result};
use crate::session::Session;
use crate::timing::TimingId;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

/// Default number of sessions retained
pub const DEFAULT_CAPACITY: usize = 100;

type Exclusion = Box<dyn Fn(&Session) -> bool + Send + Sync>;

/// Thread-safe FIFO ring of recent sessions
pub struct CircularBuffer {
    entries: RwLock<VecDeque<Arc<Session>>>,
    capacity: usize,
    exclusion: Option<Exclusion>,
}

impl CircularBuffer {
    /// Create a buffer holding at most `capacity` sessions
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Circular buffer capacity must be > 0");
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            exclusion: None,
        }
    }

    /// Fallible constructor for capacities coming from configuration
    pub fn try_new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ProfilerError::invalid_argument(
                "circular buffer capacity must be > 0",
            ));
        }
        Ok(Self::new(capacity))
    }

    /// Suppress sessions for which `predicate` returns true
    pub fn with_exclusion<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Session) -> bool + Send + Sync + 'static,
    {
        self.exclusion = Some(Box::new(predicate));
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Append a session, evicting the oldest entries beyond capacity.
    ///
    /// Returns false if the exclusion predicate rejected it.
    pub fn add(&self, session: Arc<Session>) -> bool {
        if self.is_excluded(&session) {
            return false;
        }
        let mut entries = self.write();
        entries.push_back(session);
        self.evict(&mut entries);
        true
    }

    /// Append only if no entry with the same id is buffered.
    ///
    /// The membership check and the insert happen under one write lock, so
    /// concurrent imports of the same session cannot both succeed.
    pub fn add_if_absent(&self, session: Arc<Session>) -> bool {
        if self.is_excluded(&session) {
            return false;
        }
        let mut entries = self.write();
        if entries.iter().any(|s| s.id() == session.id()) {
            return false;
        }
        entries.push_back(session);
        self.evict(&mut entries);
        true
    }

    /// Current contents in insertion order
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.read().iter().cloned().collect()
    }

    pub fn contains(&self, id: TimingId) -> bool {
        self.read().iter().any(|s| s.id() == id)
    }

    pub fn get(&self, id: TimingId) -> Option<Arc<Session>> {
        self.read().iter().find(|s| s.id() == id).cloned()
    }

    /// Most recent session answering `correlation_id`
    pub fn find_by_correlation_id(&self, correlation_id: &str) -> Option<Arc<Session>> {
        self.read()
            .iter()
            .rev()
            .find(|s| s.correlation_id() == Some(correlation_id))
            .cloned()
    }

    pub fn contains_correlation_id(&self, correlation_id: &str) -> bool {
        self.read()
            .iter()
            .any(|s| s.correlation_id() == Some(correlation_id))
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    fn is_excluded(&self, session: &Session) -> bool {
        self.exclusion.as_ref().is_some_and(|pred| pred(session))
    }

    fn evict(&self, entries: &mut VecDeque<Arc<Session>>) {
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, VecDeque<Arc<Session>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, VecDeque<Arc<Session>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CircularBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for CircularBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("has_exclusion", &self.exclusion.is_some())
            .finish()
    }
}
