//! Import side of the import/correlation protocol
//!
//! # Import
//!
//! Pull a remote instance's exported buffer and merge it into the local one,
//! deduplicating by session id.
//!
//! # Drill-down
//!
//! ```text
//! local session                          remote instances
//! ├─ step "load cart"
//! │   └─ custom "GET inventory"  ──corr=c1──►  inventory/view?correlationId=c1
//! └─ custom "POST payments"     ──corr=c2──►  payments/view?correlationId=c2
//! ```
//!
//! Each distinct correlation id not already answered by a buffered session is
//! fetched exactly once. Sessions merged this way are not descended into: one
//! drill-down is a single level of fan-out, which bounds the number of
//! fetches by the links of the triggering session. Failures are per link.

use crate::circular_buffer::CircularBuffer;
use crate::error::{ProfilerError, Result};
use crate::remote::{remote_base, remote_view_url, RemoteFetcher, DEFAULT_FETCH_TIMEOUT};
use crate::timing::TimingId;
use crate::wire::decode_sessions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of [`Importer::import`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Sessions in the remote payload
    pub fetched: usize,
    /// Sessions newly added to the local buffer
    pub added: usize,
    /// Sessions already present (or rejected by the buffer's exclusion)
    pub skipped: usize,
}

/// Outcome of [`Importer::drill_down`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrillDownReport {
    /// Distinct correlation ids referenced by the session
    pub links: usize,
    /// Links already answered by a buffered session
    pub already_present: usize,
    /// Links with no derivable remote address
    pub unresolved: usize,
    /// Links fetched successfully
    pub fetched: usize,
    /// Links whose fetch or decode failed
    pub failed: usize,
    /// Sessions added to the buffer
    pub merged: usize,
}

/// Merges remote sessions into a local circular buffer
#[derive(Clone)]
pub struct Importer {
    buffer: Arc<CircularBuffer>,
    fetcher: Arc<dyn RemoteFetcher>,
    timeout: Duration,
}

impl Importer {
    pub fn new(buffer: Arc<CircularBuffer>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            buffer,
            fetcher,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Per-call fetch timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn buffer(&self) -> &Arc<CircularBuffer> {
        &self.buffer
    }

    /// Fetch the session list at `url` and add the ids not yet buffered
    pub fn import(&self, url: &str) -> Result<ImportReport> {
        let bytes = self
            .fetcher
            .fetch(url, self.timeout)
            .map_err(|e| ProfilerError::RemoteFetch {
                url: url.to_string(),
                reason: format!("{:#}", e),
            })?;
        let sessions = decode_sessions(&bytes)?;

        let mut report = ImportReport {
            fetched: sessions.len(),
            ..ImportReport::default()
        };
        for session in sessions {
            if self.buffer.add_if_absent(Arc::new(session)) {
                report.added += 1;
            } else {
                report.skipped += 1;
            }
        }

        debug!(
            url,
            fetched = report.fetched,
            added = report.added,
            "imported remote sessions"
        );
        Ok(report)
    }

    /// Resolve the correlation links of a buffered session
    pub fn drill_down(&self, session_id: TimingId) -> Result<DrillDownReport> {
        let session = self.buffer.get(session_id).ok_or_else(|| {
            ProfilerError::invalid_argument(format!("session {} is not buffered", session_id))
        })?;

        let mut report = DrillDownReport::default();
        for link in session.correlation_links() {
            let correlation_id = link.correlation_id;
            report.links += 1;

            if self.buffer.contains_correlation_id(correlation_id) {
                report.already_present += 1;
                continue;
            }

            // Any referencing timing may carry the address, e.g. only a retry.
            let Some(base) = link.timings.iter().find_map(|t| remote_base(t)) else {
                debug!(
                    correlation_id,
                    timings = link.timings.len(),
                    "no remote address for correlation link"
                );
                report.unresolved += 1;
                continue;
            };

            match self.fetch_correlated(&base, correlation_id) {
                Ok(merged) => {
                    report.fetched += 1;
                    report.merged += merged;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(correlation_id, "drill-down link failed: {}", e);
                }
            }
        }

        debug!(
            session = %session_id,
            links = report.links,
            merged = report.merged,
            failed = report.failed,
            "drill-down finished"
        );
        Ok(report)
    }

    fn fetch_correlated(&self, base: &str, correlation_id: &str) -> Result<usize> {
        let url = remote_view_url(base, correlation_id)?;
        let bytes = self
            .fetcher
            .fetch(&url, self.timeout)
            .map_err(|e| ProfilerError::RemoteFetch {
                url: url.clone(),
                reason: format!("{:#}", e),
            })?;
        let merged = decode_sessions(&bytes)?
            .into_iter()
            .filter(|session| self.buffer.add_if_absent(Arc::new(session.clone())))
            .count();
        Ok(merged)
    }
}

impl std::fmt::Debug for Importer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("buffer", &self.buffer)
            .field("timeout", &self.timeout)
            .finish()
    }
}
