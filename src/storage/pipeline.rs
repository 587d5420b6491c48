//! Asynchronous session persistence
//!
//! The pipeline decouples the request path (`Profiler::stop`) from the sink
//! (disk, database, remote collector). The hot path only enqueues an
//! `Arc<Session>`; one dedicated worker thread calls `save` for every queued
//! session, one at a time, in FIFO order.
//!
//! # Design
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ REQUEST FLOWS (hot path)                                        │
//! │   profiler.stop() → pipeline.enqueue(session) → signal worker   │
//! │   Never blocks: bounded queue drops the OLDEST entry when full  │
//! └─────────────────────────────────────────────────────────────────┘
//!                          │
//!                          │ ArrayQueue (bounded) / SegQueue (infinite)
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ STORAGE WORKER (spawned on first enqueue)                       │
//! │   loop {                                                        │
//! │     wait for signal, at most sleep_interval                     │
//! │     while let Some(s) = queue.pop() { sink.save(&s) }           │
//! │   }                                                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Inline` mode skips all of this and saves on the caller's thread.

use crate::session::Session;
use crate::storage::SessionSink;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use crossbeam::queue::{ArrayQueue, SegQueue};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Default bound for [`QueueMode::Bounded`]
pub const DEFAULT_QUEUE_LIMIT: usize = 10_000;

/// Default time the worker waits for a signal before re-checking the queue
pub const DEFAULT_SLEEP_INTERVAL: Duration = Duration::from_millis(100);

/// How enqueued sessions reach the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    /// Save synchronously on the caller's thread
    Inline,
    /// Unbounded queue, never drops
    Infinite,
    /// Bounded queue; when full the oldest pending session is dropped
    Bounded(usize),
}

impl Default for QueueMode {
    fn default() -> Self {
        Self::Bounded(DEFAULT_QUEUE_LIMIT)
    }
}

enum PendingQueue {
    Inline,
    Bounded(ArrayQueue<Arc<Session>>),
    Unbounded(SegQueue<Arc<Session>>),
}

impl PendingQueue {
    fn pop(&self) -> Option<Arc<Session>> {
        match self {
            Self::Inline => None,
            Self::Bounded(q) => q.pop(),
            Self::Unbounded(q) => q.pop(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Inline => 0,
            Self::Bounded(q) => q.len(),
            Self::Unbounded(q) => q.len(),
        }
    }
}

struct Shared {
    sink: Arc<dyn SessionSink>,
    queue: PendingQueue,
    signal_tx: Sender<()>,
    signal_rx: Receiver<()>,
    sleep_interval: Duration,
    shutdown: AtomicBool,
    paused: AtomicBool,
    total_enqueued: AtomicU64,
    total_saved: AtomicU64,
    total_failed: AtomicU64,
    total_dropped: AtomicU64,
}

impl Shared {
    fn save_one(&self, session: &Arc<Session>) {
        match catch_unwind(AssertUnwindSafe(|| self.sink.save(session))) {
            Ok(Ok(())) => {
                self.total_saved.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                self.total_failed.fetch_add(1, Ordering::Relaxed);
                warn!(session = %session.id(), "failed to save session: {:#}", e);
            }
            Err(_) => {
                self.total_failed.fetch_add(1, Ordering::Relaxed);
                error!(session = %session.id(), "session sink panicked during save");
            }
        }
    }

    /// Sessions accounted for: saved, failed or dropped
    fn settled(&self) -> u64 {
        self.total_saved.load(Ordering::Acquire)
            + self.total_failed.load(Ordering::Acquire)
            + self.total_dropped.load(Ordering::Acquire)
    }

    fn signal(&self) {
        // A full channel already carries a pending wake-up.
        let _ = self.signal_tx.try_send(());
    }
}

/// Backpressure-aware persistence shell around a [`SessionSink`]
pub struct StoragePipeline {
    shared: Arc<Shared>,
    mode: QueueMode,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_started: AtomicBool,
}

impl StoragePipeline {
    pub fn new(sink: Arc<dyn SessionSink>, mode: QueueMode) -> Self {
        Self::with_sleep_interval(sink, mode, DEFAULT_SLEEP_INTERVAL)
    }

    pub fn with_sleep_interval(
        sink: Arc<dyn SessionSink>,
        mode: QueueMode,
        sleep_interval: Duration,
    ) -> Self {
        let queue = match mode {
            QueueMode::Inline => PendingQueue::Inline,
            QueueMode::Infinite => PendingQueue::Unbounded(SegQueue::new()),
            QueueMode::Bounded(limit) => PendingQueue::Bounded(ArrayQueue::new(limit.max(1))),
        };
        let (signal_tx, signal_rx) = channel::bounded(1);

        Self {
            shared: Arc::new(Shared {
                sink,
                queue,
                signal_tx,
                signal_rx,
                sleep_interval,
                shutdown: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                total_enqueued: AtomicU64::new(0),
                total_saved: AtomicU64::new(0),
                total_failed: AtomicU64::new(0),
                total_dropped: AtomicU64::new(0),
            }),
            mode,
            worker: Mutex::new(None),
            worker_started: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    /// Hand a finished session to the sink (hot path)
    ///
    /// # Behavior
    ///
    /// - `Inline`: `save` runs before this returns
    /// - queue has space: session is enqueued, worker signalled
    /// - bounded queue full: oldest pending session is dropped, a warning
    ///   is logged and the new session is admitted
    pub fn enqueue(&self, session: Arc<Session>) {
        let shared = &self.shared;

        if shared.shutdown.load(Ordering::Acquire) {
            shared.total_dropped.fetch_add(1, Ordering::Relaxed);
            shared.total_enqueued.fetch_add(1, Ordering::Relaxed);
            warn!(session = %session.id(), "storage pipeline shut down - session dropped");
            return;
        }

        shared.total_enqueued.fetch_add(1, Ordering::Relaxed);

        match &shared.queue {
            PendingQueue::Inline => {
                shared.save_one(&session);
                return;
            }
            PendingQueue::Unbounded(q) => q.push(session),
            PendingQueue::Bounded(q) => {
                if let Some(oldest) = q.force_push(session) {
                    shared.total_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        dropped = %oldest.id(),
                        name = oldest.name(),
                        "storage queue full ({}) - oldest session dropped. \
                         Consider increasing the queue limit or reducing capture volume.",
                        q.capacity()
                    );
                }
            }
        }

        self.ensure_worker();
        shared.signal();
    }

    /// Stop draining until [`StoragePipeline::resume`]; enqueue keeps working
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
        self.shared.signal();
    }

    /// Whether the background worker has been spawned
    pub fn worker_running(&self) -> bool {
        self.worker_started.load(Ordering::Acquire)
    }

    /// Block until every session enqueued so far has been saved, failed or
    /// dropped, or until `timeout` elapses. Returns true if fully drained.
    ///
    /// Not for request paths; meant for graceful shutdown and tests.
    pub fn flush(&self, timeout: Duration) -> bool {
        let target = self.shared.total_enqueued.load(Ordering::Acquire);
        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.settled() >= target {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            self.shared.signal();
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Drain what is pending (bounded by `timeout`), then stop and join the worker.
    ///
    /// Sessions enqueued afterwards are dropped with a warning.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.resume();
        let drained = self.flush(timeout);
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.signal();

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if drained {
                let _ = handle.join();
            }
        }
        drained
    }

    pub fn stats(&self) -> PipelineStats {
        let shared = &self.shared;
        PipelineStats {
            total_enqueued: shared.total_enqueued.load(Ordering::Relaxed),
            total_saved: shared.total_saved.load(Ordering::Relaxed),
            total_failed: shared.total_failed.load(Ordering::Relaxed),
            total_dropped: shared.total_dropped.load(Ordering::Relaxed),
            pending: shared.queue.len(),
            capacity: match self.mode {
                QueueMode::Bounded(limit) => Some(limit.max(1)),
                _ => None,
            },
        }
    }

    fn ensure_worker(&self) {
        if self
            .worker_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let shared = self.shared.clone();
        match thread::Builder::new()
            .name("stepwatch-storage".to_string())
            .spawn(move || Self::storage_worker(shared))
        {
            Ok(handle) => {
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                debug!("storage worker started");
            }
            Err(e) => {
                self.worker_started.store(false, Ordering::Release);
                error!("failed to spawn storage worker: {}", e);
            }
        }
    }

    /// Worker thread: wait for a signal, drain everything, repeat
    fn storage_worker(shared: Arc<Shared>) {
        loop {
            match shared.signal_rx.recv_timeout(shared.sleep_interval) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let stopping = shared.shutdown.load(Ordering::Acquire);
            if shared.paused.load(Ordering::Acquire) && !stopping {
                continue;
            }

            while let Some(session) = shared.queue.pop() {
                shared.save_one(&session);
            }

            if stopping {
                break;
            }
        }
        debug!("storage worker stopped");
    }
}

impl Drop for StoragePipeline {
    fn drop(&mut self) {
        if self.worker_started.load(Ordering::Acquire) {
            self.shutdown(Duration::from_secs(5));
        }
    }
}

impl std::fmt::Debug for StoragePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoragePipeline")
            .field("mode", &self.mode)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub total_enqueued: u64,
    pub total_saved: u64,
    pub total_failed: u64,
    /// Sessions lost to overflow (or enqueued after shutdown)
    pub total_dropped: u64,
    pub pending: usize,
    /// Queue bound, None for inline and infinite modes
    pub capacity: Option<usize>,
}

impl PipelineStats {
    /// Fraction of enqueued sessions lost (0.0 to 1.0)
    pub fn drop_rate(&self) -> f64 {
        if self.total_enqueued == 0 {
            0.0
        } else {
            self.total_dropped as f64 / self.total_enqueued as f64
        }
    }
}
