//! Session storage: the sink contract, stock sinks and the async pipeline
//!
//! A sink only has to implement [`SessionSink::save`]. The
//! [`StoragePipeline`] provides queueing, backpressure and the single worker
//! that guarantees `save` is never invoked concurrently.

mod pipeline;
mod sinks;

pub use pipeline::{
    PipelineStats, QueueMode, StoragePipeline, DEFAULT_QUEUE_LIMIT, DEFAULT_SLEEP_INTERVAL,
};
pub use sinks::{BufferSink, FnSink, JsonDirSink, MemorySink, NullSink};

use crate::session::Session;
use std::sync::Arc;

/// Destination for finished sessions
///
/// Called from the storage worker, sequentially and in enqueue order (or on
/// the caller's thread in `Inline` mode). Return an error for failures; the
/// pipeline logs it and moves on to the next session.
pub trait SessionSink: Send + Sync {
    fn save(&self, session: &Arc<Session>) -> anyhow::Result<()>;
}
