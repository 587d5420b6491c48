//! Stepwatch - in-process request profiler with cross-instance drill-down
//!
//! A [`Profiler`] captures one unit of work (a request, a job) as a
//! [`Session`]: a tree of nested, timed [`Step`]s and custom timings. Stopped
//! sessions go to a background [`StoragePipeline`] and a [`CircularBuffer`]
//! of recent sessions. Instances exchange buffered sessions as JSON so that a
//! call into another service can be drilled into by correlation id.
//!
//! ```
//! use stepwatch::{CircularBuffer, Settings};
//! use std::sync::Arc;
//!
//! let buffer = Arc::new(CircularBuffer::new(10));
//! let settings = Settings::new().with_buffer(buffer.clone());
//!
//! let profiler = settings.start("GET /orders", &["http"]);
//! {
//!     let _load = profiler.step("load orders").unwrap();
//! }
//! let session = profiler.stop().unwrap();
//! assert_eq!(session.timings.len(), 1);
//! assert!(buffer.contains(session.id()));
//! ```

pub mod circular_buffer;
pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod filter;
pub mod import;
pub mod profiler;
pub mod registry;
pub mod remote;
pub mod session;
pub mod settings;
pub mod step;
pub mod storage;
pub mod text_output;
pub mod timing;
pub mod wire;

pub use circular_buffer::CircularBuffer;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::ProfilerConfig;
pub use context::{FlowContext, SessionContext, ThreadLocalContext};
pub use error::{ProfilerError, Result};
pub use export::{ExportRequest, ExportResponse};
pub use filter::{FilterSet, SessionFilter};
pub use import::{DrillDownReport, ImportReport, Importer};
pub use profiler::Profiler;
pub use registry::Registry;
pub use remote::{HttpFetcher, RemoteFetcher};
pub use session::{CorrelationLink, Session};
pub use settings::Settings;
pub use step::Step;
pub use storage::{PipelineStats, QueueMode, SessionSink, StoragePipeline};
pub use timing::{Timing, TimingId, TimingType};
