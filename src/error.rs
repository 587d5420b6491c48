//! Error types for stepwatch
//!
//! Instrumentation code only ever sees [`ProfilerError::InvalidArgument`] and
//! [`ProfilerError::NoActiveProfiler`]; every other failure on the capture
//! path is logged and swallowed. The remaining variants surface from the
//! import/export, configuration and sink-construction APIs.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No active profiler in the current session context")]
    NoActiveProfiler,

    #[error("Capture fault: {0}")]
    Capture(String),

    #[error("Remote fetch from {url} failed: {reason}")]
    RemoteFetch { url: String, reason: String },

    #[error("Malformed session payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown registry tag: {0}")]
    UnknownRegistryTag(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProfilerError {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// True for the errors that indicate a bug in instrumentation code
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::NoActiveProfiler)
    }
}

pub type Result<T> = std::result::Result<T, ProfilerError>;
