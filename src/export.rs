//! Export side of the import/correlation protocol
//!
//! The host owns the transport (an HTTP route, an RPC method, ...). This
//! module turns a request path into the payload that transport should return:
//!
//! | request                         | response                                  |
//! |---------------------------------|-------------------------------------------|
//! | `.../export`                    | every buffered session, insertion order   |
//! | `...?correlationId=ID`          | list with the session answering `ID`      |
//! | anything else                   | plain-text listing of buffered sessions   |

use crate::circular_buffer::CircularBuffer;
use crate::error::Result;
use crate::remote::CORRELATION_QUERY_PARAM;
use crate::wire::encode_sessions;
use reqwest::Url;
use std::fmt::Write as _;
use std::sync::Arc;

/// Serialize the whole buffer
pub fn export_all(buffer: &CircularBuffer) -> Result<String> {
    encode_sessions(&buffer.snapshot())
}

/// Serialize the session answering `correlation_id`, if buffered
pub fn export_by_correlation_id(buffer: &CircularBuffer, correlation_id: &str) -> Result<Option<String>> {
    buffer
        .find_by_correlation_id(correlation_id)
        .map(|session| encode_sessions(&[session]))
        .transpose()
}

/// Parsed export endpoint request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportRequest {
    Export,
    Correlation(String),
    View,
}

impl ExportRequest {
    /// Classify a request path with optional query, e.g. `/profiler/view?correlationId=abc`
    pub fn parse(path_and_query: &str) -> Self {
        let Ok(url) = Url::parse("http://export.local/").and_then(|base| base.join(path_and_query))
        else {
            return Self::View;
        };

        if let Some((_, cid)) = url
            .query_pairs()
            .find(|(key, value)| key == CORRELATION_QUERY_PARAM && !value.is_empty())
        {
            return Self::Correlation(cid.into_owned());
        }

        let last_segment = url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()));
        let export_flag = url.query_pairs().any(|(key, _)| key == "export");
        if last_segment == Some("export") || export_flag {
            return Self::Export;
        }

        Self::View
    }

    pub fn respond(&self, buffer: &CircularBuffer) -> ExportResponse {
        let result = match self {
            Self::Export => export_all(buffer).map(ExportResponse::json),
            Self::Correlation(cid) => export_by_correlation_id(buffer, cid).map(|body| match body {
                Some(body) => ExportResponse::json(body),
                None => ExportResponse {
                    status: 404,
                    content_type: JSON,
                    body: "[]".to_string(),
                },
            }),
            Self::View => Ok(ExportResponse {
                status: 200,
                content_type: TEXT,
                body: render_listing(&buffer.snapshot()),
            }),
        };

        result.unwrap_or_else(|e| ExportResponse {
            status: 500,
            content_type: TEXT,
            body: e.to_string(),
        })
    }
}

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// Transport-neutral response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl ExportResponse {
    fn json(body: String) -> Self {
        Self {
            status: 200,
            content_type: JSON,
            body,
        }
    }
}

fn render_listing(sessions: &[Arc<crate::session::Session>]) -> String {
    let mut out = String::new();
    for session in sessions.iter().rev() {
        let _ = writeln!(
            out,
            "{}  {:>8}ms  {:<16}  {}  {}",
            session.started.format("%Y-%m-%d %H:%M:%S"),
            session.duration_ms(),
            session.machine_name,
            session.id(),
            session.name()
        );
    }
    out
}
