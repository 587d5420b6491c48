//! Remote session fetch and correlation addressing
//!
//! The import protocol only needs "fetch bytes from URL with a timeout".
//! [`HttpFetcher`] provides that over HTTP; hosts with their own transport
//! implement [`RemoteFetcher`].
//!
//! # Addressing
//!
//! A timing that calls into another instance carries a correlation id and,
//! ideally, the remote profiler's base address:
//!
//! ```text
//! data["remoteAddress"] = "http://orders:8080/profiler/index.html?x=1"
//!                       → base  http://orders:8080/profiler
//!                       → fetch http://orders:8080/profiler/view?correlationId=<id>
//! ```
//!
//! Without `remoteAddress`, the timing name is used when it is an absolute
//! http(s) URL.

use crate::error::{ProfilerError, Result};
use crate::timing::Timing;
use anyhow::{anyhow, Context};
use reqwest::Url;
use std::time::Duration;

/// Per-call timeout used when none is configured
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Query parameter naming the requested correlation id
pub const CORRELATION_QUERY_PARAM: &str = "correlationId";

/// Path segment of the correlation-scoped view
pub const VIEW_SEGMENT: &str = "view";

/// Fetch raw bytes from a URL
pub trait RemoteFetcher: Send + Sync {
    fn fetch(&self, url: &str, timeout: Duration) -> anyhow::Result<Vec<u8>>;
}

/// Blocking HTTP fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("stepwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(DEFAULT_FETCH_TIMEOUT)
            .build()
            .map_err(|e| ProfilerError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl RemoteFetcher for HttpFetcher {
    fn fetch(&self, url: &str, timeout: Duration) -> anyhow::Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .with_context(|| format!("GET {}", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("GET {} returned {}", url, status));
        }

        Ok(response.bytes()?.to_vec())
    }
}

fn parse_http_url(candidate: &str) -> Option<Url> {
    Url::parse(candidate.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}

/// Normalize an address to a profiler base: no query, no fragment, no
/// trailing file-like segment, no trailing slash
pub fn normalize_base(address: &str) -> Option<String> {
    let mut url = parse_http_url(address)?;
    url.set_query(None);
    url.set_fragment(None);

    let last_is_file = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .is_some_and(|last| last.contains('.'));
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty();
        if last_is_file {
            segments.pop();
        }
    }

    Some(url.as_str().trim_end_matches('/').to_string())
}

/// Remote profiler base for a correlated timing, if one can be derived
pub fn remote_base(timing: &Timing) -> Option<String> {
    match timing.remote_address() {
        Some(addr) => normalize_base(addr),
        None => parse_http_url(&timing.name).and_then(|url| normalize_base(url.as_str())),
    }
}

/// Correlation-scoped view URL: `<base>/view?correlationId=<id>`
pub fn remote_view_url(base: &str, correlation_id: &str) -> Result<String> {
    let mut url = parse_http_url(base)
        .ok_or_else(|| ProfilerError::invalid_argument(format!("not an http(s) URL: {}", base)))?;
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| ProfilerError::invalid_argument(format!("not a base URL: {}", base)))?
        .pop_if_empty()
        .push(VIEW_SEGMENT);
    url.query_pairs_mut()
        .append_pair(CORRELATION_QUERY_PARAM, correlation_id);
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::{TimingType, REMOTE_ADDRESS_KEY};

    #[test]
    fn test_normalize_strips_query_and_file() {
        assert_eq!(
            normalize_base("http://orders:8080/profiler/index.html?x=1#top").as_deref(),
            Some("http://orders:8080/profiler")
        );
        assert_eq!(
            normalize_base("https://svc/api/v1/").as_deref(),
            Some("https://svc/api/v1")
        );
        assert_eq!(normalize_base("http://svc").as_deref(), Some("http://svc"));
    }

    #[test]
    fn test_normalize_rejects_non_http() {
        assert!(normalize_base("ftp://files/x").is_none());
        assert!(normalize_base("load orders").is_none());
        assert!(normalize_base("/relative/path").is_none());
    }

    #[test]
    fn test_remote_base_prefers_explicit_address() {
        let timing = Timing::new(TimingType::Custom, "http://gateway/api/orders")
            .with_data(REMOTE_ADDRESS_KEY, "http://orders/profiler/");
        assert_eq!(remote_base(&timing).as_deref(), Some("http://orders/profiler"));
    }

    #[test]
    fn test_remote_base_falls_back_to_name() {
        let timing = Timing::new(TimingType::Custom, "http://orders/api/list.json?page=2");
        assert_eq!(remote_base(&timing).as_deref(), Some("http://orders/api"));
        let plain = Timing::new(TimingType::Step, "compute totals");
        assert!(remote_base(&plain).is_none());
    }

    #[test]
    fn test_remote_view_url_encodes_id() {
        assert_eq!(
            remote_view_url("http://orders/profiler", "a b&c").unwrap(),
            "http://orders/profiler/view?correlationId=a+b%26c"
        );
        assert_eq!(
            remote_view_url("http://orders", "x").unwrap(),
            "http://orders/view?correlationId=x"
        );
        assert!(remote_view_url("not a url", "x").is_err());
    }

    #[test]
    fn test_http_fetcher_builds() {
        assert!(HttpFetcher::new().is_ok());
    }
}
