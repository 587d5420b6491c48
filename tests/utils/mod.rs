// Shared helpers for integration tests
//
// Each test binary pulls in what it needs; not every helper is used everywhere.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stepwatch::storage::MemorySink;
use stepwatch::timing::{CORRELATION_ID_KEY, REMOTE_ADDRESS_KEY};
use stepwatch::{
    CircularBuffer, ExportRequest, FlowContext, ManualClock, QueueMode, RemoteFetcher, Session,
    Settings, StoragePipeline, Timing, TimingType,
};

/// Settings on a manual clock and an explicit flow, publishing inline to
/// a memory sink and a buffer of `capacity`
pub struct Harness {
    pub settings: Settings,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<MemorySink>,
    pub buffer: Arc<CircularBuffer>,
}

pub fn harness(capacity: usize) -> Harness {
    let clock = Arc::new(ManualClock::new());
    let sink = Arc::new(MemorySink::new());
    let buffer = Arc::new(CircularBuffer::new(capacity));
    let settings = Settings::new()
        .with_machine_name("test-host")
        .with_clock(clock.clone())
        .with_context(FlowContext::new())
        .with_storage(Arc::new(StoragePipeline::new(sink.clone(), QueueMode::Inline)))
        .with_buffer(buffer.clone());
    Harness {
        settings,
        clock,
        sink,
        buffer,
    }
}

/// Session answering `correlation_id`, as a remote instance would export it
pub fn answering_session(name: &str, machine: &str, correlation_id: &str) -> Session {
    let mut session = Session::new(name, machine);
    session
        .root
        .data
        .insert(CORRELATION_ID_KEY.to_string(), correlation_id.to_string());
    session
}

/// Custom timing that calls `remote` under `correlation_id`
pub fn outbound_call(parent: &Session, name: &str, correlation_id: &str, remote: &str) -> Timing {
    Timing::new(TimingType::Custom, name)
        .with_parent(parent.id())
        .with_data(CORRELATION_ID_KEY, correlation_id)
        .with_data(REMOTE_ADDRESS_KEY, remote)
}

/// Fetcher serving canned bodies by URL and recording each request
#[derive(Default)]
pub struct StubFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.into());
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| *r == url).count()
    }
}

impl RemoteFetcher for StubFetcher {
    fn fetch(&self, url: &str, _timeout: Duration) -> anyhow::Result<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("503 Service Unavailable"))
    }
}

/// Fetcher answering from in-process buffers keyed by host, through the
/// export request handling a real instance would run
#[derive(Default)]
pub struct LoopbackFetcher {
    instances: Mutex<HashMap<String, Arc<CircularBuffer>>>,
    requests: Mutex<Vec<String>>,
}

impl LoopbackFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mount(&self, host: &str, buffer: Arc<CircularBuffer>) {
        self.instances
            .lock()
            .unwrap()
            .insert(host.to_string(), buffer);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl RemoteFetcher for LoopbackFetcher {
    fn fetch(&self, url: &str, _timeout: Duration) -> anyhow::Result<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        let parsed = reqwest::Url::parse(url)?;
        let host = parsed.host_str().unwrap_or_default().to_string();
        let buffer = self
            .instances
            .lock()
            .unwrap()
            .get(&host)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("connection refused: {}", host))?;

        let path_and_query = match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        };
        let response = ExportRequest::parse(&path_and_query).respond(&buffer);
        if response.status != 200 {
            anyhow::bail!("GET {} returned {}", url, response.status);
        }
        Ok(response.body.into_bytes())
    }
}
