//! Stock session sinks

use crate::circular_buffer::CircularBuffer;
use crate::error::Result;
use crate::session::Session;
use crate::storage::SessionSink;
use anyhow::Context;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Keeps every saved session in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    sessions: Mutex<Vec<Arc<Session>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saved sessions in save order
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionSink for MemorySink {
    fn save(&self, session: &Arc<Session>) -> anyhow::Result<()> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session.clone());
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl SessionSink for NullSink {
    fn save(&self, _session: &Arc<Session>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes one pretty-printed `<session id>.json` file per session
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    dir: PathBuf,
}

impl JsonDirSink {
    /// Create the sink, creating `dir` if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session: &Session) -> PathBuf {
        self.dir.join(format!("{}.json", session.id()))
    }
}

impl SessionSink for JsonDirSink {
    fn save(&self, session: &Arc<Session>) -> anyhow::Result<()> {
        let path = self.path_for(session);
        // Write to a sibling temp file first so readers never see a partial file.
        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, session.as_ref())?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path).with_context(|| format!("renaming to {}", path.display()))?;
        Ok(())
    }
}

/// Saves into a circular buffer (e.g. a second, longer history)
#[derive(Debug, Clone)]
pub struct BufferSink {
    buffer: Arc<CircularBuffer>,
}

impl BufferSink {
    pub fn new(buffer: Arc<CircularBuffer>) -> Self {
        Self { buffer }
    }
}

impl SessionSink for BufferSink {
    fn save(&self, session: &Arc<Session>) -> anyhow::Result<()> {
        self.buffer.add(session.clone());
        Ok(())
    }
}

/// Adapter for closure sinks
pub struct FnSink<F> {
    save: F,
}

impl<F> FnSink<F>
where
    F: Fn(&Arc<Session>) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(save: F) -> Self {
        Self { save }
    }
}

impl<F> SessionSink for FnSink<F>
where
    F: Fn(&Arc<Session>) -> anyhow::Result<()> + Send + Sync,
{
    fn save(&self, session: &Arc<Session>) -> anyhow::Result<()> {
        (self.save)(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        let a = Arc::new(Session::new("a", "h"));
        let b = Arc::new(Session::new("b", "h"));
        sink.save(&a).unwrap();
        sink.save(&b).unwrap();
        let names: Vec<_> = sink.sessions().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_json_dir_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonDirSink::new(dir.path().join("sessions")).unwrap();
        let session = Arc::new(Session::new("GET /", "web-01"));
        sink.save(&session).unwrap();

        let path = sink.path_for(&session);
        let text = fs::read_to_string(&path).unwrap();
        let decoded: Session = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, *session);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_buffer_sink() {
        let buffer = Arc::new(CircularBuffer::new(2));
        let sink = BufferSink::new(buffer.clone());
        sink.save(&Arc::new(Session::new("a", "h"))).unwrap();
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_null_sink() {
        assert!(NullSink.save(&Arc::new(Session::new("a", "h"))).is_ok());
    }
}
