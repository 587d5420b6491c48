//! String-tag registry for sinks and filters
//!
//! Configuration refers to sinks and filters by stable expressions such as
//! `json-dir:/var/lib/stepwatch` or `contains:/health`. The registry turns
//! those into instances. Built-in kinds are always available; hosts register
//! their own kinds at startup, and a registered kind shadows a built-in one.
//!
//! Built-in sink kinds: `memory`, `null`, `json-dir:PATH`.
//! Built-in filter kinds: `contains:TEXT`, `pattern:REGEX`, `all`.

use crate::error::{ProfilerError, Result};
use crate::filter::{parse_filter_expr, FilterSet, SessionFilter};
use crate::storage::{JsonDirSink, MemorySink, NullSink, SessionSink};
use std::collections::HashMap;
use std::sync::Arc;

type SinkFactory = Box<dyn Fn(&str) -> Result<Arc<dyn SessionSink>> + Send + Sync>;
type FilterFactory = Box<dyn Fn(&str) -> Result<Arc<dyn SessionFilter>> + Send + Sync>;

#[derive(Default)]
pub struct Registry {
    sinks: HashMap<String, SinkFactory>,
    filters: HashMap<String, FilterFactory>,
}

impl Registry {
    /// Registry with only the built-in kinds
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink kind; the factory receives the text after `kind:` (or "")
    pub fn register_sink<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&str) -> Result<Arc<dyn SessionSink>> + Send + Sync + 'static,
    {
        self.sinks.insert(kind.to_string(), Box::new(factory));
    }

    pub fn register_filter<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&str) -> Result<Arc<dyn SessionFilter>> + Send + Sync + 'static,
    {
        self.filters.insert(kind.to_string(), Box::new(factory));
    }

    pub fn build_sink(&self, expr: &str) -> Result<Arc<dyn SessionSink>> {
        let (kind, arg) = split_expr(expr);
        if let Some(factory) = self.sinks.get(kind) {
            return factory(arg);
        }
        match kind {
            "memory" => Ok(Arc::new(MemorySink::new())),
            "null" => Ok(Arc::new(NullSink)),
            "json-dir" if !arg.is_empty() => Ok(Arc::new(JsonDirSink::new(arg)?)),
            "json-dir" => Err(ProfilerError::InvalidConfig(
                "json-dir sink needs a directory: json-dir:PATH".to_string(),
            )),
            _ => Err(ProfilerError::UnknownRegistryTag(expr.to_string())),
        }
    }

    pub fn build_filter(&self, expr: &str) -> Result<Arc<dyn SessionFilter>> {
        let (kind, arg) = split_expr(expr);
        match self.filters.get(kind) {
            Some(factory) => factory(arg),
            None => parse_filter_expr(expr),
        }
    }

    pub fn build_filters<S: AsRef<str>>(&self, exprs: &[S]) -> Result<FilterSet> {
        let mut set = FilterSet::new();
        for expr in exprs {
            set.push(self.build_filter(expr.as_ref())?);
        }
        Ok(set)
    }

    /// Registered (non built-in) sink kinds
    pub fn sink_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.sinks.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut filters: Vec<&String> = self.filters.keys().collect();
        filters.sort_unstable();
        f.debug_struct("Registry")
            .field("sinks", &self.sink_kinds())
            .field("filters", &filters)
            .finish()
    }
}

fn split_expr(expr: &str) -> (&str, &str) {
    let expr = expr.trim();
    expr.split_once(':').unwrap_or((expr, ""))
}
