//! Session filtering
//!
//! Filters decide whether a session is excluded, either from capture (checked
//! at `Profiler::start`) or from persistence (checked at `Profiler::stop`).
//! A [`FilterSet`] combines filters with logical OR: a session is excluded as
//! soon as any filter matches its name or one of its tags.
//!
//! Filter expressions (as used by [`crate::Registry`] and the config):
//! - `contains:TEXT` - case-insensitive substring
//! - `pattern:REGEX` - compiled regular expression
//! - `all`           - exclude unconditionally

use crate::error::{ProfilerError, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

/// Predicate over a session's name and tags
pub trait SessionFilter: Send + Sync + Debug {
    fn excludes(&self, name: &str, tags: &BTreeSet<String>) -> bool;
}

/// Case-insensitive substring match on the name or any tag
#[derive(Debug, Clone)]
pub struct ContainsFilter {
    needle: String,
}

impl ContainsFilter {
    pub fn new(needle: &str) -> Self {
        Self {
            needle: needle.to_lowercase(),
        }
    }
}

impl SessionFilter for ContainsFilter {
    fn excludes(&self, name: &str, tags: &BTreeSet<String>) -> bool {
        if self.needle.is_empty() {
            return false;
        }
        std::iter::once(name)
            .chain(tags.iter().map(String::as_str))
            .any(|candidate| candidate.to_lowercase().contains(&self.needle))
    }
}

/// Regular-expression match on the name or any tag
#[derive(Debug, Clone)]
pub struct PatternFilter {
    regex: Regex,
}

impl PatternFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| ProfilerError::InvalidFilter(format!("{}: {}", pattern, e)))?;
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl SessionFilter for PatternFilter {
    fn excludes(&self, name: &str, tags: &BTreeSet<String>) -> bool {
        self.regex.is_match(name) || tags.iter().any(|t| self.regex.is_match(t))
    }
}

/// Excludes every session
#[derive(Debug, Clone, Copy, Default)]
pub struct ExcludeAll;

impl SessionFilter for ExcludeAll {
    fn excludes(&self, _name: &str, _tags: &BTreeSet<String>) -> bool {
        true
    }
}

/// Adapter for closure predicates
pub struct FnFilter<F>(pub F);

impl<F> Debug for FnFilter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnFilter")
    }
}

impl<F> SessionFilter for FnFilter<F>
where
    F: Fn(&str, &BTreeSet<String>) -> bool + Send + Sync,
{
    fn excludes(&self, name: &str, tags: &BTreeSet<String>) -> bool {
        (self.0)(name, tags)
    }
}

/// Parse a filter expression such as `contains:/health` or `pattern:^GET /static/`
pub fn parse_filter_expr(expr: &str) -> Result<Arc<dyn SessionFilter>> {
    let expr = expr.trim();
    if expr == "all" {
        return Ok(Arc::new(ExcludeAll));
    }
    match expr.split_once(':') {
        Some(("contains", needle)) if !needle.is_empty() => Ok(Arc::new(ContainsFilter::new(needle))),
        Some(("pattern", pattern)) if !pattern.is_empty() => Ok(Arc::new(PatternFilter::new(pattern)?)),
        _ => Err(ProfilerError::InvalidFilter(format!(
            "{}. Expected one of: contains:TEXT, pattern:REGEX, all",
            expr
        ))),
    }
}

/// OR-combination of filters; empty set excludes nothing
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<Arc<dyn SessionFilter>>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from filter expressions
    pub fn from_exprs<S: AsRef<str>>(exprs: &[S]) -> Result<Self> {
        let filters = exprs
            .iter()
            .map(|e| parse_filter_expr(e.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { filters })
    }

    pub fn push(&mut self, filter: Arc<dyn SessionFilter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn excludes(&self, name: &str, tags: &BTreeSet<String>) -> bool {
        self.filters.iter().any(|f| f.excludes(name, tags))
    }
}
