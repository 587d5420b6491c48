//! Text output for captured sessions
//!
//! Renders a session as an indented timing tree:
//!
//! ```text
//! GET /checkout  [web-01]  2026-10-18 09:12:44 UTC  id=...
//!   42ms  +0ms   GET /checkout
//!   30ms  +3ms     load cart
//!    9ms  +8ms       GET inventory (custom: http)  corr=c1
//! ```

use crate::session::Session;
use crate::timing::{Timing, TimingId, TimingType};
use std::collections::HashSet;
use std::fmt::Write as _;

/// Render one session as a timing tree
pub fn render_session(session: &Session) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}  [{}]  {}  id={}",
        session.name(),
        session.machine_name,
        session.started.format("%Y-%m-%d %H:%M:%S UTC"),
        session.id()
    );
    if let Some(cid) = session.correlation_id() {
        let _ = writeln!(out, "correlation: {}", cid);
    }

    write_line(&mut out, &session.root, 0);
    let mut visited = HashSet::new();
    write_children(&mut out, session, session.id(), 1, &mut visited);

    // Timings whose parent is missing would otherwise vanish from the tree.
    let orphans: Vec<&Timing> = session
        .timings
        .iter()
        .filter(|t| !visited.contains(&t.id))
        .collect();
    if !orphans.is_empty() {
        let _ = writeln!(out, "  (unattached)");
        for timing in orphans {
            write_line(&mut out, timing, 2);
        }
    }
    out
}

/// Render sessions separated by a blank line
pub fn render_sessions<'a>(sessions: impl IntoIterator<Item = &'a Session>) -> String {
    sessions
        .into_iter()
        .map(render_session)
        .collect::<Vec<_>>()
        .join("\n")
}

fn write_children(
    out: &mut String,
    session: &Session,
    parent: TimingId,
    depth: usize,
    visited: &mut HashSet<TimingId>,
) {
    for child in session.children_of(parent) {
        if !visited.insert(child.id) {
            continue;
        }
        write_line(out, child, depth);
        write_children(out, session, child.id, depth + 1, visited);
    }
}

fn write_line(out: &mut String, timing: &Timing, depth: usize) {
    let _ = write!(
        out,
        "{:>6}ms  +{:<6}  {}{}",
        timing.duration_ms,
        format!("{}ms", timing.start_offset_ms),
        "  ".repeat(depth),
        timing.name
    );
    if timing.timing_type == TimingType::Custom {
        let category = timing.data.get(crate::timing::CATEGORY_KEY).map(String::as_str);
        let _ = write!(out, " (custom: {})", category.unwrap_or("-"));
    }
    if !timing.tags.is_empty() {
        let tags: Vec<&str> = timing.tags.iter().map(String::as_str).collect();
        let _ = write!(out, "  [{}]", tags.join(","));
    }
    if timing.timing_type != TimingType::Session {
        if let Some(cid) = timing.correlation_id() {
            let _ = write!(out, "  corr={}", cid);
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::{CATEGORY_KEY, CORRELATION_ID_KEY};

    fn sample() -> Session {
        let mut session = Session::new("GET /checkout", "web-01");
        session.root.duration_ms = 42;
        let root = session.id();
        let cart = Timing::new(TimingType::Step, "load cart")
            .with_parent(root)
            .with_offset(3)
            .with_duration(30);
        let call = Timing::new(TimingType::Custom, "GET inventory")
            .with_parent(cart.id)
            .with_offset(8)
            .with_duration(9)
            .with_data(CATEGORY_KEY, "http")
            .with_data(CORRELATION_ID_KEY, "c1");
        session.timings.push(call);
        session.timings.push(cart);
        session
    }

    #[test]
    fn test_tree_indents_by_depth() {
        let text = render_session(&sample());
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("GET /checkout  [web-01]"));
        assert!(lines[1].ends_with("  GET /checkout"));
        assert!(lines[2].contains("    load cart"));
        assert!(lines[3].contains("      GET inventory (custom: http)  corr=c1"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_orphans_are_listed() {
        let mut session = sample();
        session
            .timings
            .push(Timing::new(TimingType::Step, "stray").with_parent(TimingId::new()));
        let text = render_session(&session);
        assert!(text.contains("(unattached)"));
        assert!(text.contains("stray"));
    }

    #[test]
    fn test_render_many() {
        let a = Session::new("a", "m");
        let b = Session::new("b", "m");
        let text = render_sessions([&a, &b]);
        assert!(text.contains("\n\nb  [m]"));
        assert!(text.starts_with("a  [m]"));
    }
}
