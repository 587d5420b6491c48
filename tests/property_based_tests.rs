//! Property-based tests for core capture and buffer invariants
//!
//! Designed to run in a few seconds as a pre-commit quality gate.

mod utils;

use proptest::prelude::*;
use std::sync::Arc;
use stepwatch::filter::parse_filter_expr;
use stepwatch::{wire, CircularBuffer, Clock, Session, Step, Timing, TimingType};
use utils::harness;

/// One scripted capture action
#[derive(Debug, Clone)]
enum Action {
    Open(u64),
    Close(u64),
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0u64..5).prop_map(Action::Open),
        (0u64..5).prop_map(Action::Close),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_step_tree_mirrors_open_order(actions in prop::collection::vec(action(), 0..40)) {
        // Property: parent links follow the stack of open steps, durations
        // equal close time minus open time, nothing overruns the session
        let h = harness(4);
        let profiler = h.settings.start("scripted", &[]);
        let mut open: Vec<(Step, u64)> = Vec::new();
        let mut expected = Vec::new();

        for (i, a) in actions.iter().enumerate() {
            match a {
                Action::Open(ms) => {
                    h.clock.advance(*ms);
                    let step = profiler.step(&format!("s{}", i)).unwrap();
                    let parent = open.last().and_then(|(s, _)| s.id()).or(profiler.id());
                    prop_assert_eq!(step.parent_id(), parent);
                    open.push((step, h.clock.now_ms()));
                }
                Action::Close(ms) => {
                    h.clock.advance(*ms);
                    if let Some((step, opened_at)) = open.pop() {
                        let id = step.id().unwrap();
                        step.finish();
                        expected.push((id, h.clock.now_ms() - opened_at));
                    }
                }
            }
        }
        while let Some((step, opened_at)) = open.pop() {
            let id = step.id().unwrap();
            step.finish();
            expected.push((id, h.clock.now_ms() - opened_at));
        }

        let session = profiler.stop().unwrap();
        prop_assert_eq!(session.timings.len(), expected.len());
        for (id, duration) in expected {
            prop_assert_eq!(session.timing(id).unwrap().duration_ms, duration);
        }
        prop_assert!(session.validate().is_empty());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_buffer_keeps_newest_in_order(capacity in 1usize..16, count in 0usize..64) {
        // Property: after N adds the buffer holds the last min(N, capacity)
        // sessions in insertion order
        let buffer = CircularBuffer::new(capacity);
        let sessions: Vec<Arc<Session>> = (0..count)
            .map(|i| Arc::new(Session::new(format!("s{}", i), "m")))
            .collect();
        for s in &sessions {
            buffer.add(s.clone());
        }

        let kept: Vec<_> = buffer.snapshot().iter().map(|s| s.id()).collect();
        let start = count.saturating_sub(capacity);
        let expected: Vec<_> = sessions[start..].iter().map(|s| s.id()).collect();
        prop_assert_eq!(kept, expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_wire_preserves_sessions(
        name in "[ -~]{1,40}",
        tags in prop::collection::btree_set("[a-z]{1,8}", 0..4),
        data in prop::collection::btree_map("[a-zA-Z]{1,10}", "\\PC{0,20}", 0..4),
        offsets in prop::collection::vec((0u64..10_000, 0u64..10_000), 0..8),
    ) {
        // Property: decode(encode(session)) == session for arbitrary content
        let mut session = Session::new(name, "machine");
        session.root.tags = tags;
        session.root.data = data.clone();
        for (offset, duration) in offsets {
            let mut t = Timing::new(TimingType::Step, "child")
                .with_parent(session.id())
                .with_offset(offset)
                .with_duration(duration);
            t.data = data.clone();
            session.timings.push(t);
        }

        let json = wire::encode_sessions(&[Arc::new(session.clone())]).unwrap();
        let decoded = wire::decode_sessions(json.as_bytes()).unwrap();
        prop_assert_eq!(decoded, vec![session]);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_filter_parsing_never_panics(expr in "\\PC{0,40}") {
        // Property: arbitrary expressions either parse or return an error
        if let Ok(filter) = parse_filter_expr(&expr) {
            let _ = filter.excludes("GET /", &Default::default());
        }
    }

    #[test]
    fn prop_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        // Property: malformed payloads are errors, not panics
        let _ = wire::decode_sessions(&bytes);
    }
}
