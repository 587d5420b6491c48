//! Integration tests for the import/correlation protocol
//!
//! Instances are wired together in-process: each one's buffer is mounted on a
//! loopback fetcher that answers through the same export request handling an
//! HTTP endpoint would use.
//!
//! # Test Coverage
//!
//! - Full-buffer import with deduplication by session id
//! - Drill-down from a caller's outbound timing to the callee's session
//! - Single-level fan-out (merged sessions are not descended into)
//! - Per-link failure isolation
//! - Concurrent imports of the same payload

mod utils;

use std::sync::Arc;
use std::thread;
use stepwatch::{Importer, Profiler, Session};
use utils::{harness, Harness, LoopbackFetcher};

/// Callee: captures a request that answers `correlation_id`
fn serve_request(instance: &Harness, name: &str, correlation_id: &str) -> Arc<Session> {
    let profiler = instance.settings.start(name, &["http"]);
    profiler.set_correlation_id(correlation_id);
    drop(profiler.step("handle").unwrap());
    profiler.stop().unwrap()
}

/// Caller side of an outbound call carrying `correlation_id` to `remote`
fn call_out(profiler: &Profiler, name: &str, correlation_id: &str, remote: &str) {
    let mut call = profiler.custom_step("http", name).unwrap();
    call.set_correlation(correlation_id, Some(remote));
}

#[test]
fn test_drill_down_merges_callee_session() {
    let web = harness(10);
    let orders = harness(10);
    let order_session = serve_request(&orders, "POST /orders", "c-1");

    let profiler = web.settings.start("GET /checkout", &[]);
    call_out(&profiler, "POST orders", "c-1", "http://orders/profiler/index.html");
    let checkout = profiler.stop().unwrap();

    let fetcher = LoopbackFetcher::new();
    fetcher.mount("orders", orders.buffer.clone());
    let importer = Importer::new(web.buffer.clone(), fetcher.clone());

    let report = importer.drill_down(checkout.id()).unwrap();
    assert_eq!(report.links, 1);
    assert_eq!(report.fetched, 1);
    assert_eq!(report.merged, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(
        fetcher.requests(),
        vec!["http://orders/profiler/view?correlationId=c-1"]
    );

    let merged = web.buffer.find_by_correlation_id("c-1").unwrap();
    assert_eq!(merged.id(), order_session.id());
    assert_eq!(merged.machine_name, order_session.machine_name);
    assert_eq!(merged.timings.len(), 1);

    // Answered locally now: no second fetch.
    let again = importer.drill_down(checkout.id()).unwrap();
    assert_eq!(again.already_present, 1);
    assert_eq!(fetcher.requests().len(), 1);
}

#[test]
fn test_import_dedups_repeated_pulls() {
    let web = harness(10);
    let orders = harness(10);
    for i in 0..3 {
        serve_request(&orders, &format!("POST /orders/{}", i), &format!("c-{}", i));
    }

    let fetcher = LoopbackFetcher::new();
    fetcher.mount("orders", orders.buffer.clone());
    let importer = Importer::new(web.buffer.clone(), fetcher);

    let first = importer.import("http://orders/profiler/export").unwrap();
    assert_eq!((first.fetched, first.added, first.skipped), (3, 3, 0));

    serve_request(&orders, "POST /orders/3", "c-3");
    let second = importer.import("http://orders/profiler/export").unwrap();
    assert_eq!((second.fetched, second.added, second.skipped), (4, 1, 3));

    let local: Vec<_> = web.buffer.snapshot().iter().map(|s| s.id()).collect();
    let remote: Vec<_> = orders.buffer.snapshot().iter().map(|s| s.id()).collect();
    assert_eq!(local, remote);
}

#[test]
fn test_drill_down_is_single_level() {
    let web = harness(10);
    let orders = harness(10);
    let catalog = harness(10);
    serve_request(&catalog, "GET /items", "c-2");

    let order_profiler = orders.settings.start("POST /orders", &[]);
    order_profiler.set_correlation_id("c-1");
    call_out(&order_profiler, "GET items", "c-2", "http://catalog/profiler");
    let order_session = order_profiler.stop().unwrap();

    let profiler = web.settings.start("GET /checkout", &[]);
    call_out(&profiler, "POST orders", "c-1", "http://orders/profiler");
    let checkout = profiler.stop().unwrap();

    let fetcher = LoopbackFetcher::new();
    fetcher.mount("orders", orders.buffer.clone());
    fetcher.mount("catalog", catalog.buffer.clone());
    let importer = Importer::new(web.buffer.clone(), fetcher.clone());

    let report = importer.drill_down(checkout.id()).unwrap();
    assert_eq!(report.merged, 1);
    assert!(fetcher.requests().iter().all(|r| r.contains("//orders/")));
    assert!(!web.buffer.contains_correlation_id("c-2"));

    // The merged session is drillable on its own.
    let next = importer.drill_down(order_session.id()).unwrap();
    assert_eq!(next.merged, 1);
    assert!(web.buffer.contains_correlation_id("c-2"));
}

#[test]
fn test_failed_links_do_not_abort_drill_down() {
    let web = harness(10);
    let orders = harness(10);
    serve_request(&orders, "POST /orders", "c-ok");

    let profiler = web.settings.start("GET /checkout", &[]);
    call_out(&profiler, "unknown id", "c-missing", "http://orders/profiler");
    call_out(&profiler, "instance down", "c-down", "http://billing/profiler");
    call_out(&profiler, "POST orders", "c-ok", "http://orders/profiler");
    let checkout = profiler.stop().unwrap();

    let fetcher = LoopbackFetcher::new();
    fetcher.mount("orders", orders.buffer.clone());
    let report = Importer::new(web.buffer.clone(), fetcher.clone())
        .drill_down(checkout.id())
        .unwrap();

    assert_eq!(report.links, 3);
    assert_eq!(report.failed, 2);
    assert_eq!(report.fetched, 1);
    assert_eq!(report.merged, 1);
    assert_eq!(fetcher.requests().len(), 3);
    assert!(web.buffer.contains_correlation_id("c-ok"));
}

#[test]
fn test_concurrent_imports_add_each_session_once() {
    let web = harness(100);
    let orders = harness(100);
    for i in 0..20 {
        serve_request(&orders, &format!("job {}", i), &format!("c-{}", i));
    }

    let fetcher = LoopbackFetcher::new();
    fetcher.mount("orders", orders.buffer.clone());
    let importer = Importer::new(web.buffer.clone(), fetcher);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let importer = importer.clone();
            thread::spawn(move || importer.import("http://orders/export").unwrap().added)
        })
        .collect();
    let added: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(added, 20);
    assert_eq!(web.buffer.len(), 20);
}
