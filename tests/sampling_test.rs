//! Sampling integration: a disabled tracer must cost nothing.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::sync::Arc;

use trace_bench::pipeline::{connect, DispatchConfig, MemFs, Op, Sampler};
use trace_bench::trace::SpanCollector;

// =============================================================================
// Counting allocator (per thread, so parallel tests do not interfere)
// =============================================================================

struct CountingAlloc;

thread_local! {
    static ALLOCATIONS: Cell<u64> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = ALLOCATIONS.try_with(|c| c.set(c.get() + 1));
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAlloc = CountingAlloc;

fn allocations() -> u64 {
    ALLOCATIONS.with(|c| c.get())
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn disabled_sampler_never_allocates() {
    let collector = Arc::new(SpanCollector::new(None));
    let sampler = Sampler::new(0, Some(collector.clone()));

    let before = allocations();
    let mut traced = 0u32;
    for id in 0..10_000u64 {
        if sampler.begin(id).is_some() {
            traced += 1;
        }
    }
    let after = allocations();

    assert_eq!(traced, 0);
    assert_eq!(after - before, 0);
    assert!(collector.summary().is_none());
}

#[test]
fn sampler_without_collector_never_allocates() {
    let sampler = Sampler::new(1, None);
    let before = allocations();
    assert!((0..10_000u64).all(|id| sampler.begin(id).is_none()));
    assert_eq!(allocations() - before, 0);
}

#[tokio::test]
async fn rate_zero_pipeline_records_nothing() {
    let collector = Arc::new(SpanCollector::new(None));
    let client = connect(
        DispatchConfig {
            reader_pool_size: 4,
            queue_depth: 64,
            trace_rate: 0,
            collector: Some(collector.clone()),
        },
        Arc::new(MemFs::new()),
    );

    for _ in 0..10_000 {
        client
            .call(&Op::GetAttr {
                path: "/missing".into(),
            })
            .await
            .unwrap();
    }

    assert_eq!(client.issued(), 10_000);
    assert!(collector.summary().is_none());
    assert!(collector.summary_json().is_none());
    assert_eq!(collector.stats().recorded, 0);
}

#[tokio::test]
async fn every_nth_request_is_traced() {
    let collector = Arc::new(SpanCollector::new(None));
    let client = connect(
        DispatchConfig {
            reader_pool_size: 3,
            queue_depth: 64,
            trace_rate: 10,
            collector: Some(collector.clone()),
        },
        Arc::new(MemFs::new()),
    );

    for _ in 0..1_000 {
        client
            .call(&Op::GetAttr { path: "/x".into() })
            .await
            .unwrap();
    }

    let summary = collector.summary().unwrap();
    assert_eq!(summary.count, 100);
    assert_eq!(collector.stats().malformed, 0);
}

#[tokio::test]
async fn strided_sampling_keeps_the_full_retention_window() {
    let collector = Arc::new(SpanCollector::new(Some(160)));
    let client = connect(
        DispatchConfig {
            reader_pool_size: 4,
            queue_depth: 64,
            trace_rate: 16,
            collector: Some(collector.clone()),
        },
        Arc::new(MemFs::new()),
    );

    for _ in 0..2_560 {
        client
            .call(&Op::GetAttr { path: "/x".into() })
            .await
            .unwrap();
    }

    let stats = collector.stats();
    assert_eq!(stats.capacity, 160);
    assert_eq!(stats.recorded, 160);
    assert_eq!(stats.retained, 160);
    assert_eq!(stats.evicted, 0);
}
