//! Repeated query and release must not grow the heap.
//!
//! Runs in its own test binary so the counting allocator only sees this
//! workload.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, Ordering};

use redlilium_sync::{DummyDriver, SyncContext, latest_timestamp, release};

struct CountingAllocator;

static LIVE_BYTES: AtomicIsize = AtomicIsize::new(0);

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            LIVE_BYTES.fetch_add(layout.size() as isize, Ordering::Relaxed);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        LIVE_BYTES.fetch_sub(layout.size() as isize, Ordering::Relaxed);
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

const CYCLES: usize = 1_000;

#[test]
fn test_query_release_cycles_do_not_leak() {
    let driver = Arc::new(DummyDriver::new());
    let ctx = SyncContext::with_driver(driver.clone());

    let mut merged = None;
    let mut timelines = Vec::new();
    for i in 0..4 {
        let timeline = ctx.timeline_create().unwrap();
        let fence = ctx.timeline_fence_create(timeline, &format!("leaf_{i}"), 1).unwrap();
        merged = Some(match merged {
            None => fence,
            Some(prev) => ctx.merge("leak", prev, fence).unwrap(),
        });
        timelines.push(timeline);
    }
    let merged = merged.unwrap();
    for &timeline in &timelines {
        ctx.timeline_advance(timeline, 1).unwrap();
    }

    // Warm up so lazily allocated state is in place before measuring.
    for _ in 0..16 {
        release(Some(ctx.query(merged).unwrap()));
    }

    let before = LIVE_BYTES.load(Ordering::Relaxed);
    for _ in 0..CYCLES {
        let info = ctx.query(merged).unwrap();
        assert_eq!(info.sub_fence_count(), 4);
        assert!(latest_timestamp(&info) > 0);
        release(Some(info));
    }
    let after = LIVE_BYTES.load(Ordering::Relaxed);

    assert_eq!(before, after, "live heap changed over {CYCLES} cycles");
}
