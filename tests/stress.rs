//! Randomized alloc/free/coalesce stress testing, biased the way a real
//! workload behaves: mostly small churn around a target working set, with
//! occasional large requests and an occasional full reset.

use offset_alloc::{Allocation, Allocator};

const SEEDS: &[u64] = &[1, 2, 3, 42, 1337, 0xC0FFEE, 987_654_321];
const TARGET_LIVE: usize = 400;
const STEPS: usize = 8_000;

#[test]
fn randomized_sessions_never_violate_invariants() {
    for &seed in SEEDS {
        run_session(seed);
    }
}

fn run_session(seed: u64) {
    let capacity = 1 << 20;
    let mut alloc = Allocator::with_max_allocations(capacity, 2048);
    let rng = fastrand::Rng::with_seed(seed);

    let mut live: Vec<(Allocation, u32)> = Vec::new();
    let mut live_bytes: u64 = 0;

    for step in 0..STEPS {
        // Bias away from both extremes: mostly allocate while under the
        // target working set, mostly free once over it, and throw in a
        // reset every so often to exercise that path too.
        if step % 1500 == 1499 {
            alloc.reset();
            live.clear();
            live_bytes = 0;
            continue;
        }

        let should_allocate = live.is_empty() || (live.len() < TARGET_LIVE && rng.bool());
        if should_allocate {
            let size = rng.u32(1..=8192);
            let allocation = alloc.allocate(size);
            if allocation.is_valid() {
                assert_eq!(alloc.size_of(allocation), size);
                live_bytes += size as u64;
                live.push((allocation, size));
            }
        } else {
            let index = rng.usize(0..live.len());
            let (allocation, size) = live.swap_remove(index);
            live_bytes -= size as u64;
            alloc.free(allocation);
        }

        let report = alloc.report();
        assert!(report.largest_free_region <= report.total_free_space);
        assert_eq!(report.total_free_space as u64 + live_bytes, capacity as u64);

        if step % 200 == 0 {
            alloc.validate();
            check_no_overlaps(&live);
        }
    }

    for (allocation, size) in live.drain(..) {
        alloc.free(allocation);
        let _ = size;
    }
    let report = alloc.report();
    assert_eq!(report.total_free_space, capacity);
    assert_eq!(report.largest_free_region, capacity);
    alloc.validate();
}

/// Confirms no two simultaneously-live allocations overlap in byte range,
/// by resolving each handle's current size through `size_of` and sorting.
fn check_no_overlaps(live: &[(Allocation, u32)]) {
    let mut spans: Vec<(u32, u32)> =
        live.iter().map(|(allocation, size)| (allocation.offset, allocation.offset + size)).collect();
    spans.sort_unstable();
    for window in spans.windows(2) {
        assert!(window[0].1 <= window[1].0, "overlapping live spans {:?} and {:?}", window[0], window[1]);
    }
}

#[test]
fn double_reset_is_idempotent() {
    let mut alloc = Allocator::new(4096);
    let _ = alloc.allocate(128);
    alloc.reset();
    let after_first = alloc.report();
    alloc.reset();
    let after_second = alloc.report();
    assert_eq!(after_first, after_second);
}

#[test]
fn allocate_free_round_trip_restores_report() {
    let mut alloc = Allocator::new(65536);
    let before = alloc.report();

    let mut held = Vec::new();
    for size in [64u32, 4096, 1, 31337, 200] {
        held.push(alloc.allocate(size));
    }
    for allocation in held.into_iter().rev() {
        alloc.free(allocation);
    }

    assert_eq!(alloc.report(), before);
}

#[test]
fn best_fit_search_skips_a_too_small_region_for_a_larger_one() {
    // Carve a capacity-1024 range down to exactly two non-adjacent free
    // regions: a 400-byte hole and a 100-byte tail, then confirm a request
    // of 350 is satisfied from the 400-byte hole rather than failing
    // because the 100-byte region is probed first and is too small.
    let mut alloc = Allocator::with_max_allocations(1024, 16);
    let a = alloc.allocate(100);
    let b = alloc.allocate(400);
    let c = alloc.allocate(424); // 100 + 400 + 424 = 924, leaving a 100-byte tail
    assert!(a.is_valid() && b.is_valid() && c.is_valid());
    alloc.free(b);
    let fits_in_the_big_hole = alloc.allocate(350);
    assert!(fits_in_the_big_hole.is_valid());
    alloc.validate();
}
