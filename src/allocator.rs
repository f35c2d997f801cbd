//! The core allocator: node pool, bin directory, and the allocate/free/
//! coalesce operations built on top of them.

use alloc::vec::Vec;

use crate::directory::Directory;
use crate::node::{Node, INVALID};
use crate::quantize::{bin_index_to_min_size, quantize_round_down, quantize_round_up};
use crate::{BIN_COUNT, LEAF_BINS_PER_TOP_BIN, NO_SPACE, TOP_BIN_COUNT};

#[cfg(feature = "counters")]
use crate::counters::Counters;

use crate::error::AllocError;

/// A handle to a live allocation, returned by [`Allocator::allocate`].
///
/// `offset` is the position of the allocated region within the managed
/// range; `metadata` is an opaque internal handle that must be passed back
/// to [`Allocator::free`] and [`Allocator::size_of`] unchanged. Neither
/// field should be interpreted beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub offset: u32,
    pub metadata: u32,
}

impl Allocation {
    /// The canonical failure value: both fields set to [`crate::NO_SPACE`].
    pub const NO_SPACE: Allocation = Allocation { offset: NO_SPACE, metadata: NO_SPACE };

    /// Whether this allocation represents a real, freeable region.
    pub fn is_valid(&self) -> bool {
        self.metadata != NO_SPACE
    }
}

impl Default for Allocation {
    fn default() -> Self {
        Allocation::NO_SPACE
    }
}

/// A coarse snapshot of free space: total and the single largest
/// contiguous region. Cheap to compute (a couple of bit-scans), suitable
/// for calling every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageReport {
    pub total_free_space: u32,
    pub largest_free_region: u32,
}

/// The free-region count filed under a single bin, as returned by
/// [`Allocator::report_full`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BinReport {
    pub size: u32,
    pub count: u32,
}

/// A full per-bin breakdown of free space. Walks every bin's free list, so
/// it's not free: reach for [`Allocator::report`] instead unless you need
/// the fragmentation histogram.
#[derive(Debug, Clone, Copy)]
pub struct StorageReportFull {
    pub per_bin: [BinReport; BIN_COUNT],
}

/// A fixed-size linear range with O(1) best-fit sub-allocation.
///
/// `Allocator` owns no backing memory of its own: it only tracks which
/// sub-ranges of `0..size` are free, handing back `(offset, size)` pairs
/// for the caller's own buffer. It is not `Sync`-safe to share without
/// external synchronization (see the crate documentation).
pub struct Allocator {
    size: u32,
    max_allocations: u32,
    free_storage: u32,

    directory: Directory,
    nodes: Vec<Node>,
    free_nodes: Vec<u32>,
    /// Count of valid entries in `free_nodes[0..free_offset]`. Empty stack
    /// iff zero, full iff equal to `max_allocations`.
    free_offset: u32,

    #[cfg(feature = "counters")]
    counters: Counters,
}

impl Allocator {
    /// Creates an allocator over `0..size` with room for
    /// [`crate::DEFAULT_MAX_ALLOCATIONS`] simultaneous live allocations.
    pub fn new(size: u32) -> Self {
        Self::with_max_allocations(size, crate::DEFAULT_MAX_ALLOCATIONS)
    }

    /// Creates an allocator over `0..size`, with room for at most
    /// `max_allocations` simultaneous live allocations. Once that many
    /// regions are live, further allocation fails until one is freed, even
    /// if the range itself still has free space.
    pub fn with_max_allocations(size: u32, max_allocations: u32) -> Self {
        let mut allocator = Allocator {
            size,
            max_allocations,
            free_storage: 0,
            directory: Directory::new(),
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            free_offset: 0,
            #[cfg(feature = "counters")]
            counters: Counters::default(),
        };
        allocator.reset();
        allocator
    }

    /// Discards all outstanding allocations and returns to the initial
    /// state: the whole range free, as one region.
    ///
    /// Any [`Allocation`] handles obtained before calling this are no
    /// longer valid; using them afterwards is a logic error, caught by a
    /// debug assertion in [`Allocator::free`].
    pub fn reset(&mut self) {
        self.free_storage = 0;
        self.directory = Directory::new();
        self.nodes = (0..self.max_allocations).map(|_| Node::unused()).collect();
        // Stored so that index 0 is the first one `pop_free_node` hands
        // out, matching the original's reversed fill.
        self.free_nodes = (0..self.max_allocations).rev().collect();
        self.free_offset = self.max_allocations;

        #[cfg(feature = "counters")]
        {
            self.counters = Counters::default();
        }

        if self.size > 0 && self.max_allocations > 0 {
            self.insert_node_into_bin(self.size, 0);
        }

        self.debug_validate();
    }

    /// Tears down the node pool, leaving the allocator empty: every
    /// operation on it becomes a safe no-op (`allocate` always returns
    /// [`Allocation::NO_SPACE`]) until [`Allocator::reset`] is called
    /// again. Rust's `Drop` frees the backing storage on its own, so this
    /// is only needed to reuse the `Allocator` value itself without
    /// reconstructing it.
    pub fn take(&mut self) {
        self.nodes = Vec::new();
        self.free_nodes = Vec::new();
        self.free_offset = 0;
        self.directory = Directory::new();
        self.free_storage = 0;
    }

    /// The size of the managed range, as given to [`Allocator::new`].
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The maximum number of simultaneous live allocations.
    pub fn max_allocations(&self) -> u32 {
        self.max_allocations
    }

    /// Allocates `size` units from the range, returning
    /// [`Allocation::NO_SPACE`] if no free region is large enough or the
    /// node pool is exhausted.
    pub fn allocate(&mut self, size: u32) -> Allocation {
        self.debug_validate();

        if self.free_offset == 0 {
            #[cfg(feature = "counters")]
            self.counters.account_failure();
            return Allocation::NO_SPACE;
        }

        let min_bin_index = quantize_round_up(size);
        let bin_index = match self.directory.find_free_bin_at_or_after(min_bin_index) {
            Some(bin_index) => bin_index,
            None => {
                #[cfg(feature = "counters")]
                self.counters.account_failure();
                return Allocation::NO_SPACE;
            }
        };

        let node_index = self.directory.bin_indices[bin_index as usize];
        let node_total_size = self.nodes[node_index as usize].size;
        let bin_list_next = self.nodes[node_index as usize].bin_list_next;

        self.nodes[node_index as usize].size = size;
        self.nodes[node_index as usize].used = true;
        self.directory.bin_indices[bin_index as usize] = bin_list_next;
        if bin_list_next != INVALID {
            self.nodes[bin_list_next as usize].bin_list_prev = INVALID;
        }
        self.free_storage -= node_total_size;

        if self.directory.is_bin_empty(bin_index) {
            self.directory.deactivate_bin(bin_index);
        }

        // Push back whatever's left over of the node we took as a smaller,
        // still-free region, chained into the neighbor list so it can
        // still be coalesced later.
        let remainder_size = node_total_size - size;
        if remainder_size > 0 {
            let data_offset = self.nodes[node_index as usize].offset;
            let new_node_index = self.insert_node_into_bin(remainder_size, data_offset + size);

            let neighbor_next = self.nodes[node_index as usize].neighbor_next;
            if neighbor_next != INVALID {
                self.nodes[neighbor_next as usize].neighbor_prev = new_node_index;
            }
            self.nodes[new_node_index as usize].neighbor_prev = node_index;
            self.nodes[new_node_index as usize].neighbor_next = neighbor_next;
            self.nodes[node_index as usize].neighbor_next = new_node_index;
        }

        #[cfg(feature = "counters")]
        self.counters.account_allocate();

        self.debug_validate();

        Allocation { offset: self.nodes[node_index as usize].offset, metadata: node_index }
    }

    /// Like [`Allocator::allocate`], but reports failure as `Err` instead
    /// of the [`Allocation::NO_SPACE`] sentinel, for callers who prefer
    /// `?` at the edges of their own code.
    pub fn try_allocate(&mut self, size: u32) -> Result<Allocation, AllocError> {
        let allocation = self.allocate(size);
        if allocation.is_valid() {
            Ok(allocation)
        } else {
            Err(AllocError)
        }
    }

    /// Returns `allocation` to the free pool, coalescing it with free
    /// neighbors in O(1).
    ///
    /// Freeing [`Allocation::NO_SPACE`] is a no-op. Freeing a handle twice,
    /// or one from a different (or since-reset) allocator, is a logic
    /// error caught by a debug assertion; in release builds it's
    /// unspecified but does not corrupt the allocator's own bookkeeping
    /// worse than the caller already has.
    pub fn free(&mut self, allocation: Allocation) {
        if !allocation.is_valid() || self.nodes.is_empty() {
            return;
        }

        self.debug_validate();

        let node_index = allocation.metadata;
        debug_assert!(self.nodes[node_index as usize].used, "double free or foreign allocation handle");

        let mut offset = self.nodes[node_index as usize].offset;
        let mut size = self.nodes[node_index as usize].size;

        let neighbor_prev = self.nodes[node_index as usize].neighbor_prev;
        if neighbor_prev != INVALID && !self.nodes[neighbor_prev as usize].used {
            let prev_offset = self.nodes[neighbor_prev as usize].offset;
            let prev_size = self.nodes[neighbor_prev as usize].size;
            offset = prev_offset;
            size += prev_size;

            self.remove_node_from_bin(neighbor_prev);

            debug_assert_eq!(self.nodes[neighbor_prev as usize].neighbor_next, node_index);
            self.nodes[node_index as usize].neighbor_prev = self.nodes[neighbor_prev as usize].neighbor_prev;
        }

        let neighbor_next = self.nodes[node_index as usize].neighbor_next;
        if neighbor_next != INVALID && !self.nodes[neighbor_next as usize].used {
            let next_size = self.nodes[neighbor_next as usize].size;
            size += next_size;

            self.remove_node_from_bin(neighbor_next);

            debug_assert_eq!(self.nodes[neighbor_next as usize].neighbor_prev, node_index);
            self.nodes[node_index as usize].neighbor_next = self.nodes[neighbor_next as usize].neighbor_next;
        }

        let final_neighbor_next = self.nodes[node_index as usize].neighbor_next;
        let final_neighbor_prev = self.nodes[node_index as usize].neighbor_prev;

        self.push_free_node(node_index);

        let combined_node_index = self.insert_node_into_bin(size, offset);

        if final_neighbor_next != INVALID {
            self.nodes[combined_node_index as usize].neighbor_next = final_neighbor_next;
            self.nodes[final_neighbor_next as usize].neighbor_prev = combined_node_index;
        }
        if final_neighbor_prev != INVALID {
            self.nodes[combined_node_index as usize].neighbor_prev = final_neighbor_prev;
            self.nodes[final_neighbor_prev as usize].neighbor_next = combined_node_index;
        }

        #[cfg(feature = "counters")]
        self.counters.account_free();

        self.debug_validate();
    }

    /// The size of a live allocation. Returns `0` for
    /// [`Allocation::NO_SPACE`] or after the allocator has been reset or
    /// torn down.
    pub fn size_of(&self, allocation: Allocation) -> u32 {
        if !allocation.is_valid() || self.nodes.is_empty() {
            return 0;
        }
        self.nodes[allocation.metadata as usize].size
    }

    /// A cheap snapshot of total free space and the single largest free
    /// region.
    pub fn report(&self) -> StorageReport {
        let mut largest_free_region = 0;
        let mut total_free_space = 0;

        if self.free_offset > 0 {
            total_free_space = self.free_storage;

            if self.directory.used_bins_top != 0 {
                let top_bin_index = 31 - self.directory.used_bins_top.leading_zeros();
                let leaf_bin_index =
                    31 - (self.directory.used_bins[top_bin_index as usize] as u32).leading_zeros();
                largest_free_region =
                    bin_index_to_min_size(Directory::join(top_bin_index, leaf_bin_index));
                debug_assert!(total_free_space >= largest_free_region);
            }
        }

        StorageReport { total_free_space, largest_free_region }
    }

    /// A full per-bin histogram of free regions. Walks every bin's free
    /// list: O(free region count), not O(1).
    pub fn report_full(&self) -> StorageReportFull {
        let mut per_bin = [BinReport::default(); BIN_COUNT];

        for (bin_index, entry) in per_bin.iter_mut().enumerate() {
            let mut count = 0;
            let mut node_index = self.directory.bin_indices[bin_index];
            while node_index != INVALID {
                node_index = self.nodes[node_index as usize].bin_list_next;
                count += 1;
            }
            *entry = BinReport { size: bin_index_to_min_size(bin_index as u32), count };
        }

        StorageReportFull { per_bin }
    }

    #[cfg(feature = "counters")]
    /// Cumulative allocation statistics, available when built with the
    /// `counters` feature.
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    fn pop_free_node(&mut self) -> u32 {
        self.free_offset -= 1;
        self.free_nodes[self.free_offset as usize]
    }

    fn push_free_node(&mut self, node_index: u32) {
        self.free_nodes[self.free_offset as usize] = node_index;
        self.free_offset += 1;
    }

    /// Files a new free region under its size-class bin, recycling a node
    /// from the free-node stack. Returns the node's index. Neighbor-chain
    /// fields are left `INVALID`; the caller links them in.
    fn insert_node_into_bin(&mut self, size: u32, offset: u32) -> u32 {
        let bin_index = quantize_round_down(size);

        if self.directory.is_bin_empty(bin_index) {
            self.directory.activate_bin(bin_index);
        }

        let top_node_index = self.directory.bin_indices[bin_index as usize];
        let node_index = self.pop_free_node();

        self.nodes[node_index as usize] = Node {
            offset,
            size,
            used: false,
            bin_list_prev: INVALID,
            bin_list_next: top_node_index,
            neighbor_prev: INVALID,
            neighbor_next: INVALID,
        };
        if top_node_index != INVALID {
            self.nodes[top_node_index as usize].bin_list_prev = node_index;
        }
        self.directory.bin_indices[bin_index as usize] = node_index;

        self.free_storage += size;

        node_index
    }

    /// Unlinks `node_index` from whichever bin list it's filed under, and
    /// recycles it onto the free-node stack. Used when a node is about to
    /// be merged into a coalesced region rather than handed out.
    fn remove_node_from_bin(&mut self, node_index: u32) {
        let bin_list_prev = self.nodes[node_index as usize].bin_list_prev;
        let bin_list_next = self.nodes[node_index as usize].bin_list_next;

        if bin_list_prev != INVALID {
            self.nodes[bin_list_prev as usize].bin_list_next = bin_list_next;
            if bin_list_next != INVALID {
                self.nodes[bin_list_next as usize].bin_list_prev = bin_list_prev;
            }
        } else {
            // We're the bin's head; find which bin we're filed under and
            // repoint it (or clear its bitmap bit if we were the last one).
            let bin_index = quantize_round_down(self.nodes[node_index as usize].size);

            self.directory.bin_indices[bin_index as usize] = bin_list_next;
            if bin_list_next != INVALID {
                self.nodes[bin_list_next as usize].bin_list_prev = INVALID;
            }
            if self.directory.is_bin_empty(bin_index) {
                self.directory.deactivate_bin(bin_index);
            }
        }

        self.push_free_node(node_index);
    }

    #[cfg(all(debug_assertions, any(test, feature = "std")))]
    fn debug_validate(&self) {
        self.validate();
    }

    #[cfg(not(all(debug_assertions, any(test, feature = "std"))))]
    fn debug_validate(&self) {}

    /// Walks the whole allocator, asserting every invariant: node pool
    /// conservation, bin/bitmap coherence, bin placement, address-chain
    /// completeness, no two adjacent free regions, and free-storage
    /// accounting. O(node count); intended for debug builds and tests,
    /// not the hot path.
    #[cfg(any(test, feature = "std"))]
    pub fn validate(&self) {
        if self.nodes.is_empty() {
            return;
        }

        for (index, node) in self.nodes.iter().enumerate() {
            let index = index as u32;
            if node.neighbor_next != INVALID {
                let next = &self.nodes[node.neighbor_next as usize];
                assert_eq!(next.neighbor_prev, index, "neighbor chain broken after node {index}");
                assert_eq!(
                    node.offset + node.size,
                    next.offset,
                    "nodes {index} and {} are not contiguous",
                    node.neighbor_next
                );
                assert!(
                    node.used || next.used,
                    "adjacent free nodes {index} and {} were not coalesced",
                    node.neighbor_next
                );
            }
        }

        let mut counted_free_storage = 0u32;
        let mut counted_free_nodes = 0u32;

        for bin_index in 0..BIN_COUNT as u32 {
            let mut node_index = self.directory.bin_indices[bin_index as usize];
            let mut prev = INVALID;
            while node_index != INVALID {
                let node = &self.nodes[node_index as usize];
                assert!(!node.used, "used node {node_index} found filed in free bin {bin_index}");
                assert_eq!(node.bin_list_prev, prev, "bin list prev mismatch at node {node_index}");
                assert_eq!(
                    quantize_round_down(node.size),
                    bin_index,
                    "node {node_index} of size {} filed under bin {bin_index}",
                    node.size
                );

                counted_free_storage += node.size;
                counted_free_nodes += 1;
                prev = node_index;
                node_index = node.bin_list_next;
            }
        }

        assert_eq!(counted_free_storage, self.free_storage, "free storage accounting mismatch");
        assert_eq!(
            counted_free_nodes + self.free_offset,
            self.max_allocations,
            "node pool conservation violated: {counted_free_nodes} filed + {} on the free stack != {} total",
            self.free_offset,
            self.max_allocations
        );

        for top in 0..TOP_BIN_COUNT as u32 {
            let leaf_mask = self.directory.used_bins[top as usize];
            for leaf in 0..LEAF_BINS_PER_TOP_BIN as u32 {
                let bin_index = Directory::join(top, leaf);
                let bit_set = leaf_mask & (1 << leaf) != 0;
                assert_eq!(
                    bit_set,
                    !self.directory.is_bin_empty(bin_index),
                    "leaf bitmap incoherent with bin_indices at bin {bin_index}"
                );
            }
            let top_bit_set = self.directory.used_bins_top & (1 << top) != 0;
            assert_eq!(top_bit_set, leaf_mask != 0, "top bitmap incoherent at top bin {top}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_fill_then_free() {
        let mut a = Allocator::new(1024);
        let x = a.allocate(256);
        assert!(x.is_valid());
        assert_eq!(a.size_of(x), 256);
        a.free(x);
        assert_eq!(a.report().total_free_space, 1024);
        a.validate();
    }

    #[test]
    fn split_remainder_is_reusable() {
        let mut a = Allocator::new(1024);
        let x = a.allocate(100);
        assert_eq!(x.offset, 0);
        let y = a.allocate(924);
        assert!(y.is_valid());
        assert_eq!(y.offset, 100);
        a.validate();
    }

    #[test]
    fn freeing_middle_region_coalesces_with_both_neighbors() {
        let mut a = Allocator::new(300);
        let x = a.allocate(100);
        let y = a.allocate(100);
        let z = a.allocate(100);
        a.free(x);
        a.free(z);
        a.free(y);
        // the whole range should be a single free region again
        assert_eq!(a.report().total_free_space, 300);
        assert_eq!(a.report().largest_free_region, 300);
        a.validate();
    }

    #[test]
    fn freed_regions_remain_allocatable_after_coalescing() {
        let mut a = Allocator::new(10_000);
        let big = a.allocate(5000);
        let small_hole_owner = a.allocate(32);
        let _tail = a.allocate(4000);
        a.free(small_hole_owner);
        a.free(big);
        let fit = a.allocate(32);
        assert!(fit.is_valid());
        a.validate();
    }

    #[test]
    fn pool_exhaustion_returns_no_space_even_with_free_range() {
        let mut a = Allocator::with_max_allocations(1_000_000, 2);
        let _a1 = a.allocate(1);
        let _a2 = a.allocate(1);
        let a3 = a.allocate(1);
        assert!(!a3.is_valid());
        assert_eq!(a3, Allocation::NO_SPACE);
    }

    #[test]
    fn range_exhaustion_returns_no_space() {
        let mut a = Allocator::new(100);
        let _x = a.allocate(100);
        let y = a.allocate(1);
        assert!(!y.is_valid());
    }

    #[test]
    fn fragmentation_without_free_does_not_merge() {
        let mut a = Allocator::new(300);
        let _x = a.allocate(100);
        let _y = a.allocate(100);
        let _z = a.allocate(100);
        assert_eq!(a.report().total_free_space, 0);
    }

    #[test]
    fn reset_restores_the_whole_range_as_free() {
        let mut a = Allocator::new(512);
        let _x = a.allocate(128);
        a.reset();
        assert_eq!(a.report().total_free_space, 512);
        assert_eq!(a.report().largest_free_region, 512);
    }

    #[test]
    fn take_makes_allocate_a_safe_no_op() {
        let mut a = Allocator::new(64);
        a.take();
        assert_eq!(a.allocate(1), Allocation::NO_SPACE);
        assert_eq!(a.size_of(Allocation { offset: 0, metadata: 0 }), 0);
    }

    #[test]
    fn randomized_alloc_free_sequence_upholds_invariants() {
        let mut a = Allocator::with_max_allocations(1 << 16, 512);
        let mut live = Vec::new();
        let rng = fastrand::Rng::with_seed(42);

        for _ in 0..20_000 {
            if live.is_empty() || rng.bool() {
                let size = rng.u32(1..=4096);
                let allocation = a.allocate(size);
                if allocation.is_valid() {
                    assert_eq!(a.size_of(allocation), size);
                    live.push(allocation);
                }
            } else {
                let index = rng.usize(0..live.len());
                let allocation = live.swap_remove(index);
                a.free(allocation);
            }
        }

        a.validate();

        for allocation in live {
            a.free(allocation);
        }
        let report = a.report();
        assert_eq!(report.total_free_space, 1 << 16);
        assert_eq!(report.largest_free_region, 1 << 16);
        a.validate();
    }
}
