//! Optional cumulative allocation statistics, enabled by the `counters`
//! feature. These are purely additive bookkeeping alongside the allocator's
//! own state; disabling the feature removes the bookkeeping entirely with
//! no change to allocation behavior.

use core::fmt;

/// Cumulative statistics tracked alongside an [`crate::Allocator`] when the
/// `counters` feature is enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct Counters {
    /// Number of regions currently allocated.
    pub allocation_count: u32,
    /// Number of successful [`crate::Allocator::allocate`] calls over the
    /// allocator's lifetime.
    pub total_allocations: u64,
    /// Number of [`crate::Allocator::free`] calls over the allocator's
    /// lifetime.
    pub total_frees: u64,
    /// Number of times an allocation request failed for lack of a
    /// sufficiently large free region or a free node to hand out.
    pub failed_allocations: u64,
}

impl Counters {
    pub(crate) fn account_allocate(&mut self) {
        self.allocation_count += 1;
        self.total_allocations += 1;
    }

    pub(crate) fn account_free(&mut self) {
        self.allocation_count -= 1;
        self.total_frees += 1;
    }

    pub(crate) fn account_failure(&mut self) {
        self.failed_allocations += 1;
    }
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "allocation_count:    {}", self.allocation_count)?;
        writeln!(f, "total_allocations:   {}", self.total_allocations)?;
        writeln!(f, "total_frees:         {}", self.total_frees)?;
        write!(f, "failed_allocations:  {}", self.failed_allocations)
    }
}
