//! Error types.

use core::fmt;

/// Returned by [`crate::Allocator::try_allocate`] when the requested size
/// cannot be satisfied, either because no free region is large enough or
/// because the node pool is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no free region large enough to satisfy the allocation request")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AllocError {}
