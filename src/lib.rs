//! A hard-realtime O(1) offset sub-allocator over a fixed-size linear range.
//!
//! [`Allocator`] hands out non-overlapping `(offset, size)` spans drawn from
//! a single range of `size` units you choose up front (bytes, vertices,
//! whatever your buffer is measured in). It never touches real memory: it
//! only tracks which sub-ranges of `0..size` are free or used, so it's
//! equally at home packing a GPU mesh buffer, a ring of network send slots,
//! or anything else that wants O(1) best-fit sub-allocation without an
//! allocator thread, a lock, or a heap of its own.
//!
//! Allocation and free are both O(1): a two-level bitmap directory finds a
//! best-fit free region without scanning, and freeing a region coalesces it
//! with free neighbors in constant time via an intrusive address-order
//! chain. There is a hard upper bound on live allocations
//! ([`DEFAULT_MAX_ALLOCATIONS`] by default, or your own via
//! [`Allocator::with_max_allocations`]); once it is reached, further
//! allocation fails with [`Allocation::NO_SPACE`] until something is freed.
//!
//! Your first step is [`Allocator::new`]. Call [`Allocator::allocate`] (or
//! the `Result`-returning [`Allocator::try_allocate`]) to get an
//! [`Allocation`], and [`Allocator::free`] to give it back.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

extern crate alloc;

mod directory;
mod node;
mod quantize;

pub mod error;

#[cfg(feature = "counters")]
pub mod counters;

mod allocator;

pub use allocator::{Allocation, Allocator, BinReport, StorageReport, StorageReportFull};
pub use error::AllocError;

/// The sentinel value returned in place of a valid offset or handle when an
/// allocation cannot be satisfied, and used internally to mark "no node"
/// and "no bin".
pub const NO_SPACE: u32 = u32::MAX;

/// The number of size-class bins the directory tracks.
pub const BIN_COUNT: usize = 256;

/// The number of top-level bitmap bins (each covering 8 leaf bins).
pub const TOP_BIN_COUNT: usize = 32;

/// The number of leaf bins per top-level bin.
pub const LEAF_BINS_PER_TOP_BIN: usize = 8;

/// The node pool capacity used by [`Allocator::new`] when no explicit
/// capacity is given.
pub const DEFAULT_MAX_ALLOCATIONS: u32 = 131_072;

pub mod prelude {
    //! Re-exports of the types you need for everyday use.

    pub use crate::{AllocError, Allocation, Allocator, StorageReport, StorageReportFull};
}
