//! A toy meshlet packer: two independent allocators carve vertex and index
//! slots out of a pair of fixed-size buffers as meshlets stream in, and
//! release both slots together when a meshlet is evicted.
//!
//! There's no renderer here, no GPU buffer, no glTF parsing — just the
//! allocation side of the pattern: one [`Allocator`] per buffer, one
//! [`Allocation`] pair held per meshlet.

use offset_alloc::{Allocation, Allocator};

const MAX_VERTS: u32 = 6_000_000;
const MAX_INDICES: u32 = 6_000_000;

struct Meshlet {
    vertex_alloc: Allocation,
    index_alloc: Allocation,
    num_verts: u32,
    num_indices: u32,
}

struct MeshletPacker {
    vertex_alloc: Allocator,
    index_alloc: Allocator,
    live: Vec<Meshlet>,
}

impl MeshletPacker {
    fn new() -> Self {
        MeshletPacker {
            vertex_alloc: Allocator::new(MAX_VERTS),
            index_alloc: Allocator::new(MAX_INDICES),
            live: Vec::new(),
        }
    }

    /// Packs one meshlet's vertex and index spans. Returns `None` if either
    /// buffer has no room left, in which case neither allocation is kept
    /// (the one that *did* succeed, if any, is immediately freed).
    fn pack(&mut self, num_verts: u32, num_indices: u32) -> Option<usize> {
        let vertex_alloc = self.vertex_alloc.allocate(num_verts);
        let index_alloc = self.index_alloc.allocate(num_indices);

        if !vertex_alloc.is_valid() || !index_alloc.is_valid() {
            if vertex_alloc.is_valid() {
                self.vertex_alloc.free(vertex_alloc);
            }
            if index_alloc.is_valid() {
                self.index_alloc.free(index_alloc);
            }
            return None;
        }

        self.live.push(Meshlet { vertex_alloc, index_alloc, num_verts, num_indices });
        Some(self.live.len() - 1)
    }

    fn evict(&mut self, slot: usize) {
        let meshlet = self.live.swap_remove(slot);
        self.vertex_alloc.free(meshlet.vertex_alloc);
        self.index_alloc.free(meshlet.index_alloc);
    }

    fn report(&self) -> (u32, u32) {
        (self.vertex_alloc.report().total_free_space, self.index_alloc.report().total_free_space)
    }
}

fn main() {
    let mut packer = MeshletPacker::new();
    let rng = fastrand::Rng::with_seed(7);

    let mut packed = 0u32;
    let mut rejected = 0u32;

    for frame in 0..200 {
        for _ in 0..64 {
            let num_verts = rng.u32(1..=64);
            let num_indices = rng.u32(1..=124) * 3;

            if packer.pack(num_verts, num_indices).is_some() {
                packed += 1;
            } else {
                rejected += 1;
            }
        }

        // Evict roughly a third of what's live each frame, simulating an
        // LRU-ish streaming budget.
        let evict_count = packer.live.len() / 3;
        for _ in 0..evict_count {
            if packer.live.is_empty() {
                break;
            }
            let slot = rng.usize(0..packer.live.len());
            packer.evict(slot);
        }

        if frame % 50 == 0 {
            let (vertex_free, index_free) = packer.report();
            println!(
                "frame {frame:>4}: {} meshlets live, {packed} packed, {rejected} rejected, \
                 vertex_free={vertex_free}, index_free={index_free}",
                packer.live.len()
            );
        }
    }

    println!("done: {} meshlets still live", packer.live.len());
}
