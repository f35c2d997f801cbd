#![no_main]

use libfuzzer_sys::arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use offset_alloc::Allocator;

#[derive(Arbitrary, Debug)]
enum Action {
    /// Allocate a region of the given size.
    Alloc { size: u16 },
    /// Free the ith live allocation.
    Free { index: u8 },
    /// Reset the allocator back to one big free region.
    Reset,
}
use Action::*;

fuzz_target!(|actions: Vec<Action>| {
    let mut alloc = Allocator::with_max_allocations(1 << 20, 4096);
    let mut live = Vec::new();

    for action in actions {
        match action {
            Alloc { size } => {
                let allocation = alloc.allocate(size as u32);
                if allocation.is_valid() {
                    live.push((allocation, size as u32));
                }
            }
            Free { index } => {
                let index = index as usize;
                if index >= live.len() {
                    continue;
                }
                let (allocation, _) = live.swap_remove(index);
                alloc.free(allocation);
            }
            Reset => {
                alloc.reset();
                live.clear();
            }
        }

        alloc.validate();
    }

    for (allocation, _) in live {
        alloc.free(allocation);
    }
    alloc.validate();
});
