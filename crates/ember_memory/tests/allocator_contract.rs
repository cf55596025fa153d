//! Behaviour every strategy must share, plus the concrete reuse scenarios
//! engine code relies on.

use ember_memory::{
    AllocError, Allocator, ArenaBuffer, DynArray, FreeListAllocator, LinearAllocator,
    PoolAllocator, ProxyAllocator, StackAllocator,
};
use proptest::prelude::*;

const ALIGNMENTS: [usize; 6] = [1, 2, 4, 8, 16, 32];

fn check_alignments(allocator: &dyn Allocator) {
    for alignment in ALIGNMENTS {
        for size in [1usize, 3, 17] {
            let ptr = allocator
                .allocate(size, alignment)
                .unwrap_or_else(|err| panic!("{}: {err}", allocator.name()));
            assert_eq!(
                ptr.as_ptr() as usize % alignment,
                0,
                "{} returned misaligned pointer for alignment {alignment}",
                allocator.name()
            );
        }
    }
}

#[test]
fn test_all_strategies_honour_alignment() {
    let mut linear_buffer = ArenaBuffer::new(4096);
    let mut stack_buffer = ArenaBuffer::new(4096);
    let mut heap_buffer = ArenaBuffer::new(4096);

    let linear = LinearAllocator::new(linear_buffer.arena());
    let stack = StackAllocator::new(stack_buffer.arena());
    let heap = FreeListAllocator::new(heap_buffer.arena()).unwrap();
    let proxy = ProxyAllocator::new("proxy", &heap);

    check_alignments(&linear);
    check_alignments(&stack);
    check_alignments(&proxy);
}

#[test]
fn test_pool_slots_are_aligned() {
    #[repr(align(32))]
    struct Aligned([u8; 40]);

    let mut buffer = ArenaBuffer::new(1024);
    let pool: PoolAllocator<Aligned> = PoolAllocator::new(buffer.arena()).unwrap();
    while let Ok(slot) = pool.allocate_slot() {
        assert_eq!(slot.as_ptr() as usize % 32, 0);
    }
    for alignment in ALIGNMENTS {
        pool.clear();
        let ptr = pool.allocate(1, alignment).unwrap();
        assert_eq!(ptr.as_ptr() as usize % alignment, 0);
    }
}

#[test]
fn test_invalid_requests_rejected_everywhere() {
    let mut linear_buffer = ArenaBuffer::new(256);
    let mut heap_buffer = ArenaBuffer::new(256);
    let linear = LinearAllocator::new(linear_buffer.arena());
    let heap = FreeListAllocator::new(heap_buffer.arena()).unwrap();

    for allocator in [&linear as &dyn Allocator, &heap] {
        assert_eq!(allocator.allocate(0, 8), Err(AllocError::ZeroSizedRequest));
        assert_eq!(allocator.allocate(8, 3), Err(AllocError::InvalidAlignment(3)));
        assert!(matches!(
            allocator.allocate(1 << 20, 8),
            Err(AllocError::OutOfMemory { .. })
        ));
    }
}

#[test]
fn test_stack_marker_reuses_freed_address() {
    let mut buffer = ArenaBuffer::new(1024);
    let stack = StackAllocator::new(buffer.arena());

    let _a = stack.allocate(48, 16).unwrap();
    let before_b = stack.marker();
    let b = stack.allocate(100, 8).unwrap();
    stack.free_to_marker(before_b).unwrap();
    let c = stack.allocate(100, 8).unwrap();
    assert_eq!(b, c);
}

#[test]
fn test_pool_capacity_is_fixed() {
    const SLOTS: usize = 8;
    let mut buffer = ArenaBuffer::new(SLOTS * 16);
    let pool: PoolAllocator<[u64; 2]> = PoolAllocator::new(buffer.arena()).unwrap();
    assert_eq!(pool.slot_capacity(), SLOTS);

    let slots: Vec<_> = (0..SLOTS).map(|_| pool.allocate_slot().unwrap()).collect();
    assert!(matches!(
        pool.allocate_slot(),
        Err(AllocError::OutOfMemory { .. })
    ));

    pool.deallocate(slots[3].cast()).unwrap();
    assert_eq!(pool.allocate_slot().unwrap(), slots[3]);
}

#[test]
fn test_free_list_reuses_fifth_slot() {
    let mut buffer = ArenaBuffer::new(1040);
    let heap = FreeListAllocator::new(buffer.arena()).unwrap();

    let ptrs: Vec<_> = (0..10).map(|_| heap.allocate(64, 8).unwrap()).collect();
    let untouched_before = heap.block_stats().largest_free_block;

    heap.deallocate(ptrs[4]).unwrap();
    let again = heap.allocate(64, 8).unwrap();

    assert_eq!(again, ptrs[4]);
    assert_eq!(heap.block_stats().largest_free_block, untouched_before);
}

#[test]
fn test_free_list_reuses_fifth_slot_with_headroom() {
    let mut buffer = ArenaBuffer::new(4096);
    let heap = FreeListAllocator::new(buffer.arena()).unwrap();

    let ptrs: Vec<_> = (0..10).map(|_| heap.allocate(64, 8).unwrap()).collect();
    let untouched = heap.block_stats().largest_free_block;
    assert!(untouched >= 64 * 10);

    heap.deallocate(ptrs[4]).unwrap();
    let again = heap.allocate(64, 8).unwrap();

    assert_eq!(again, ptrs[4]);
    assert_eq!(heap.block_stats().largest_free_block, untouched);
    assert_eq!(heap.block_stats().free_blocks, 1);
}

proptest! {
    #[test]
    fn dyn_array_preserves_push_order(values in prop::collection::vec(any::<u32>(), 9..200)) {
        let mut buffer = ArenaBuffer::new(16 * 1024);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let mut array = DynArray::new(&heap);

        let mut capacities = vec![array.capacity()];
        for &value in &values {
            array.push(value).unwrap();
            if capacities.last() != Some(&array.capacity()) {
                capacities.push(array.capacity());
            }
        }

        // 0 -> 4 -> 8 -> 16: at least two growths past the first buffer.
        prop_assert!(capacities.len() >= 3);
        prop_assert_eq!(array.as_slice(), values.as_slice());
        prop_assert_eq!(heap.allocation_count(), 1);
    }
}
