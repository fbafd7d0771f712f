//! Kernel heap: coalescing free-list allocator over a 1 MiB arena.
//!
//! Each allocation is preceded by an intrusive `Block` header; blocks form
//! a singly linked list ordered by address (splits insert in place, frees
//! only flip the flag, so the ordering is an invariant, not maintained
//! work). `kfree` eagerly merges a freed block with its free successors.
//! On the bare-metal target the same allocator backs `GlobalAlloc`.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::sync::spinlock::Spinlock;

/// Arena size: one contiguous 1 MiB region.
pub const HEAP_SIZE: usize = 1024 * 1024;

/// Split threshold: leftover beyond the request must fit a header plus
/// this many payload bytes to be worth carving off.
const SPLIT_SLACK: usize = 16;

#[repr(C, align(16))]
struct Arena([u8; HEAP_SIZE]);

static mut ARENA: Arena = Arena([0; HEAP_SIZE]);

/// Intrusive header preceding each payload.
#[repr(C, align(16))]
struct Block {
    size: usize,
    free: bool,
    next: *mut Block,
}

const HEADER_SIZE: usize = core::mem::size_of::<Block>();

struct HeapState {
    head: usize, // address of the first block, 0 before init
    allocated: usize,
    free: usize,
}

static HEAP: Spinlock<HeapState> = Spinlock::new(HeapState {
    head: 0,
    allocated: 0,
    free: 0,
});

static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[allow(unused_unsafe)]
fn arena_start() -> usize {
    unsafe { (&raw const ARENA) as *const Arena as usize }
}

fn in_arena(addr: usize) -> bool {
    let start = arena_start();
    addr >= start && addr < start + HEAP_SIZE
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Initialize (or reset) the heap to one free block spanning the arena.
pub fn init() {
    let mut heap = HEAP.lock();
    let head = arena_start() as *mut Block;
    unsafe {
        (*head).size = HEAP_SIZE - HEADER_SIZE;
        (*head).free = true;
        (*head).next = core::ptr::null_mut();
    }
    heap.head = head as usize;
    heap.allocated = 0;
    heap.free = HEAP_SIZE - HEADER_SIZE;
    INITIALIZED.store(true, Ordering::Release);

    log::info!("kernel heap: {} KiB arena", HEAP_SIZE / 1024);
}

/// Allocate `size` bytes. Returns null when no block fits.
pub fn kmalloc(size: usize) -> *mut u8 {
    if size == 0 || !INITIALIZED.load(Ordering::Acquire) {
        return core::ptr::null_mut();
    }
    let size = align_up(size, 16);

    let mut heap = HEAP.lock();
    let mut current = heap.head as *mut Block;

    unsafe {
        while !current.is_null() {
            if (*current).free && (*current).size >= size {
                if (*current).size > size + HEADER_SIZE + SPLIT_SLACK {
                    // Carve a free block out of the tail
                    let split =
                        (current as *mut u8).add(HEADER_SIZE + size) as *mut Block;
                    (*split).size = (*current).size - size - HEADER_SIZE;
                    (*split).free = true;
                    (*split).next = (*current).next;
                    (*current).next = split;
                    (*current).size = size;
                    heap.free -= HEADER_SIZE;
                }
                (*current).free = false;
                heap.allocated += (*current).size;
                heap.free -= (*current).size;
                return (current as *mut u8).add(HEADER_SIZE);
            }
            current = (*current).next;
        }
    }
    core::ptr::null_mut()
}

/// Free a pointer returned by [`kmalloc`]. Null and foreign pointers are
/// ignored.
pub fn kfree(ptr: *mut u8) {
    if ptr.is_null() || !in_arena(ptr as usize) {
        return;
    }

    let mut heap = HEAP.lock();
    unsafe {
        let block = (ptr as *mut Block).byte_sub(HEADER_SIZE);
        if (*block).free {
            return; // double free, ignore
        }
        (*block).free = true;
        heap.allocated -= (*block).size;
        heap.free += (*block).size;

        // Sweep the list and merge every run of adjacent free blocks.
        // Blocks tile the arena, so list neighbors are always adjacent;
        // the address check is a corruption guard.
        let mut current = heap.head as *mut Block;
        while !current.is_null() {
            while (*current).free {
                let next = (*current).next;
                if next.is_null() || !(*next).free {
                    break;
                }
                let adjacent = (current as *mut u8).add(HEADER_SIZE + (*current).size)
                    == next as *mut u8;
                if !adjacent {
                    break;
                }
                (*current).size += HEADER_SIZE + (*next).size;
                (*current).next = (*next).next;
                heap.free += HEADER_SIZE;
            }
            current = (*current).next;
        }
    }
}

/// Current (allocated, free) byte counters.
pub fn stats() -> (usize, usize) {
    let heap = HEAP.lock();
    (heap.allocated, heap.free)
}

// ── GlobalAlloc backing (bare metal only) ───────────────────────────

#[cfg(target_os = "none")]
mod global {
    use core::alloc::{GlobalAlloc, Layout};

    struct KernelAllocator;

    unsafe impl GlobalAlloc for KernelAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            if layout.align() > 16 {
                return core::ptr::null_mut();
            }
            super::kmalloc(layout.size())
        }

        unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
            super::kfree(ptr);
        }
    }

    #[global_allocator]
    static ALLOCATOR: KernelAllocator = KernelAllocator;
}
