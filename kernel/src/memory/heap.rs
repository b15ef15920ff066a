// =============================================================================
// MinimalOS NextGen — Kernel Heap Allocator
// =============================================================================
//
// This module provides dynamic memory allocation for the kernel, enabling
// use of Rust's `alloc` crate (Box, Vec, String, Arc, etc.) as well as the
// explicit `kmalloc`/`kfree`/`kcalloc`/`krealloc` entry points.
//
// DESIGN: Linked-list free-list allocator over a fixed virtual window
// ======================================================================
//
// Unlike most of the kernel's other memory, the heap does not live behind
// the HHDM. It owns a dedicated 1 MiB virtual window at a fixed address
// (`HEAP_WINDOW_BASE`), mapped page-by-page through the VMM during `init`.
// This keeps the heap's address range stable across boots regardless of
// how physical memory happens to be laid out.
//
//   ┌──────────┐     ┌──────────────┐     ┌───────────┐
//   │ FreeBlock│ ──→ │  FreeBlock   │ ──→ │ FreeBlock  │ ──→ null
//   │ size: 64 │     │ size: 4096   │     │ size: 128  │
//   └──────────┘     └──────────────┘     └───────────┘
//
// The free list is kept sorted by address so adjacent free blocks can be
// coalesced on free, and so `kfree` can detect a double free by noticing
// the freed address is already on the list.
//
// ALLOCATED BLOCK LAYOUT:
//   Every block handed out is prefixed by an 8-byte `size_bytes` header
//   (the full block size, including this header). The pointer returned
//   to the caller is `header_addr + 8`. `kfree` recovers the block from
//   `ptr - 8`.
//
// ALLOCATION ALGORITHM (first-fit):
//   1. Walk the free list looking for a block large enough (accounting
//      for alignment — needed by `GlobalAlloc`, whose callers can request
//      alignments above the minimum).
//   2. Split: if the block is larger than needed, return the excess to
//      the free list as a new block.
//   3. Write the 8-byte size header and return the pointer past it.
//
// DEALLOCATION ALGORITHM:
//   1. Recover the block's address and size from its header.
//   2. Reject corrupt or double-freed pointers (see `kfree`).
//   3. Insert the freed region back into the free list (sorted by
//      address) and coalesce with adjacent free blocks.
//
// THREAD SAFETY:
//   The allocator is wrapped in a SpinLock. `GlobalAlloc::alloc/dealloc`
//   and the explicit `kmalloc`/`kfree`/etc. entry points all acquire the
//   same lock, so both call styles stay consistent. Heap calls from IRQ
//   context must come from code that has already masked interrupts —
//   the keyboard IRQ in particular never calls into the heap at all.
//
// =============================================================================

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

use crate::kprintln;
use crate::memory::address::{VirtAddr, PAGE_SIZE};
use crate::memory::pmm;
use crate::memory::vmm::{self, PageTableFlags};
use crate::sync::spinlock::SpinLock;

// =============================================================================
// Configuration
// =============================================================================

/// Fixed kernel-virtual base of the heap window.
pub const HEAP_WINDOW_BASE: u64 = 0xFFFF_8100_0000_0000;

/// Number of 4 KiB pages making up the heap window (256 pages = 1 MiB).
pub const HEAP_WINDOW_PAGES: usize = 256;

/// Total size of the heap window in bytes.
pub const HEAP_WINDOW_SIZE: usize = HEAP_WINDOW_PAGES * PAGE_SIZE as usize;

/// Size in bytes of the in-band header on every allocated block.
const ALLOC_HEADER_SIZE: usize = core::mem::size_of::<usize>();

/// Minimum block size: must be at least `size_of::<FreeBlock>()` so that
/// every free region can hold the linked-list node header.
const MIN_BLOCK_SIZE: usize = core::mem::size_of::<FreeBlock>();

/// All blocks (free or allocated) are kept on this alignment.
const BLOCK_ALIGN: usize = 16;

// =============================================================================
// Free block node
// =============================================================================

/// Header stored at the beginning of each free block in the heap.
///
/// # Memory layout
/// ```text
/// ┌──────────────────┐
/// │ size: usize (8B) │ ← total size of this free block INCLUDING header
/// │ next: *mut (8B)  │ ← pointer to next free block (or null)
/// ├──────────────────┤
/// │ ... free space ..│ ← remaining bytes available for allocation
/// └──────────────────┘
/// ```
#[repr(C)]
struct FreeBlock {
    /// Total size of this free block in bytes (including the header).
    size: usize,
    /// Pointer to the next free block, or null if this is the last one.
    next: *mut FreeBlock,
}

// =============================================================================
// Heap internals
// =============================================================================

/// The internal heap state: a sorted linked list of free blocks.
struct Heap {
    /// Head of the free list (sorted by address, lowest first).
    free_list: *mut FreeBlock,

    /// Start of the heap window.
    heap_start: usize,

    /// End of the heap window (exclusive).
    heap_end: usize,

    /// Total bytes currently allocated (for statistics).
    allocated_bytes: usize,

    /// Total heap size in bytes.
    total_bytes: usize,
}

// SAFETY: The heap pointers are only accessed while holding the SpinLock.
unsafe impl Send for Heap {}

impl Heap {
    /// Creates an uninitialized heap. Must call `init()` before use.
    const fn new() -> Self {
        Self {
            free_list: ptr::null_mut(),
            heap_start: 0,
            heap_end: 0,
            allocated_bytes: 0,
            total_bytes: 0,
        }
    }

    /// Initializes the heap with the given memory window, already mapped.
    /// Creates a single free block spanning the entire window.
    fn init(&mut self, start: usize, size: usize) {
        assert!(size >= MIN_BLOCK_SIZE, "Heap window too small");
        assert!(start % BLOCK_ALIGN == 0, "Heap window must be 16-byte aligned");

        self.heap_start = start;
        self.heap_end = start + size;
        self.total_bytes = size;
        self.allocated_bytes = 0;

        let block = start as *mut FreeBlock;
        unsafe {
            (*block).size = size;
            (*block).next = ptr::null_mut();
        }
        self.free_list = block;
    }

    /// Finds whether `addr` is currently the start of a free block — used
    /// by `kfree` to detect a double free before splicing the block back in.
    fn is_on_free_list(&self, addr: usize) -> bool {
        let mut current = self.free_list;
        while !current.is_null() {
            if current as usize == addr {
                return true;
            }
            current = unsafe { (*current).next };
        }
        false
    }

    /// First-fit allocation. Writes the block's actual size (including
    /// the 8-byte header) into the header and returns a pointer past it.
    ///
    /// Returns null if no free block can satisfy the request.
    fn alloc_inner(&mut self, size: usize, align: usize) -> *mut u8 {
        let align = align.max(BLOCK_ALIGN);
        let want = align_up(size.max(ALLOC_HEADER_SIZE) + ALLOC_HEADER_SIZE, BLOCK_ALIGN)
            .max(MIN_BLOCK_SIZE);

        let mut prev: *mut FreeBlock = ptr::null_mut();
        let mut current = self.free_list;

        while !current.is_null() {
            let block_start = current as usize;
            let block_size = unsafe { (*current).size };
            let block_end = block_start + block_size;

            // The header sits at `block_start`; the payload pointer must
            // land on `align`. With `align == BLOCK_ALIGN` this is always
            // zero, since every block start is already 16-byte aligned.
            let header_start = align_up(block_start + ALLOC_HEADER_SIZE, align) - ALLOC_HEADER_SIZE;
            let alloc_end = header_start + want;

            if header_start >= block_start && alloc_end <= block_end {
                let next = unsafe { (*current).next };
                if prev.is_null() {
                    self.free_list = next;
                } else {
                    unsafe { (*prev).next = next };
                }

                // `front_gap` is always a multiple of `BLOCK_ALIGN` (block
                // starts are always 16-byte aligned), so it's either zero
                // or already large enough to track as its own free block.
                let front_gap = header_start - block_start;
                if front_gap > 0 {
                    self.insert_free_block(block_start, front_gap);
                }

                let back_gap = block_end - alloc_end;
                let real_size = if back_gap >= MIN_BLOCK_SIZE {
                    self.insert_free_block(alloc_end, back_gap);
                    want
                } else {
                    block_end - header_start
                };

                unsafe {
                    *(header_start as *mut usize) = real_size;
                }
                self.allocated_bytes += real_size;
                return (header_start + ALLOC_HEADER_SIZE) as *mut u8;
            }

            prev = current;
            current = unsafe { (*current).next };
        }

        ptr::null_mut()
    }

    /// Frees a block previously returned by `alloc_inner`. `block_start`
    /// and `size` have already been recovered from the header by the
    /// caller, which has also already checked for a double free.
    fn free_inner(&mut self, block_start: usize, size: usize) {
        self.allocated_bytes -= size;
        self.insert_free_block(block_start, size);
    }

    /// Inserts a free region into the free list, maintaining address order,
    /// and coalesces with adjacent blocks.
    fn insert_free_block(&mut self, addr: usize, size: usize) {
        debug_assert!(size >= MIN_BLOCK_SIZE);

        let new_block = addr as *mut FreeBlock;

        let mut prev: *mut FreeBlock = ptr::null_mut();
        let mut current = self.free_list;

        while !current.is_null() && (current as usize) < addr {
            prev = current;
            current = unsafe { (*current).next };
        }

        unsafe {
            (*new_block).size = size;
            (*new_block).next = current;
        }

        if prev.is_null() {
            self.free_list = new_block;
        } else {
            unsafe {
                (*prev).next = new_block;
            }
        }

        // Coalesce with successor.
        if !current.is_null() {
            let new_end = addr + unsafe { (*new_block).size };
            if new_end == current as usize {
                unsafe {
                    (*new_block).size += (*current).size;
                    (*new_block).next = (*current).next;
                }
            }
        }

        // Coalesce with predecessor.
        if !prev.is_null() {
            let prev_end = prev as usize + unsafe { (*prev).size };
            if prev_end == addr {
                unsafe {
                    (*prev).size += (*new_block).size;
                    (*prev).next = (*new_block).next;
                }
            }
        }
    }
}

// =============================================================================
// Global allocator
// =============================================================================

/// The kernel's global heap allocator.
///
/// Wraps the `Heap` in a `SpinLock` to satisfy `GlobalAlloc`'s `Sync`
/// requirement. All allocation/deallocation calls acquire the lock.
pub struct KernelAllocator {
    inner: SpinLock<Heap>,
}

impl KernelAllocator {
    /// Creates a new, uninitialized kernel allocator.
    const fn new() -> Self {
        Self {
            inner: SpinLock::new(Heap::new()),
        }
    }
}

/// SAFETY: The SpinLock ensures exclusive access to the Heap internals.
unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.inner.lock().alloc_inner(layout.size(), layout.align())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        free_checked(ptr);
    }
}

/// The global kernel heap allocator instance.
#[global_allocator]
static ALLOCATOR: KernelAllocator = KernelAllocator::new();

// =============================================================================
// Initialization
// =============================================================================

/// Maps the heap window and installs one free block spanning it.
///
/// `pages` is clamped to `[1, HEAP_WINDOW_PAGES]` — the window's virtual
/// address range is fixed at compile time, so a boot config asking for
/// more than that is satisfied as best effort rather than rejected.
///
/// # Panics
/// If the PMM runs out of physical frames, or the VMM runs out of frames
/// for intermediate page tables, while mapping the window — at this point
/// in boot that is unrecoverable.
///
/// # Prerequisites
/// - PMM must be initialized (`pmm::init()`)
/// - VMM must be initialized (`vmm::vmm_init()`), so `kernel_pagemap()` exists
pub fn init(pages: usize) {
    let pages = pages.clamp(1, HEAP_WINDOW_PAGES);
    let size = pages * PAGE_SIZE as usize;
    let pagemap = vmm::kernel_pagemap();
    let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::NO_EXECUTE;

    for i in 0..pages {
        let virt = VirtAddr::new(HEAP_WINDOW_BASE + i as u64 * PAGE_SIZE);
        let phys = pmm::alloc_frame().expect("Heap: out of physical frames mapping heap window");
        unsafe {
            vmm::map_page(pagemap, virt, phys, flags)
                .expect("Heap: out of memory mapping heap window");
        }
    }

    ALLOCATOR.inner.lock().init(HEAP_WINDOW_BASE as usize, size);

    kprintln!(
        "[heap] Kernel heap window mapped at {:#018X} ({} KiB)",
        HEAP_WINDOW_BASE,
        size / 1024
    );
}

/// Returns the number of bytes currently allocated from the kernel heap.
pub fn allocated_bytes() -> usize {
    ALLOCATOR.inner.lock().allocated_bytes
}

/// Returns the total size of the kernel heap window in bytes.
pub fn total_bytes() -> usize {
    ALLOCATOR.inner.lock().total_bytes
}

// =============================================================================
// Explicit kmalloc/kfree/kcalloc/krealloc entry points
// =============================================================================

/// Allocates `size` bytes, 16-byte aligned, from the kernel heap. Returns
/// null if no free block is large enough; the caller decides how to react.
pub fn kmalloc(size: usize) -> *mut u8 {
    ALLOCATOR.inner.lock().alloc_inner(size, BLOCK_ALIGN)
}

/// Frees a block previously returned by `kmalloc`/`kcalloc`/`krealloc`.
///
/// Validates that `ptr - 8` lies within the heap window, is aligned, and
/// carries a plausible size header, then checks the freed address isn't
/// already present in the free list — a double free — before reinserting
/// it. A corrupted pointer or a detected double free panics rather than
/// silently corrupting the free list.
pub fn kfree(ptr: *mut u8) {
    free_checked(ptr);
}

fn free_checked(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }

    let addr = ptr as usize;
    assert!(
        addr >= ALLOC_HEADER_SIZE,
        "Heap: kfree on a pointer with no room for a header"
    );
    let block_start = addr - ALLOC_HEADER_SIZE;

    let mut heap = ALLOCATOR.inner.lock();
    assert!(
        block_start >= heap.heap_start && block_start < heap.heap_end,
        "Heap: kfree on a pointer outside the heap window"
    );
    assert!(
        block_start % BLOCK_ALIGN == 0,
        "Heap: kfree on a misaligned pointer"
    );

    let size = unsafe { *(block_start as *const usize) };
    assert!(
        size >= MIN_BLOCK_SIZE && block_start + size <= heap.heap_end,
        "Heap: kfree recovered an implausible block size; pointer is corrupt"
    );
    assert!(
        !heap.is_on_free_list(block_start),
        "Heap: double free detected at {:#018X}",
        block_start
    );

    heap.free_inner(block_start, size);
}

/// Allocates space for `n` elements of `size` bytes each, zero-filled.
/// Returns null on overflow or if the allocation itself fails.
pub fn kcalloc(n: usize, size: usize) -> *mut u8 {
    let total = match n.checked_mul(size) {
        Some(t) => t,
        None => return ptr::null_mut(),
    };
    let p = kmalloc(total);
    if !p.is_null() {
        unsafe {
            ptr::write_bytes(p, 0, total);
        }
    }
    p
}

/// Resizes a previously allocated block to `new_size` bytes.
///
/// - `ptr` null: behaves like `kmalloc(new_size)`.
/// - `new_size` zero: frees `ptr` and returns null.
/// - Shrinking (new header-derived capacity suffices): returns `ptr` unchanged.
/// - Growing: allocates a new block, copies the old contents, frees the old block.
pub fn krealloc(ptr: *mut u8, new_size: usize) -> *mut u8 {
    if ptr.is_null() {
        return kmalloc(new_size);
    }
    if new_size == 0 {
        kfree(ptr);
        return ptr::null_mut();
    }

    let block_start = ptr as usize - ALLOC_HEADER_SIZE;
    let old_block_size = unsafe { *(block_start as *const usize) };
    let old_capacity = old_block_size - ALLOC_HEADER_SIZE;

    if new_size <= old_capacity {
        return ptr;
    }

    let new_ptr = kmalloc(new_size);
    if new_ptr.is_null() {
        return ptr::null_mut();
    }
    unsafe {
        ptr::copy_nonoverlapping(ptr, new_ptr, old_capacity);
    }
    kfree(ptr);
    new_ptr
}

// =============================================================================
// Alignment helper
// =============================================================================

/// Aligns `value` up to the nearest multiple of `align` (`align` a power of two).
#[inline]
const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

// =============================================================================
// OOM handler
// =============================================================================

/// Called by the `alloc` crate when an allocation fails (returns null).
///
/// In this kernel OOM is fatal — we can't swap to disk or ask anything to
/// free memory on our behalf. Panic with a diagnostic message.
#[alloc_error_handler]
fn alloc_error(layout: Layout) -> ! {
    panic!(
        "Kernel heap allocation failed: size={}, align={}",
        layout.size(),
        layout.align()
    );
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_heap(size: usize) -> Heap {
        let backing = vec![0u8; size].leak();
        let mut heap = Heap::new();
        heap.init(backing.as_mut_ptr() as usize, size);
        heap
    }

    #[test]
    fn alloc_and_free_conserves_total() {
        let mut heap = make_heap(4096);
        let a = heap.alloc_inner(32, 16);
        let b = heap.alloc_inner(64, 16);
        assert!(!a.is_null() && !b.is_null());
        assert_eq!(heap.allocated_bytes + free_list_total(&heap), heap.total_bytes);

        let a_size = unsafe { *((a as usize - ALLOC_HEADER_SIZE) as *const usize) };
        let b_size = unsafe { *((b as usize - ALLOC_HEADER_SIZE) as *const usize) };
        heap.free_inner(a as usize - ALLOC_HEADER_SIZE, a_size);
        heap.free_inner(b as usize - ALLOC_HEADER_SIZE, b_size);
        assert_eq!(heap.allocated_bytes, 0);
        assert_eq!(free_list_total(&heap), heap.total_bytes);
    }

    #[test]
    fn adjacent_frees_coalesce_into_one_block() {
        let mut heap = make_heap(4096);
        let a = heap.alloc_inner(32, 16);
        let b = heap.alloc_inner(64, 16);

        let a_size = unsafe { *((a as usize - ALLOC_HEADER_SIZE) as *const usize) };
        let b_size = unsafe { *((b as usize - ALLOC_HEADER_SIZE) as *const usize) };
        // Free in B, A order: both frees should coalesce into a single block
        // at least as large as their combined size once A is freed too.
        heap.free_inner(b as usize - ALLOC_HEADER_SIZE, b_size);
        heap.free_inner(a as usize - ALLOC_HEADER_SIZE, a_size);

        assert!(!heap.free_list.is_null());
        let only_block_size = unsafe { (*heap.free_list).size };
        assert!(only_block_size >= a_size + b_size);
    }

    #[test]
    fn is_on_free_list_detects_previously_freed_address() {
        let mut heap = make_heap(4096);
        let a = heap.alloc_inner(32, 16);
        let block_start = a as usize - ALLOC_HEADER_SIZE;
        let size = unsafe { *(block_start as *const usize) };
        heap.free_inner(block_start, size);
        assert!(heap.is_on_free_list(block_start));
    }

    fn free_list_total(heap: &Heap) -> usize {
        let mut total = 0;
        let mut current = heap.free_list;
        while !current.is_null() {
            total += unsafe { (*current).size };
            current = unsafe { (*current).next };
        }
        total
    }
}
