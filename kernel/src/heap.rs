//! The kernel heap: a bump allocator over the one usable memory region
//! the bootloader hands back, in the same never-reclaim early-boot spirit
//! as [`cosix_mm::BumpFrameAllocator`], just at byte instead of frame
//! granularity. `alloc-debug` wraps it with [`cosix_lib::alloc_debug::DebugAllocator`]
//! for guard-byte checking; release builds talk to it directly.

use core::alloc::{GlobalAlloc, Layout};
use core::sync::atomic::{AtomicUsize, Ordering};

/// Bump-allocates out of a single virtual address range set once by
/// [`BumpHeap::init`]. Never frees: matches the kernel's only user of a
/// comparable allocator (`cosix_mm::frame::BumpFrameAllocator`), which
/// exists for exactly the same "before a reclaiming allocator is wired
/// up" reason.
pub struct BumpHeap {
    next: AtomicUsize,
    end: AtomicUsize,
}

impl BumpHeap {
    pub const fn new() -> Self {
        Self { next: AtomicUsize::new(0), end: AtomicUsize::new(0) }
    }

    /// Must run exactly once, before the first allocation, with the
    /// virtual address range of a region the bootloader reported usable.
    pub fn init(&self, start: usize, len: usize) {
        self.next.store(start, Ordering::Relaxed);
        self.end.store(start + len, Ordering::Relaxed);
    }
}

impl Default for BumpHeap {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for BumpHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let end = self.end.load(Ordering::Relaxed);
        loop {
            let current = self.next.load(Ordering::Relaxed);
            let aligned = (current + layout.align() - 1) & !(layout.align() - 1);
            let Some(new_next) = aligned.checked_add(layout.size()) else {
                return core::ptr::null_mut();
            };
            if new_next > end {
                return core::ptr::null_mut();
            }
            if self.next.compare_exchange_weak(current, new_next, Ordering::Relaxed, Ordering::Relaxed).is_ok() {
                return aligned as *mut u8;
            }
        }
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {}
}

#[cfg(not(feature = "alloc-debug"))]
#[global_allocator]
static ALLOCATOR: BumpHeap = BumpHeap::new();

#[cfg(feature = "alloc-debug")]
#[global_allocator]
static ALLOCATOR: cosix_lib::alloc_debug::DebugAllocator<BumpHeap> = cosix_lib::alloc_debug::DebugAllocator::new(BumpHeap::new());

/// Reaches through the `alloc-debug` wrapper (if present) to the
/// underlying [`BumpHeap`] so boot can call [`BumpHeap::init`] exactly
/// once, regardless of which allocator is actually installed.
pub fn init(start: usize, len: usize) {
    #[cfg(not(feature = "alloc-debug"))]
    ALLOCATOR.init(start, len);
    #[cfg(feature = "alloc-debug")]
    ALLOCATOR.inner().init(start, len);
}
