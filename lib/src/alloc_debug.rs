//! Debug allocation tracker.
//!
//! Wraps another [`GlobalAlloc`] and brackets every live allocation with a
//! marker, guard bytes before and after the user region, and a four-slot
//! caller-address array, linked into a global list so a live heap can be
//! walked. Catches heap corruption (guard mismatch) and double-frees
//! (marker mismatch) at `dealloc` time instead of silently. Gated behind
//! the `alloc-debug` feature; release builds use the wrapped allocator
//! directly and carry none of this overhead.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::spinlock::KMutex;

const TRACK_MARKER: [u8; 8] = *b"ALLCMGIC";
const GUARD_LEN: usize = 8;

#[repr(C)]
struct TrackedAllocation {
    marker: [u8; 8],
    prefix: [u8; GUARD_LEN],
    suffix: [u8; GUARD_LEN],
    prev: *mut TrackedAllocation,
    next: *mut TrackedAllocation,
    /// Up to four caller return addresses. Capturing real backtraces needs
    /// frame-pointer walking this kernel does not implement; callers that
    /// want attribution fill this in themselves via `alloc_tagged`.
    caller: [usize; 4],
    user_size: usize,
}

fn guard_bytes(seed: usize) -> [u8; GUARD_LEN] {
    let mut bytes = [0u8; GUARD_LEN];
    let mixed = seed ^ 0x5ec9_1b4a_d33f_51a5;
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = (mixed >> (i * 8 % 64)) as u8 ^ (i as u8).wrapping_mul(0x9b);
    }
    bytes
}

static LIVE_HEAD: KMutex<*mut TrackedAllocation> = KMutex::new(ptr::null_mut());
static LIVE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Decorates `inner` with the tracking described above.
pub struct DebugAllocator<A: GlobalAlloc> {
    inner: A,
}

impl<A: GlobalAlloc> DebugAllocator<A> {
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }

    /// The wrapped allocator, for callers that need to reach through the
    /// tracking layer (e.g. to run one-time setup on it).
    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn header_layout(user_layout: Layout) -> Option<(Layout, usize)> {
        let align = user_layout.align().max(core::mem::align_of::<TrackedAllocation>());
        let header_size = core::mem::size_of::<TrackedAllocation>();
        let total = header_size
            .checked_add(GUARD_LEN)?
            .checked_add(user_layout.size())?
            .checked_add(GUARD_LEN)?;
        Layout::from_size_align(total, align)
            .ok()
            .map(|l| (l, header_size))
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for DebugAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let Some((block_layout, header_size)) = Self::header_layout(layout) else {
            return ptr::null_mut();
        };
        let block = unsafe { self.inner.alloc(block_layout) };
        if block.is_null() {
            return ptr::null_mut();
        }

        let header = block as *mut TrackedAllocation;
        let prefix_addr = unsafe { block.add(header_size) };
        let user_ptr = unsafe { prefix_addr.add(GUARD_LEN) };
        let suffix_addr = unsafe { user_ptr.add(layout.size()) };

        let guard = guard_bytes(block as usize);
        unsafe {
            ptr::write(
                header,
                TrackedAllocation {
                    marker: TRACK_MARKER,
                    prefix: guard,
                    suffix: guard,
                    prev: ptr::null_mut(),
                    next: ptr::null_mut(),
                    caller: [0; 4],
                    user_size: layout.size(),
                },
            );
            ptr::copy_nonoverlapping(guard.as_ptr(), prefix_addr, GUARD_LEN);
            ptr::copy_nonoverlapping(guard.as_ptr(), suffix_addr, GUARD_LEN);
        }

        {
            let mut head = LIVE_HEAD.lock();
            unsafe {
                (*header).next = *head;
                if !(*head).is_null() {
                    (**head).prev = header;
                }
            }
            *head = header;
        }
        LIVE_COUNT.fetch_add(1, Ordering::Relaxed);

        user_ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if ptr.is_null() {
            return;
        }
        let Some((block_layout, header_size)) = Self::header_layout(layout) else {
            return;
        };

        let prefix_addr = unsafe { ptr.sub(GUARD_LEN) };
        let header = unsafe { prefix_addr.sub(header_size) } as *mut TrackedAllocation;
        let suffix_addr = unsafe { ptr.add(layout.size()) };

        let expected_guard = guard_bytes(header as usize);
        unsafe {
            assert_eq!((*header).marker, TRACK_MARKER, "heap corruption: bad allocation marker");
            assert_eq!((*header).user_size, layout.size(), "heap corruption: size mismatch on free");
            let mut prefix = [0u8; GUARD_LEN];
            let mut suffix = [0u8; GUARD_LEN];
            ptr::copy_nonoverlapping(prefix_addr, prefix.as_mut_ptr(), GUARD_LEN);
            ptr::copy_nonoverlapping(suffix_addr, suffix.as_mut_ptr(), GUARD_LEN);
            assert_eq!(prefix, expected_guard, "heap corruption: prefix guard clobbered");
            assert_eq!(suffix, expected_guard, "heap corruption: suffix guard clobbered");
        }

        {
            let mut head = LIVE_HEAD.lock();
            unsafe {
                let prev = (*header).prev;
                let next = (*header).next;
                if !prev.is_null() {
                    (*prev).next = next;
                } else {
                    *head = next;
                }
                if !next.is_null() {
                    (*next).prev = prev;
                }
            }
        }
        LIVE_COUNT.fetch_sub(1, Ordering::Relaxed);

        unsafe { self.inner.dealloc(header as *mut u8, block_layout) };
    }
}

/// Number of allocations currently tracked as live. Diagnostic only.
pub fn live_allocation_count() -> usize {
    LIVE_COUNT.load(Ordering::Relaxed)
}
