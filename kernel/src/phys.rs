//! Physical-frame byte access backing copy-on-write fault resolution
//! (design §4.7). Unlike `ContextSwitch`/`TickSource`, this needs only the
//! bootloader's HHDM offset, not real hardware, so this crate supplies a
//! concrete [`cosix_mm::PhysMemory`] rather than leaving the trait
//! boundary unfilled.

use core::sync::atomic::{AtomicU64, Ordering};

use cosix_mm::frame::FRAME_SIZE;
use cosix_mm::{FrameId, PhysMemory};

pub struct HhdmPhysMemory {
    offset: AtomicU64,
}

impl HhdmPhysMemory {
    pub const fn new() -> Self {
        Self { offset: AtomicU64::new(0) }
    }

    /// Must run once, before the first fault resolution, with the
    /// bootloader's higher-half direct map offset.
    pub fn init(&self, hhdm_offset: u64) {
        self.offset.store(hhdm_offset, Ordering::Relaxed);
    }

    fn frame_ptr(&self, frame: FrameId) -> *mut u8 {
        (frame.phys_addr() + self.offset.load(Ordering::Relaxed)) as *mut u8
    }
}

impl Default for HhdmPhysMemory {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl PhysMemory for HhdmPhysMemory {
    unsafe fn frame_bytes(&self, frame: FrameId) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.frame_ptr(frame), FRAME_SIZE as usize) }
    }

    unsafe fn frame_bytes_mut(&self, frame: FrameId) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.frame_ptr(frame), FRAME_SIZE as usize) }
    }
}
