//! Copy-on-write fault resolution (design §4.7, §8).
//!
//! Every private writable mapping is marked read-only in both page
//! directories at fork; a write fault here either reclaims the frame
//! outright (nobody else still references it) or clones it into a fresh
//! frame owned solely by the faulting process.

use crate::error::{MmError, MmResult};
use crate::frame::{FrameAllocator, FrameId, FrameTable, FRAME_SIZE};
use crate::page_dir::PageDirectory;
use crate::vma_flags::Prot;

/// A byte-level view of physical frames, for operations (copy-on-write,
/// unlike a plain map/unmap) that need frame *contents* rather than just a
/// page-directory entry. Narrow on purpose: unlike
/// [`crate::page_dir::PageDirectoryFactory`] this needs no hardware beyond
/// a linear offset into already-mapped memory, so the kernel binary
/// supplies a real implementation (backed by the bootloader's HHDM
/// offset) instead of leaving it unfilled.
///
/// # Safety
/// Implementations must return a slice of exactly [`FRAME_SIZE`] bytes
/// that is actually backed by `frame`'s physical memory for the lifetime
/// of the borrow. Callers must not alias `frame_bytes` and
/// `frame_bytes_mut` for the same frame at once.
pub unsafe trait PhysMemory: Sync {
    unsafe fn frame_bytes(&self, frame: FrameId) -> &[u8];
    unsafe fn frame_bytes_mut(&self, frame: FrameId) -> &mut [u8];
}

pub fn is_cow_fault(page_dir: &dyn PageDirectory, fault_addr: u64) -> bool {
    page_dir.is_cow(fault_addr)
}

pub fn handle_cow_fault(
    page_dir: &mut dyn PageDirectory,
    frames: &FrameTable,
    allocator: &dyn FrameAllocator,
    phys: &dyn PhysMemory,
    fault_addr: u64,
) -> MmResult {
    if !page_dir.is_cow(fault_addr) {
        return Err(MmError::NotCowPage);
    }

    let old_frame = page_dir
        .frame_of(fault_addr)
        .ok_or(MmError::NotMapped { address: fault_addr })?;

    if frames.ref_count(old_frame) <= 1 {
        resolve_single_ref(page_dir, fault_addr, old_frame)
    } else {
        resolve_multi_ref(page_dir, frames, allocator, phys, fault_addr, old_frame)
    }
}

fn resolve_single_ref(
    page_dir: &mut dyn PageDirectory,
    fault_addr: u64,
    frame: crate::frame::FrameId,
) -> MmResult {
    page_dir.map(fault_addr, frame, Prot::READ | Prot::WRITE, false);
    page_dir.flush(fault_addr);
    Ok(())
}

fn resolve_multi_ref(
    page_dir: &mut dyn PageDirectory,
    frames: &FrameTable,
    allocator: &dyn FrameAllocator,
    phys: &dyn PhysMemory,
    fault_addr: u64,
    old_frame: FrameId,
) -> MmResult {
    let new_frame = allocator.alloc_zeroed().ok_or(MmError::NoMemory)?;

    // SAFETY: `old_frame` and `new_frame` are distinct frames, so the two
    // borrows below don't alias; both came from this call's own allocator
    // and page directory lookup, so nothing else touches them meanwhile
    // (design §5: one thread runs kernel code at a time).
    unsafe {
        let src = phys.frame_bytes(old_frame);
        debug_assert_eq!(src.len(), FRAME_SIZE as usize);
        let dst = phys.frame_bytes_mut(new_frame);
        dst.copy_from_slice(src);
    }

    page_dir.map(fault_addr, new_frame, Prot::READ | Prot::WRITE, false);
    page_dir.flush(fault_addr);
    frames.release(old_frame);
    Ok(())
}
#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::UnsafeCell;

    use crate::frame::BumpFrameAllocator;
    use crate::page_dir::fake::FakePageDirectory;

    /// Backs frames with a flat byte buffer indexed by physical address,
    /// the same shape a real HHDM-offset view has, just over plain heap
    /// memory instead of the bootloader's identity-mapped region.
    struct FakePhysMemory {
        backing: UnsafeCell<Vec<u8>>,
    }

    unsafe impl Sync for FakePhysMemory {}

    impl FakePhysMemory {
        fn new(frame_capacity: u64) -> Self {
            Self { backing: UnsafeCell::new(vec![0u8; (frame_capacity * FRAME_SIZE) as usize]) }
        }

        fn seed(&self, frame: FrameId, byte: u8) {
            let start = frame.phys_addr() as usize;
            unsafe { (*self.backing.get())[start..start + FRAME_SIZE as usize].fill(byte) };
        }
    }

    unsafe impl PhysMemory for FakePhysMemory {
        unsafe fn frame_bytes(&self, frame: FrameId) -> &[u8] {
            let start = frame.phys_addr() as usize;
            let backing = unsafe { &*self.backing.get() };
            &backing[start..start + FRAME_SIZE as usize]
        }

        unsafe fn frame_bytes_mut(&self, frame: FrameId) -> &mut [u8] {
            let start = frame.phys_addr() as usize;
            let backing = unsafe { &mut *self.backing.get() };
            &mut backing[start..start + FRAME_SIZE as usize]
        }
    }

    #[test]
    fn single_ref_page_becomes_writable_in_place() {
        let mut dir = FakePageDirectory::new();
        let frames = FrameTable::new();
        let allocator = BumpFrameAllocator::new(10, 4);
        let phys = FakePhysMemory::new(16);
        let frame = FrameId(1);
        frames.acquire(frame);
        dir.map(0x1000, frame, Prot::READ, true);

        handle_cow_fault(&mut dir, &frames, &allocator, &phys, 0x1000).unwrap();

        assert!(!dir.is_cow(0x1000));
        assert_eq!(dir.frame_of(0x1000), Some(frame));
        assert!(dir.protection_of(0x1000).is_writable());
    }

    #[test]
    fn shared_page_is_cloned_into_new_frame() {
        let mut dir = FakePageDirectory::new();
        let frames = FrameTable::new();
        let allocator = BumpFrameAllocator::new(10, 4);
        let phys = FakePhysMemory::new(16);
        let frame = FrameId(1);
        frames.acquire(frame);
        frames.acquire(frame); // parent and child both reference it
        dir.map(0x2000, frame, Prot::READ, true);

        handle_cow_fault(&mut dir, &frames, &allocator, &phys, 0x2000).unwrap();

        let new_frame = dir.frame_of(0x2000).unwrap();
        assert_ne!(new_frame, frame);
        assert_eq!(frames.ref_count(frame), 1);
        assert!(!dir.is_cow(0x2000));
    }

    #[test]
    fn cloned_frame_carries_the_old_frames_bytes() {
        let mut dir = FakePageDirectory::new();
        let frames = FrameTable::new();
        let allocator = BumpFrameAllocator::new(10, 4);
        let phys = FakePhysMemory::new(16);
        let frame = FrameId(1);
        frames.acquire(frame);
        frames.acquire(frame);
        phys.seed(frame, 0xAB);
        dir.map(0x2000, frame, Prot::READ, true);

        handle_cow_fault(&mut dir, &frames, &allocator, &phys, 0x2000).unwrap();

        let new_frame = dir.frame_of(0x2000).unwrap();
        let copied = unsafe { phys.frame_bytes(new_frame) };
        assert!(copied.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn non_cow_page_is_rejected() {
        let mut dir = FakePageDirectory::new();
        let frames = FrameTable::new();
        let allocator = BumpFrameAllocator::new(10, 4);
        let phys = FakePhysMemory::new(16);
        dir.map(0x3000, FrameId(2), Prot::READ | Prot::WRITE, false);

        let result = handle_cow_fault(&mut dir, &frames, &allocator, &phys, 0x3000);
        assert_eq!(result, Err(MmError::NotCowPage));
    }
}
