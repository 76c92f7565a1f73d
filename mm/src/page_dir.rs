//! Per-process page directory abstraction.
//!
//! The x86 page-table bit layout is out of scope for this kernel; what the
//! rest of `cosix-mm` needs from "the page directory" is a small, arch-
//! agnostic contract: map a virtual page to a frame with some protection,
//! query or change that mapping, and flush the TLB entry. A concrete
//! x86_64 implementation plugs in at boot; tests use an in-memory fake.

use crate::frame::FrameId;
use crate::vma_flags::Prot;

/// Exclusively owned by one process (design §5); no synchronisation here.
pub trait PageDirectory {
    fn is_mapped(&self, vaddr: u64) -> bool;
    fn frame_of(&self, vaddr: u64) -> Option<FrameId>;
    fn is_cow(&self, vaddr: u64) -> bool;
    fn protection_of(&self, vaddr: u64) -> Prot;

    /// Map `vaddr` to `frame` with `prot`. `cow` marks the mapping
    /// read-only-but-logically-writable, pending a COW fault.
    fn map(&mut self, vaddr: u64, frame: FrameId, prot: Prot, cow: bool);

    /// Change protection on an already-mapped page, clearing any COW mark.
    fn reprotect(&mut self, vaddr: u64, prot: Prot);

    fn unmap(&mut self, vaddr: u64);

    /// Drop interrupts/TLB state associated with `vaddr`. A no-op fake is
    /// fine off real hardware.
    fn flush(&mut self, vaddr: u64);
}

/// Builds a fresh, empty page directory for a new process (design §4.5
/// `proc_fork`). Out of scope for the same reason [`PageDirectory`] itself
/// is: the concrete table format is architecture-specific, so the kernel
/// binary crate supplies the real implementation.
pub trait PageDirectoryFactory: Sync {
    fn new_directory(&self) -> alloc::boxed::Box<dyn PageDirectory>;
}

/// Lets callers that don't want to carry a `P: PageDirectory` generic all
/// the way up (e.g. a process table holding many differently-typed
/// directories) store `AddressSpace<alloc::boxed::Box<dyn PageDirectory>>`
/// instead.
impl PageDirectory for alloc::boxed::Box<dyn PageDirectory> {
    fn is_mapped(&self, vaddr: u64) -> bool {
        (**self).is_mapped(vaddr)
    }

    fn frame_of(&self, vaddr: u64) -> Option<FrameId> {
        (**self).frame_of(vaddr)
    }

    fn is_cow(&self, vaddr: u64) -> bool {
        (**self).is_cow(vaddr)
    }

    fn protection_of(&self, vaddr: u64) -> Prot {
        (**self).protection_of(vaddr)
    }

    fn map(&mut self, vaddr: u64, frame: FrameId, prot: Prot, cow: bool) {
        (**self).map(vaddr, frame, prot, cow)
    }

    fn reprotect(&mut self, vaddr: u64, prot: Prot) {
        (**self).reprotect(vaddr, prot)
    }

    fn unmap(&mut self, vaddr: u64) {
        (**self).unmap(vaddr)
    }

    fn flush(&mut self, vaddr: u64) {
        (**self).flush(vaddr)
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use alloc::collections::BTreeMap;

    #[derive(Clone, Copy)]
    struct Entry {
        frame: FrameId,
        prot: Prot,
        cow: bool,
    }

    #[derive(Default)]
    pub struct FakePageDirectory {
        entries: BTreeMap<u64, Entry>,
    }

    impl FakePageDirectory {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl PageDirectory for FakePageDirectory {
        fn is_mapped(&self, vaddr: u64) -> bool {
            self.entries.contains_key(&vaddr)
        }

        fn frame_of(&self, vaddr: u64) -> Option<FrameId> {
            self.entries.get(&vaddr).map(|e| e.frame)
        }

        fn is_cow(&self, vaddr: u64) -> bool {
            self.entries.get(&vaddr).map(|e| e.cow).unwrap_or(false)
        }

        fn protection_of(&self, vaddr: u64) -> Prot {
            self.entries.get(&vaddr).map(|e| e.prot).unwrap_or(Prot::NONE)
        }

        fn map(&mut self, vaddr: u64, frame: FrameId, prot: Prot, cow: bool) {
            self.entries.insert(vaddr, Entry { frame, prot, cow });
        }

        fn reprotect(&mut self, vaddr: u64, prot: Prot) {
            if let Some(entry) = self.entries.get_mut(&vaddr) {
                entry.prot = prot;
                entry.cow = false;
            }
        }

        fn unmap(&mut self, vaddr: u64) {
            self.entries.remove(&vaddr);
        }

        fn flush(&mut self, _vaddr: u64) {}
    }
}
