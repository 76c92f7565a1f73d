//! `mem_map` / `mem_protect` / `mem_unmap` / `mem_sync` (design §4.7).
//!
//! Rights validation against the calling FD ("the FD must grant at least R
//! ... plus `mem_map`/`mem_map_exec` rights") happens one layer up, in the
//! syscall handler that already has the process's FD table in hand; this
//! module only implements the geometry once a request is known-valid.

use cosix_abi::PAGE_SIZE;

use crate::error::{MmError, MmResult};
use crate::frame::{FrameAllocator, FrameId, FrameTable};
use crate::page_dir::PageDirectory;
use crate::range_alloc::RangeAllocator;
use crate::vma_flags::{Backing, Prot, Visibility};
use crate::vma_tree::{Vma, VmaTree};

fn align_up(value: u64) -> u64 {
    (value + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

fn is_page_aligned(value: u64) -> bool {
    value % PAGE_SIZE == 0
}

pub struct MemMapRequest {
    pub addr_hint: u64,
    pub len: u64,
    pub prot: Prot,
    pub fixed: bool,
    pub visibility: Visibility,
    pub backing: Backing,
}

/// Flags for `mem_sync`; accepted for argument validation but otherwise a
/// no-op since this kernel has no write-back path (design §6: "no disk
/// writes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Async,
    Sync,
}

/// Loads the bytes backing a file-mapped page. The syscall layer supplies
/// this (it owns the FD table and can issue `pread`); `cosix-mm` never
/// talks to an FD directly, keeping the crate dependency one-directional.
pub trait FileBackedLoader {
    fn load_page(&self, fd: u32, file_offset: u64) -> MmResult<FrameId>;
}

/// One process's memory mappings, page directory, and address picker.
pub struct AddressSpace<P: PageDirectory> {
    pub tree: VmaTree,
    pub page_dir: P,
    pub range_alloc: RangeAllocator,
}

impl<P: PageDirectory> AddressSpace<P> {
    pub fn new(page_dir: P, floor: u64, ceiling: u64) -> Self {
        Self {
            tree: VmaTree::new(),
            page_dir,
            range_alloc: RangeAllocator::new(floor, ceiling),
        }
    }

    pub fn mem_map(
        &mut self,
        frames: &FrameTable,
        allocator: &dyn FrameAllocator,
        loader: Option<&dyn FileBackedLoader>,
        req: MemMapRequest,
    ) -> MmResult<u64> {
        if !req.prot.is_valid_request() {
            return Err(MmError::InvalidArgument);
        }
        if req.len == 0 {
            return Err(MmError::InvalidArgument);
        }
        if matches!(req.backing, Backing::Anonymous) && req.fixed && !is_page_aligned(req.addr_hint)
        {
            return Err(MmError::NotAligned {
                address: req.addr_hint,
                required: PAGE_SIZE,
            });
        }

        let len = align_up(req.len);

        let addr = if req.fixed {
            if !is_page_aligned(req.addr_hint) {
                return Err(MmError::NotAligned {
                    address: req.addr_hint,
                    required: PAGE_SIZE,
                });
            }
            req.addr_hint
        } else {
            self.range_alloc
                .find_free(&self.tree, len)
                .ok_or(MmError::NoMemory)?
        };

        let vma = Vma {
            start: addr,
            len,
            prot: req.prot,
            visibility: req.visibility,
            backing: req.backing,
        };

        if req.fixed {
            self.tree.insert_fixed(vma);
        } else if !self.tree.insert_non_overlapping(vma) {
            return Err(MmError::AlreadyMapped { address: addr });
        }

        let page_count = len / PAGE_SIZE;
        for i in 0..page_count {
            let vaddr = addr + i * PAGE_SIZE;
            let frame = match req.backing {
                Backing::Anonymous => allocator.alloc_zeroed().ok_or(MmError::NoMemory)?,
                Backing::File { fd, offset } => {
                    let loader = loader.ok_or(MmError::InvalidArgument)?;
                    loader.load_page(fd, offset + i * PAGE_SIZE)?
                }
            };
            frames.acquire(frame);
            self.page_dir.map(vaddr, frame, req.prot, false);
        }

        Ok(addr)
    }

    pub fn mem_protect(&mut self, addr: u64, len: u64, prot: Prot) -> MmResult {
        if !prot.is_valid_request() {
            return Err(MmError::InvalidArgument);
        }
        if !is_page_aligned(addr) {
            return Err(MmError::NotAligned { address: addr, required: PAGE_SIZE });
        }
        let len = align_up(len);
        let end = addr + len;

        if !self.tree.fully_covers(addr, end) {
            return Err(MmError::NoVma);
        }

        self.tree.set_protection(addr, end, prot);

        let page_count = len / PAGE_SIZE;
        for i in 0..page_count {
            let vaddr = addr + i * PAGE_SIZE;
            self.page_dir.reprotect(vaddr, prot);
            self.page_dir.flush(vaddr);
        }
        Ok(())
    }

    pub fn mem_unmap(&mut self, frames: &FrameTable, allocator: &dyn FrameAllocator, addr: u64, len: u64) -> MmResult {
        if !is_page_aligned(addr) {
            return Err(MmError::NotAligned { address: addr, required: PAGE_SIZE });
        }
        let len = align_up(len);
        let end = addr + len;

        let page_count = len / PAGE_SIZE;
        for i in 0..page_count {
            let vaddr = addr + i * PAGE_SIZE;
            if let Some(frame) = self.page_dir.frame_of(vaddr) {
                self.page_dir.unmap(vaddr);
                self.page_dir.flush(vaddr);
                if frames.release(frame) == 0 {
                    allocator.free(frame);
                }
            }
        }

        self.tree.clear_range(addr, end);
        Ok(())
    }

    /// `mem_sync` and `mem_advise` are accepted for argument validation
    /// only (design §4.7: `mem_advise` "a no-op except for argument
    /// validation"; design §6 notes there is no disk write-back path).
    pub fn mem_sync(&self, addr: u64, len: u64, _mode: SyncMode) -> MmResult {
        if !is_page_aligned(addr) || len == 0 {
            return Err(MmError::InvalidArgument);
        }
        if !self.tree.fully_covers(addr, addr + align_up(len)) {
            return Err(MmError::NoVma);
        }
        Ok(())
    }

    pub fn mem_advise(&self, addr: u64, len: u64) -> MmResult {
        if !is_page_aligned(addr) || len == 0 {
            return Err(MmError::InvalidArgument);
        }
        Ok(())
    }

    /// Build the child side of `fork` (design §4.5, §4.7 "COW at fork"):
    /// every private writable mapping is marked read-only in both
    /// directories and its frames shared until a write fault splits them;
    /// shared mappings and read-only private mappings are simply aliased,
    /// since nothing needs to split later.
    pub fn fork(&mut self, mut child_page_dir: P, frames: &FrameTable) -> Self {
        let mut child_tree = VmaTree::new();
        for vma in self.tree.iter().copied().collect::<alloc::vec::Vec<_>>() {
            let page_count = vma.len / PAGE_SIZE;
            let make_cow = vma.visibility == Visibility::Private && vma.prot.is_writable();
            for i in 0..page_count {
                let vaddr = vma.start + i * PAGE_SIZE;
                let Some(frame) = self.page_dir.frame_of(vaddr) else {
                    continue;
                };
                frames.acquire(frame);
                if make_cow {
                    self.page_dir.map(vaddr, frame, vma.prot, true);
                    self.page_dir.flush(vaddr);
                    child_page_dir.map(vaddr, frame, vma.prot, true);
                } else {
                    child_page_dir.map(vaddr, frame, vma.prot, false);
                }
            }
            child_tree.insert_fixed(vma);
        }

        Self {
            tree: child_tree,
            page_dir: child_page_dir,
            range_alloc: self.range_alloc,
        }
    }
}
