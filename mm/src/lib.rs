#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod cow;
pub mod error;
pub mod frame;
pub mod mmap;
pub mod page_dir;
pub mod range_alloc;
pub mod vma_flags;
pub mod vma_tree;

pub use cow::PhysMemory;
pub use error::{MmError, MmResult};
pub use frame::{BumpFrameAllocator, FrameAllocator, FrameId, FrameTable};
pub use mmap::{AddressSpace, FileBackedLoader, MemMapRequest, SyncMode};
pub use page_dir::{PageDirectory, PageDirectoryFactory};
pub use range_alloc::RangeAllocator;
pub use vma_flags::{Backing, Prot, Visibility};
pub use vma_tree::{Vma, VmaTree};
