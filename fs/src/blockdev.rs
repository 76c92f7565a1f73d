//! Block device FD (design §2 "...block device... FDs", §6 non-goal "a
//! write-capable block device path").
//!
//! Grounded in `original_source/blockdev/blockdev.cpp`: `pread` converts a
//! byte count/offset into a sector range and rejects anything not aligned to
//! [`SECTOR_SIZE`], matching the original's `EINVAL` on a non-sector-multiple
//! request. Writes are never implemented — the default
//! [`FileDescriptor::pwrite`] failing not-supported is exactly the
//! behaviour this device wants, so `BlockDev` does not override it.

use alloc::sync::Arc;
use alloc::vec;
use core::sync::atomic::{AtomicU16, Ordering};

use cosix_abi::iovec::{copy_into_iovecs, iovecs_capacity};
use cosix_abi::{Errno, FdFlags, FileStat, FileType, IoVecMut};

use crate::config::SECTOR_SIZE;
use crate::error::{FsResult, KernelError};
use crate::fd::FileDescriptor;

/// The sector-granular read boundary a block device or partition exposes.
/// Implemented by the real disk driver (out of scope here) and by
/// [`crate::partition::Partition`], which layers relative addressing over
/// another `SectorDevice` instead of subclassing a concrete device type.
pub trait SectorDevice: Send + Sync {
    fn sector_size(&self) -> u64 {
        SECTOR_SIZE
    }

    fn sector_count(&self) -> u64;

    /// `buf.len()` is always a multiple of [`Self::sector_size`].
    fn read_sectors(&self, lba: u64, buf: &mut [u8]) -> FsResult<()>;
}

pub struct BlockDev {
    device: Arc<dyn SectorDevice>,
    flags: AtomicU16,
}

impl BlockDev {
    pub fn new(device: Arc<dyn SectorDevice>, flags: FdFlags) -> Arc<Self> {
        Arc::new(Self { device, flags: AtomicU16::new(flags.bits()) })
    }
}

impl FileDescriptor for BlockDev {
    fn file_type(&self) -> FileType {
        FileType::BlockDevice
    }

    fn flags(&self) -> FdFlags {
        FdFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed))
    }

    fn set_flags(&self, flags: FdFlags) {
        self.flags.store(flags.bits(), Ordering::Relaxed);
    }

    fn stat_get(&self) -> FsResult<FileStat> {
        let size = self.device.sector_count() * self.device.sector_size();
        Ok(FileStat::new(0, 0, FileType::BlockDevice, size))
    }

    fn pread(&self, iovs: &mut [IoVecMut<'_>], offset: u64) -> FsResult<usize> {
        let count = iovecs_capacity(iovs) as u64;
        if count == 0 {
            return Ok(0);
        }
        let sector_size = self.device.sector_size();
        if count % sector_size != 0 || offset % sector_size != 0 {
            return Err(KernelError::Errno(Errno::Inval));
        }
        let lba = offset / sector_size;
        let mut buf = vec![0u8; count as usize];
        self.device.read_sectors(lba, &mut buf)?;
        let (bytes, _) = copy_into_iovecs(iovs, &buf);
        Ok(bytes)
    }
}
