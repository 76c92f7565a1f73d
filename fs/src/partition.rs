//! Disk partition addressing (design §2 "...partition... FDs").
//!
//! Grounded in `original_source/blockdev/partition.cpp`: a partition is a
//! sub-range of another block device, translating relative LBAs to absolute
//! ones and bounds-checking against its own size. The original makes
//! `partition` a `blockdev` subclass; here `Partition` only implements
//! [`SectorDevice`] and is handed to [`crate::blockdev::BlockDev::new`] to
//! become an FD the same way any other disk is, per design REDESIGN FLAGS
//! ("compose... as a struct with a callback, not as a base class").

use alloc::sync::Arc;

use cosix_abi::Errno;

use crate::blockdev::SectorDevice;
use crate::error::{FsResult, KernelError};

pub struct Partition {
    device: Arc<dyn SectorDevice>,
    lba_offset: u64,
    sector_count: u64,
}

impl Partition {
    pub fn new(device: Arc<dyn SectorDevice>, lba_offset: u64, sector_count: u64) -> Arc<Self> {
        Arc::new(Self { device, lba_offset, sector_count })
    }
}

impl SectorDevice for Partition {
    fn sector_size(&self) -> u64 {
        self.device.sector_size()
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn read_sectors(&self, lba: u64, buf: &mut [u8]) -> FsResult<()> {
        let sectors = buf.len() as u64 / self.sector_size();
        let in_range = match lba.checked_add(sectors) {
            Some(end) => end <= self.sector_count,
            None => false,
        };
        if !in_range {
            return Err(KernelError::Errno(Errno::Inval));
        }
        self.device.read_sectors(lba + self.lba_offset, buf)
    }
}
