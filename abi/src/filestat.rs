//! `file_stat_get` wire shape and path-lookup flags (design §4.4, §4.8).

use bitflags::bitflags;

use crate::filetype::FileType;

/// A (device, inode) pair uniquely identifies a file within this boot.
/// Two FDs naming the same underlying file report the same pair (used by
/// the round-trip law in design §8: FD passing preserves device/inode).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct FileStat {
    pub device: u64,
    pub inode: u64,
    pub file_type: FileType,
    pub num_links: u32,
    pub size: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
}

impl FileStat {
    pub const fn new(device: u64, inode: u64, file_type: FileType, size: u64) -> Self {
        Self {
            device,
            inode,
            file_type,
            num_links: 1,
            size,
            atime: 0,
            mtime: 0,
            ctime: 0,
        }
    }
}

impl Default for FileType {
    fn default() -> Self {
        FileType::Unknown
    }
}

bitflags! {
    /// Flags controlling symlink resolution for one path component.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct LookupFlags: u8 {
        /// Follow a symlink found as the final path component.
        const SYMLINK_FOLLOW = 1 << 0;
    }
}

/// The bundle `openat` needs in addition to the raw path: the directory FD
/// rights check is performed by the caller before this reaches the FD.
#[derive(Clone, Copy, Debug)]
pub struct OpenAt<'a> {
    pub path: &'a [u8],
    pub lookup: LookupFlags,
}
