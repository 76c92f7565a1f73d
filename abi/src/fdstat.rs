//! Per-FD flags and the `fd_stat_{fget,fput}` wire shape (design §3, §4.4).

use bitflags::bitflags;

use crate::filetype::FileType;
use crate::rights::Rights;

bitflags! {
    /// FD-level flags, independent of the rights mask: non-blocking, append,
    /// and the three sync variants.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct FdFlags: u16 {
        const APPEND = 1 << 0;
        const NONBLOCK = 1 << 1;
        const SYNC = 1 << 2;
        const DSYNC = 1 << 3;
        const RSYNC = 1 << 4;
    }

    /// Which fields of `FdStat` a `fd_stat_put` call should update.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct FdStatPutFlags: u8 {
        const FLAGS = 1 << 0;
        const RIGHTS = 1 << 1;
    }
}

/// Attributes returned by `fd_stat_fget` / updated by `fd_stat_fput`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct FdStat {
    pub file_type: FileType,
    pub flags: FdFlags,
    pub rights_base: Rights,
    pub rights_inheriting: Rights,
}
