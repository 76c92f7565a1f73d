//! The capability rights bitmask carried by every FD mapping (design §3).

use bitflags::bitflags;

bitflags! {
    /// A capability bitmask, at most 64 bits wide. Rights are monotonically
    /// non-increasing across `fd_dup`/`fd_replace`/`fd_stat_put`: no
    /// operation may grant a right the source mapping didn't already hold.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct Rights: u64 {
        const FD_DATASYNC = 1 << 0;
        const FD_READ = 1 << 1;
        const FD_SEEK = 1 << 2;
        const FD_FDSTAT_PUT_FLAGS = 1 << 3;
        const FD_SYNC = 1 << 4;
        const FD_TELL = 1 << 5;
        const FD_WRITE = 1 << 6;
        const FILE_ADVISE = 1 << 7;
        const FILE_ALLOCATE = 1 << 8;
        const FILE_CREATE_DIRECTORY = 1 << 9;
        const FILE_CREATE_FILE = 1 << 10;
        const FILE_LINK_SOURCE = 1 << 11;
        const FILE_LINK_TARGET = 1 << 12;
        const FILE_OPEN = 1 << 13;
        const FILE_READDIR = 1 << 14;
        const FILE_READLINK = 1 << 15;
        const FILE_RENAME_SOURCE = 1 << 16;
        const FILE_RENAME_TARGET = 1 << 17;
        const FILE_STAT_FGET = 1 << 18;
        const FILE_STAT_FPUT_SIZE = 1 << 19;
        const FILE_STAT_FPUT_TIMES = 1 << 20;
        const FILE_STAT_GET = 1 << 21;
        const FILE_STAT_PUT_TIMES = 1 << 22;
        const FILE_SYMLINK = 1 << 23;
        const FILE_UNLINK = 1 << 24;
        const MEM_MAP = 1 << 25;
        const MEM_MAP_EXEC = 1 << 26;
        const POLL_FD_READWRITE = 1 << 27;
        const SOCK_ACCEPT = 1 << 28;
        const SOCK_BIND = 1 << 29;
        const SOCK_CONNECT = 1 << 30;
        const SOCK_LISTEN = 1 << 31;
        const SOCK_SHUTDOWN = 1 << 32;
        const SOCK_STAT_GET = 1 << 33;
        const SOCK_RECV = 1 << 34;
        const SOCK_SEND = 1 << 35;
    }
}

impl Rights {
    /// The typical rights set for a regular file opened read-write.
    pub const REGULAR_FILE_BASE: Rights = Rights::FD_READ
        .union(Rights::FD_WRITE)
        .union(Rights::FD_SEEK)
        .union(Rights::FD_TELL)
        .union(Rights::FD_SYNC)
        .union(Rights::FD_DATASYNC)
        .union(Rights::FD_FDSTAT_PUT_FLAGS)
        .union(Rights::FILE_STAT_FGET)
        .union(Rights::FILE_STAT_FPUT_SIZE)
        .union(Rights::FILE_STAT_FPUT_TIMES)
        .union(Rights::FILE_ALLOCATE)
        .union(Rights::FILE_ADVISE)
        .union(Rights::MEM_MAP)
        .union(Rights::POLL_FD_READWRITE);

    /// The typical rights set for a directory FD.
    pub const DIRECTORY_BASE: Rights = Rights::FILE_OPEN
        .union(Rights::FILE_READDIR)
        .union(Rights::FILE_CREATE_DIRECTORY)
        .union(Rights::FILE_CREATE_FILE)
        .union(Rights::FILE_LINK_SOURCE)
        .union(Rights::FILE_LINK_TARGET)
        .union(Rights::FILE_RENAME_SOURCE)
        .union(Rights::FILE_RENAME_TARGET)
        .union(Rights::FILE_SYMLINK)
        .union(Rights::FILE_READLINK)
        .union(Rights::FILE_UNLINK)
        .union(Rights::FILE_STAT_FGET)
        .union(Rights::FILE_STAT_GET)
        .union(Rights::FD_SYNC)
        .union(Rights::POLL_FD_READWRITE);

    /// The typical rights set for a freshly connected or accepted socket.
    pub const SOCK_BASE: Rights = Rights::FD_READ
        .union(Rights::FD_WRITE)
        .union(Rights::SOCK_RECV)
        .union(Rights::SOCK_SEND)
        .union(Rights::SOCK_SHUTDOWN)
        .union(Rights::SOCK_STAT_GET)
        .union(Rights::POLL_FD_READWRITE);

    /// Returns true if `self` grants every right in `required`.
    #[inline]
    pub fn grants(self, required: Rights) -> bool {
        self.contains(required)
    }
}
