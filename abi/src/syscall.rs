//! Syscall number definitions (kernel-userland ABI).
//!
//! This module is the single source of truth for every syscall number the
//! dispatcher (`cosix_core::syscall::dispatch`) understands. Numbers follow
//! the CloudABI numeric registry named in design §6; userland stub
//! libraries would import from here to stay in sync with the kernel.

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyscallNo {
    ClockResGet = 0,
    ClockTimeGet = 1,
    CondvarSignal = 2,

    FdClose = 10,
    FdCreate1 = 11,
    FdCreate2 = 12,
    FdDatasync = 13,
    FdDup = 14,
    FdPread = 15,
    FdPwrite = 16,
    FdRead = 17,
    FdReplace = 18,
    FdSeek = 19,
    FdStatGet = 20,
    FdStatPut = 21,
    FdSync = 22,
    FdWrite = 23,

    FileAdvise = 30,
    FileAllocate = 31,
    FileCreate = 32,
    FileLink = 33,
    FileOpen = 34,
    FileReaddir = 35,
    FileReadlink = 36,
    FileRename = 37,
    FileStatFget = 38,
    FileStatFput = 39,
    FileStatGet = 40,
    FileStatPut = 41,
    FileSymlink = 42,
    FileUnlink = 43,

    LockUnlock = 50,

    MemAdvise = 60,
    MemLock = 61,
    MemMap = 62,
    MemProtect = 63,
    MemSync = 64,
    MemUnlock = 65,
    MemUnmap = 66,

    Poll = 70,
    PollFd = 71,

    ProcExec = 80,
    ProcExit = 81,
    ProcFork = 82,
    ProcRaise = 83,

    RandomGet = 90,

    SockRecv = 100,
    SockSend = 101,
    SockShutdown = 102,
    SockStatGet = 103,
    SockAccept = 104,
    SockBind = 105,
    SockConnect = 106,
    SockListen = 107,

    ThreadCreate = 110,
    ThreadExit = 111,
    ThreadYield = 112,
}

impl SyscallNo {
    /// Decode a raw syscall number from the trap frame. Returns `None` for
    /// anything the dispatcher does not recognise (the caller returns
    /// `Errno::NoSys`).
    pub fn from_raw(n: u32) -> Option<Self> {
        use SyscallNo::*;
        Some(match n {
            0 => ClockResGet,
            1 => ClockTimeGet,
            2 => CondvarSignal,
            10 => FdClose,
            11 => FdCreate1,
            12 => FdCreate2,
            13 => FdDatasync,
            14 => FdDup,
            15 => FdPread,
            16 => FdPwrite,
            17 => FdRead,
            18 => FdReplace,
            19 => FdSeek,
            20 => FdStatGet,
            21 => FdStatPut,
            22 => FdSync,
            23 => FdWrite,
            30 => FileAdvise,
            31 => FileAllocate,
            32 => FileCreate,
            33 => FileLink,
            34 => FileOpen,
            35 => FileReaddir,
            36 => FileReadlink,
            37 => FileRename,
            38 => FileStatFget,
            39 => FileStatFput,
            40 => FileStatGet,
            41 => FileStatPut,
            42 => FileSymlink,
            43 => FileUnlink,
            50 => LockUnlock,
            60 => MemAdvise,
            61 => MemLock,
            62 => MemMap,
            63 => MemProtect,
            64 => MemSync,
            65 => MemUnlock,
            66 => MemUnmap,
            70 => Poll,
            71 => PollFd,
            80 => ProcExec,
            81 => ProcExit,
            82 => ProcFork,
            83 => ProcRaise,
            90 => RandomGet,
            100 => SockRecv,
            101 => SockSend,
            102 => SockShutdown,
            103 => SockStatGet,
            104 => SockAccept,
            105 => SockBind,
            106 => SockConnect,
            107 => SockListen,
            110 => ThreadCreate,
            111 => ThreadExit,
            112 => ThreadYield,
            _ => return None,
        })
    }
}
