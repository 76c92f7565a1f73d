//! The single enumerated error kind returned by every syscall (design §7).

/// CloudABI-style errno. Every failing operation either sets an FD's error
/// slot or returns one of these directly; the dispatcher copies the value
/// into the return register unchanged.
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Errno {
    /// No error occurred; the operation completed successfully.
    Success = 0,
    /// Argument list too long, or similar.
    TooBig = 1,
    /// Resource temporarily unavailable (non-blocking operation would block).
    Again = 2,
    /// Resource busy.
    Busy = 3,
    /// Operation canceled.
    Canceled = 4,
    /// Bad file descriptor.
    BadF = 5,
    /// Device or resource busy.
    DeviceOrResourceBusy = 6,
    /// File exists.
    Exist = 7,
    /// Bad address / fault.
    Fault = 8,
    /// Operation interrupted.
    Intr = 9,
    /// Invalid argument.
    Inval = 10,
    /// I/O error.
    Io = 11,
    /// Is a directory.
    IsDir = 12,
    /// Too many symbolic links encountered (loop).
    Loop = 13,
    /// Message too large.
    MsgSize = 14,
    /// Filename too long.
    NameTooLong = 15,
    /// No such device.
    NoDev = 16,
    /// No such file or directory.
    NoEnt = 17,
    /// Not enough memory.
    NoMem = 18,
    /// No space left on device.
    NoSpc = 19,
    /// Function not supported.
    NoSys = 20,
    /// Not a directory.
    NotDir = 21,
    /// Directory not empty.
    NotEmpty = 22,
    /// Socket is not connected.
    NotConn = 23,
    /// State not recoverable / not capable of this operation (capability check failed).
    NotCapable = 24,
    /// Not supported (semantically distinct from `NoSys`: the operation is
    /// recognised but this object will never support it).
    NotSupported = 25,
    /// Operation not permitted.
    Perm = 26,
    /// Broken pipe / connection reset by peer.
    Pipe = 27,
    /// Result too large / out of range.
    Range = 28,
    /// Read-only filesystem.
    RoFs = 29,
    /// Invalid seek.
    SPipe = 30,
    /// Too many open files (process FD table full).
    MFile = 31,
    /// Connection refused.
    ConnRefused = 32,
    /// Cross-device link.
    XDev = 33,
    /// Not connected to the pseudo-FD peer.
    NotConnected = 34,
}

impl Errno {
    pub const fn is_success(self) -> bool {
        matches!(self, Errno::Success)
    }

    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

impl From<Errno> for i32 {
    fn from(e: Errno) -> i32 {
        -(e as i32)
    }
}

impl core::fmt::Display for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}
