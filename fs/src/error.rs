//! Error propagation for the FD/VFS layer (design §7, §9 "exception-free
//! propagation"). Every operation returns a `Result`; nothing here panics on
//! a caller-triggerable error, only on an internal invariant violation via
//! `cosix_lib::KernelError::Invariant`.

pub use cosix_lib::error::{KernelError, KernelResult};
pub use cosix_abi::Errno;

pub type FsResult<T> = KernelResult<T>;

pub fn unsupported<T>() -> FsResult<T> {
    Err(KernelError::Errno(Errno::NotSupported))
}

pub fn not_capable<T>() -> FsResult<T> {
    Err(KernelError::Errno(Errno::NotCapable))
}

pub fn invalid<T>() -> FsResult<T> {
    Err(KernelError::Errno(Errno::Inval))
}
