//! Cosix Kernel-Userland ABI Types
//!
//! This crate is the single source of truth for every type shared between
//! the kernel and CloudABI userland processes: syscall numbers, the rights
//! bitmask, file types, open flags, and the wire layout of `fdstat`/
//! `filestat`. Keeping these in one `#![no_std]` crate means kernel and
//! userland never disagree about a struct layout or a constant value.
//!
//! All structs that cross the syscall boundary are `#[repr(C)]`.

#![no_std]

pub mod clock;
pub mod errno;
pub mod event;
pub mod fdstat;
pub mod filestat;
pub mod filetype;
pub mod iovec;
pub mod oflags;
pub mod rights;
pub mod syscall;

pub use clock::ClockId;
pub use errno::Errno;
pub use event::{Event, EventType, Subscription, SubscriptionKind};
pub use fdstat::{FdFlags, FdStat};
pub use filestat::{FileStat, LookupFlags, OpenAt};
pub use filetype::FileType;
pub use iovec::{IoVec, IoVecMut};
pub use oflags::OFlags;
pub use rights::Rights;
pub use syscall::SyscallNo;

/// Standard 4KB page size, used throughout address-space calculations.
pub const PAGE_SIZE: u64 = 0x1000;

/// Length of the 16-byte random process identifier (see §4.5 of the design).
pub const PROCESS_ID_LEN: usize = 16;

/// A 16-byte random process identifier. Never reused within one boot.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct ProcessId(pub [u8; PROCESS_ID_LEN]);

impl ProcessId {
    pub const fn zeroed() -> Self {
        Self([0; PROCESS_ID_LEN])
    }
}
