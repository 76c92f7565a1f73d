//! Syscall argument/result plumbing (design §4.12 "argument unpacking").
//!
//! Decoding a raw CPU exception frame into register values is
//! architecture-specific and lives in the kernel binary crate, on the same
//! footing as [`crate::scheduler::ContextSwitch`] (design §1): by the time a
//! call reaches [`crate::syscall::dispatch::dispatch`] it is already six
//! register-width arguments plus (for the handful of calls that move bytes)
//! a buffer the trap entry has already staged to/from user memory.

use alloc::sync::Arc;

use cosix_abi::Errno;
use cosix_fs::ListenStore;
use cosix_lib::error::KernelResult;
use cosix_mm::{FrameAllocator, FrameTable, MmError, PageDirectoryFactory};

use crate::clock::ClockStore;
use crate::futex::FutexTable;
use crate::process::Process;
use crate::random::RandomStore;
use crate::scheduler::Scheduler;

/// The six general-purpose argument registers CloudABI syscalls pass
/// arguments in, in order.
#[derive(Clone, Copy, Default)]
pub struct SyscallArgs {
    pub a0: u64,
    pub a1: u64,
    pub a2: u64,
    pub a3: u64,
    pub a4: u64,
    pub a5: u64,
}

impl SyscallArgs {
    pub const fn new(a: [u64; 6]) -> Self {
        Self { a0: a[0], a1: a[1], a2: a[2], a3: a[3], a4: a[4], a5: a[5] }
    }
}

/// What a handler hands back to the dispatcher: an errno plus one secondary
/// return value (design: "some return a second value", e.g. `proc_fork`'s
/// child/parent distinction or `fd_pread`'s byte count).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyscallResult {
    pub error: Errno,
    pub retval: u64,
}

impl SyscallResult {
    pub const fn ok(retval: u64) -> Self {
        Self { error: Errno::Success, retval }
    }

    pub const fn err(error: Errno) -> Self {
        Self { error, retval: 0 }
    }

    pub fn from_kernel<T>(result: KernelResult<T>, to_retval: impl FnOnce(T) -> u64) -> Self {
        match result {
            Ok(v) => Self::ok(to_retval(v)),
            Err(e) => Self::err(e.into_errno()),
        }
    }
}

impl From<MmError> for SyscallResult {
    fn from(e: MmError) -> Self {
        Self::err(e.into())
    }
}

/// Everything a handler needs to resolve a syscall against this process
/// (design §4.4 "the dispatcher must verify the right before calling").
pub struct SyscallContext<'a> {
    pub process: &'a Arc<Process>,
    pub scheduler: &'a Scheduler,
    pub futex: &'a FutexTable,
    pub clocks: &'a ClockStore,
    pub random: &'a RandomStore,
    pub frames: &'a FrameTable,
    pub allocator: &'a dyn FrameAllocator,
    pub listen_store: &'a ListenStore,
    pub page_dirs: &'a dyn PageDirectoryFactory,
}
