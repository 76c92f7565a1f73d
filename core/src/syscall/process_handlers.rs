//! Process and thread lifecycle syscalls (design §4.5, §4.6).

use alloc::sync::Arc;

use cosix_abi::{Errno, Rights};
use cosix_fs::FsResult;
use cosix_lib::error::KernelError;

use crate::process::{ExitStatus, ProcessFd};

use super::context::{SyscallArgs, SyscallContext, SyscallResult};

/// `proc_exit(code)`. Never truly "returns" to the exiting thread once the
/// scheduler hands the CPU elsewhere; the `Ok(0)` here is only ever seen by
/// a test harness or a caller that inspects `dispatch`'s return value
/// directly.
pub fn proc_exit(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    ctx.process.exit(ExitStatus { code: args.a0 as u8, signaled: false });
    ctx.scheduler.exit_current();
    SyscallResult::ok(0)
}

/// `proc_raise(signal)`: this kernel never built a signal-delivery or
/// masking story, so a raised signal is treated as immediate termination
/// (design §1 scope).
pub fn proc_raise(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    ctx.process.exit(ExitStatus { code: args.a0 as u8, signaled: true });
    ctx.scheduler.exit_current();
    SyscallResult::ok(0)
}

/// `proc_exec(fd, inherited_fds)` (design §4.5): validates that `fd` grants
/// no write right, installs each of `inherited_fds` at its index in
/// `0..N-1` carrying the exact rights its parent mapping already held, and
/// terminates every other thread of the process. Everything here only
/// needs the FD table and the scheduler; actually parsing an ELF image out
/// of `fd` and replacing the address space needs a real loader this crate
/// doesn't have, so that last step alone is reported `NoSys` rather than
/// silently no-opping — by the time it's reached, the FD table has already
/// been mutated the way a real exec would leave it.
pub fn proc_exec(ctx: &SyscallContext, args: &SyscallArgs, inherited_fds: &[u32]) -> SyscallResult {
    let result = (|| -> FsResult<()> {
        let fd_num = args.a0 as u32;
        let mapping = ctx.process.fd_get(fd_num)?;
        if mapping.rights_base.grants(Rights::FD_WRITE) {
            return Err(KernelError::Errno(Errno::NotCapable));
        }

        for (new_num, &old_num) in inherited_fds.iter().enumerate() {
            let inherited = ctx.process.fd_get(old_num)?;
            ctx.process.fd_install_at(new_num as u32, inherited.fd, inherited.rights_base, inherited.rights_inheriting)?;
        }

        if let Some(current) = ctx.scheduler.current() {
            ctx.scheduler.terminate_other_threads(ctx.process, current.id);
        }

        Err(KernelError::Errno(Errno::NoSys))
    })();
    SyscallResult::from_kernel(result, |_| 0)
}

/// `proc_fork`: COW-forks the address space and FD table, gives the child
/// a fresh random [`cosix_abi::ProcessId`], and hands the parent back a
/// [`ProcessFd`] it can `poll` for termination (design §4.5, §4.12). Which
/// side the *calling thread* actually resumes as is decided by the
/// arch-specific context switch, not here (design §1) — this handler only
/// ever runs once, on the parent's behalf.
pub fn proc_fork(ctx: &SyscallContext) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<u32> {
        let child_id = ctx.random.fresh_process_id()?;
        let child_page_dir = ctx.page_dirs.new_directory();
        let child = ctx.process.fork(child_id, child_page_dir, ctx.frames);
        ctx.scheduler.spawn(Arc::downgrade(&child));
        child.thread_started();
        ctx.process.fd_install(Arc::new(ProcessFd::new(child)), Rights::POLL_FD_READWRITE, Rights::empty())
    })();
    SyscallResult::from_kernel(result, |n| n as u64)
}

/// `thread_create`: a new thread joining the calling thread's process.
pub fn thread_create(ctx: &SyscallContext) -> SyscallResult {
    let thread = ctx.scheduler.spawn(Arc::downgrade(ctx.process));
    ctx.process.thread_started();
    SyscallResult::ok(thread.id as u64)
}

/// `thread_exit(lock, scope)` (design §4.6): releases the named userland
/// lock atomically with marking the thread exited, so nothing waiting on
/// it deadlocks against a lock its owner can never unlock again. `lock ==
/// 0` means the thread held no lock to release. The last thread exiting a
/// process triggers `exit(0)`.
pub fn thread_exit(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    if args.a0 != 0 {
        if let Some(current) = ctx.scheduler.current() {
            current.note_write_lock_released(args.a0);
        }
        ctx.futex.lock_unlock(args.a0);
    }
    if ctx.process.thread_finished() {
        ctx.process.exit(ExitStatus { code: 0, signaled: false });
    }
    ctx.scheduler.exit_current();
    SyscallResult::ok(0)
}

pub fn thread_yield(ctx: &SyscallContext) -> SyscallResult {
    ctx.scheduler.yield_now();
    SyscallResult::ok(0)
}
