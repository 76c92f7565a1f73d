//! `poll`, plus the userland lock/CV wake syscalls (design §4.6, §4.12).

use cosix_abi::event::{Event, Subscription, SubscriptionKind};
use cosix_abi::Errno;

use super::context::{SyscallArgs, SyscallContext, SyscallResult};

/// `poll(subs) -> events`: `subs` and `out` are staged by the trap entry the
/// same way a byte buffer is for `fd_read` (design §4.12). Returns the
/// number of events written into `out`.
pub fn poll(ctx: &SyscallContext, subs: &[Subscription], out: &mut [Event]) -> SyscallResult {
    match crate::poll::poll(ctx.process, ctx.futex, ctx.clocks, subs) {
        Ok(events) => {
            let n = events.len().min(out.len());
            out[..n].copy_from_slice(&events[..n]);
            SyscallResult::ok(n as u64)
        }
        Err(e) => SyscallResult::err(e.into_errno()),
    }
}

/// `poll_fd(fd, write)`: the common single-subscription case, collapsed to
/// a plain errno instead of an event array.
pub fn poll_fd(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let fd = args.a0 as u32;
    let kind = if args.a1 != 0 {
        SubscriptionKind::FdWriteReady { fd }
    } else {
        SubscriptionKind::FdReadReady { fd }
    };
    let subs = [Subscription { user_data: 0, kind }];
    match crate::poll::poll(ctx.process, ctx.futex, ctx.clocks, &subs) {
        Ok(events) => match events.first() {
            Some(e) => SyscallResult::err(e.error),
            None => SyscallResult::err(Errno::Inval),
        },
        Err(e) => SyscallResult::err(e.into_errno()),
    }
}

/// `lock_unlock(addr)` (design §4.6, §3 "held userland-lock addresses").
pub fn lock_unlock(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    if let Some(current) = ctx.scheduler.current() {
        current.note_write_lock_released(args.a0);
    }
    ctx.futex.lock_unlock(args.a0);
    SyscallResult::ok(0)
}

/// `condvar_signal(addr, n)` (design §4.6; see `futex.rs` for the `n`
/// simplification).
pub fn condvar_signal(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    ctx.futex.condvar_signal(args.a0, args.a1 as u32);
    SyscallResult::ok(0)
}
