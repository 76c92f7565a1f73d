//! `clock_res_get`, `clock_time_get`, and `random_get` (design §4.2, §4.4).

use cosix_abi::{ClockId, Errno};

use super::context::{SyscallArgs, SyscallContext, SyscallResult};

fn clock_of(raw: u64) -> Option<ClockId> {
    match raw {
        0 => Some(ClockId::Monotonic),
        1 => Some(ClockId::Realtime),
        _ => None,
    }
}

/// This store doesn't model a hardware tick period; resolution is reported
/// as a flat one nanosecond for any registered clock.
pub fn clock_res_get(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let Some(id) = clock_of(args.a0) else {
        return SyscallResult::err(Errno::Inval);
    };
    match ctx.clocks.time(id, 0) {
        Ok(_) => SyscallResult::ok(1),
        Err(e) => SyscallResult::err(e.into_errno()),
    }
}

pub fn clock_time_get(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let Some(id) = clock_of(args.a0) else {
        return SyscallResult::err(Errno::Inval);
    };
    SyscallResult::from_kernel(ctx.clocks.time(id, args.a1), |t| t)
}

pub fn random_get(ctx: &SyscallContext, buf: &mut [u8]) -> SyscallResult {
    SyscallResult::from_kernel(ctx.random.fill(buf), |_| 0)
}
