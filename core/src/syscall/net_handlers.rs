//! The `sock_*` syscall group (design §4.9).
//!
//! `sock_connect` is handled differently from every other `sock_*` call: a
//! connecting socket never mutates itself, it hands back a brand-new
//! already-connected FD (see `cosix_fs::unixsock::connect`), so this group
//! keeps a free function rather than routing through the trait method of
//! the same name (which always fails `not-supported`).

use alloc::sync::Arc;
use alloc::vec::Vec;

use cosix_abi::{Errno, FileStat, IoVec, IoVecMut, Rights};
use cosix_fs::fd::{FileDescriptor, ShutdownHow};

use super::context::{SyscallArgs, SyscallContext, SyscallResult};

fn how_of(raw: u64) -> Option<ShutdownHow> {
    match raw {
        0 => Some(ShutdownHow::Read),
        1 => Some(ShutdownHow::Write),
        2 => Some(ShutdownHow::Both),
        _ => None,
    }
}

/// `sock_bind(fd, device, inode)`.
pub fn sock_bind(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<()> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::SOCK_BIND)?;
        fd.sock_bind(args.a1, args.a2)
    })();
    SyscallResult::from_kernel(result, |_| 0)
}

/// `sock_listen(fd, backlog)`: transitions the socket, then publishes it
/// into the listen store under the address `sock_bind` recorded.
pub fn sock_listen(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<()> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::SOCK_LISTEN)?;
        fd.sock_listen(args.a1 as u32)?;
        let Some((device, inode)) = fd.sock_bound_address() else {
            return Err(cosix_lib::error::KernelError::Errno(Errno::Inval));
        };
        fd.register_listener(ctx.listen_store, device, inode)
    })();
    SyscallResult::from_kernel(result, |_| 0)
}

/// `sock_connect(device, inode)`: installs and returns a fresh connected fd.
pub fn sock_connect(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<u32> {
        let sock = cosix_fs::connect_unix_socket(ctx.listen_store, args.a0, args.a1)?;
        let fd: Arc<dyn FileDescriptor> = sock;
        ctx.process.fd_install(fd, Rights::SOCK_BASE, Rights::SOCK_BASE)
    })();
    SyscallResult::from_kernel(result, |n| n as u64)
}

pub fn sock_accept(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<u32> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::SOCK_ACCEPT)?;
        let accepted = fd.sock_accept()?;
        ctx.process.fd_install(accepted, Rights::SOCK_BASE, Rights::SOCK_BASE)
    })();
    SyscallResult::from_kernel(result, |n| n as u64)
}

pub fn sock_shutdown(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let Some(how) = how_of(args.a1) else {
        return SyscallResult::err(Errno::Inval);
    };
    let result = (|| -> cosix_fs::FsResult<()> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::SOCK_SHUTDOWN)?;
        fd.sock_shutdown(how)
    })();
    SyscallResult::from_kernel(result, |_| 0)
}

pub fn sock_stat_get(ctx: &SyscallContext, args: &SyscallArgs, out: &mut FileStat) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<FileStat> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::SOCK_STAT_GET)?;
        fd.sock_stat_get()
    })();
    match result {
        Ok(stat) => {
            *out = stat;
            SyscallResult::ok(0)
        }
        Err(e) => SyscallResult::err(e.into_errno()),
    }
}

/// `sock_recv(fd, buf)`. Any FDs the message carried are installed into
/// this process's own table (design §4.9 "passing descriptors"); their
/// numbers are written into `fd_nums_out`, sized to the caller's slot
/// budget. Returns bytes received as the primary value; `fds_received`
/// reports how many of those slots were actually filled.
pub fn sock_recv(
    ctx: &SyscallContext,
    args: &SyscallArgs,
    buf: &mut [u8],
    fd_nums_out: &mut [u32],
    fds_received: &mut usize,
) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<usize> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::SOCK_RECV)?;
        let mut iovs = [IoVecMut::new(buf)];
        let mut slots: Vec<Option<Arc<dyn FileDescriptor>>> = (0..fd_nums_out.len()).map(|_| None).collect();
        let received = fd.sock_recv(&mut iovs, &mut slots)?;

        let mut installed = 0;
        for slot in slots.into_iter().flatten() {
            if let Ok(num) = ctx.process.fd_install(slot, Rights::SOCK_BASE, Rights::SOCK_BASE) {
                fd_nums_out[installed] = num;
                installed += 1;
            }
        }
        *fds_received = installed;
        Ok(received.bytes)
    })();
    SyscallResult::from_kernel(result, |n| n as u64)
}

/// `sock_send(fd, buf, fd_nums)`: each entry in `fd_nums` is resolved
/// against this process's own table before being handed to the peer.
pub fn sock_send(ctx: &SyscallContext, args: &SyscallArgs, buf: &[u8], fd_nums: &[u32]) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<usize> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::SOCK_SEND)?;
        let mut fds = Vec::with_capacity(fd_nums.len());
        for &num in fd_nums {
            fds.push(ctx.process.fd_check(num, Rights::empty())?);
        }
        let iovs = [IoVec::new(buf)];
        fd.sock_send(&iovs, &fds)
    })();
    SyscallResult::from_kernel(result, |n| n as u64)
}

// Net-handler behaviour (bind/listen/connect/accept/send/recv) is exercised
// end to end in `dispatch`'s tests, since none of these handlers hold state
// of their own worth testing in isolation.
