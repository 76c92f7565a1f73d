//! The `fd_*` syscall group (design §4.4).

use core::sync::atomic::{AtomicU64, Ordering};

use cosix_abi::fdstat::FdStatPutFlags;
use cosix_abi::{Errno, FdStat, IoVec, IoVecMut, Rights};
use cosix_fs::fd::Whence;
use cosix_fs::{FileDescriptor, SockKind, UnixSock};

use super::context::{SyscallArgs, SyscallContext, SyscallResult};

/// Anonymous-object inodes (`fd_create1`/`fd_create2` pairs) aren't backed
/// by any filesystem namespace entry; they still need distinct (device,
/// inode) pairs for the design §8 FD-passing round-trip law, so this table
/// hands out fresh ones the same way `cosix_fs::pseudo`'s bridge does.
static NEXT_ANON_INODE: AtomicU64 = AtomicU64::new(1);

fn next_anon_inode() -> u64 {
    NEXT_ANON_INODE.fetch_add(1, Ordering::Relaxed)
}

pub fn fd_close(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    SyscallResult::from_kernel(ctx.process.fd_close(args.a0 as u32), |_| 0)
}

pub fn fd_dup(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    SyscallResult::from_kernel(ctx.process.fd_dup(args.a0 as u32), |n| n as u64)
}

pub fn fd_replace(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    SyscallResult::from_kernel(ctx.process.fd_replace(args.a0 as u32, args.a1 as u32), |_| 0)
}

pub fn fd_stat_get(ctx: &SyscallContext, args: &SyscallArgs, out: &mut FdStat) -> SyscallResult {
    let num = args.a0 as u32;
    let result = (|| -> cosix_fs::FsResult<()> {
        let mapping = ctx.process.fd_get(num)?;
        *out = FdStat {
            file_type: mapping.fd.file_type(),
            flags: mapping.fd.flags(),
            rights_base: mapping.rights_base,
            rights_inheriting: mapping.rights_inheriting,
        };
        Ok(())
    })();
    SyscallResult::from_kernel(result, |_| 0)
}

pub fn fd_stat_put(ctx: &SyscallContext, args: &SyscallArgs, stat: &FdStat, which: FdStatPutFlags) -> SyscallResult {
    let num = args.a0 as u32;
    let result = (|| -> cosix_fs::FsResult<()> {
        if which.contains(FdStatPutFlags::FLAGS) {
            let fd = ctx.process.fd_check(num, Rights::FD_FDSTAT_PUT_FLAGS)?;
            fd.set_flags(stat.flags);
        }
        if which.contains(FdStatPutFlags::RIGHTS) {
            ctx.process.fd_set_rights(num, stat.rights_base, stat.rights_inheriting)?;
        }
        Ok(())
    })();
    SyscallResult::from_kernel(result, |_| 0)
}

pub fn fd_seek(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let whence = match args.a2 {
        0 => Whence::Set,
        1 => Whence::Cur,
        2 => Whence::End,
        _ => return SyscallResult::err(Errno::Inval),
    };
    let result = (|| -> cosix_fs::FsResult<u64> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::FD_SEEK)?;
        fd.seek(args.a1 as i64, whence)
    })();
    SyscallResult::from_kernel(result, |pos| pos)
}

pub fn fd_sync(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<()> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::FD_SYNC)?;
        fd.sync()
    })();
    SyscallResult::from_kernel(result, |_| 0)
}

pub fn fd_datasync(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<()> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::FD_DATASYNC)?;
        fd.datasync()
    })();
    SyscallResult::from_kernel(result, |_| 0)
}

pub fn fd_read(ctx: &SyscallContext, args: &SyscallArgs, buf: &mut [u8]) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<usize> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::FD_READ)?;
        let mut iov = [IoVecMut::new(buf)];
        fd.read(&mut iov)
    })();
    SyscallResult::from_kernel(result, |n| n as u64)
}

pub fn fd_write(ctx: &SyscallContext, args: &SyscallArgs, buf: &[u8]) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<usize> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::FD_WRITE)?;
        let iov = [IoVec::new(buf)];
        fd.write(&iov)
    })();
    SyscallResult::from_kernel(result, |n| n as u64)
}

pub fn fd_pread(ctx: &SyscallContext, args: &SyscallArgs, buf: &mut [u8]) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<usize> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::FD_READ | Rights::FD_SEEK)?;
        let mut iov = [IoVecMut::new(buf)];
        fd.pread(&mut iov, args.a1)
    })();
    SyscallResult::from_kernel(result, |n| n as u64)
}

pub fn fd_pwrite(ctx: &SyscallContext, args: &SyscallArgs, buf: &[u8]) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<usize> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::FD_WRITE | Rights::FD_SEEK)?;
        let iov = [IoVec::new(buf)];
        fd.pwrite(&iov, args.a1)
    })();
    SyscallResult::from_kernel(result, |n| n as u64)
}

/// `fd_create1(kind)`: one freestanding socket, unconnected (design §4.9).
pub fn fd_create1(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let kind = match args.a0 {
        0 => SockKind::Stream,
        1 => SockKind::Datagram,
        _ => return SyscallResult::err(Errno::Inval),
    };
    let sock = UnixSock::new(kind, next_anon_inode());
    let result = ctx.process.fd_install(sock, Rights::REGULAR_FILE_BASE, Rights::empty());
    SyscallResult::from_kernel(result, |n| n as u64)
}

/// `fd_create2(kind)`: a connected pair, installed at two fresh FD numbers
/// (design §4.9 `socketpair`). Returns the first number; the second is
/// written into `second_out` for the trap layer to copy back as the dual
/// return value.
pub fn fd_create2(ctx: &SyscallContext, args: &SyscallArgs, second_out: &mut u32) -> SyscallResult {
    let kind = match args.a0 {
        0 => SockKind::Stream,
        1 => SockKind::Datagram,
        _ => return SyscallResult::err(Errno::Inval),
    };
    let (a, b) = UnixSock::pair(kind, next_anon_inode(), next_anon_inode());
    let result = (|| -> cosix_fs::FsResult<u32> {
        let first = ctx.process.fd_install(a, Rights::REGULAR_FILE_BASE, Rights::empty())?;
        let second = ctx.process.fd_install(b, Rights::REGULAR_FILE_BASE, Rights::empty())?;
        *second_out = second;
        Ok(first)
    })();
    SyscallResult::from_kernel(result, |n| n as u64)
}
