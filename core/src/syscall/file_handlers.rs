//! The `file_*` syscall group: path-relative operations against a
//! directory FD (design §4.4, §4.8).

use cosix_abi::{Errno, FdStat, FileStat, LookupFlags, OFlags, Rights};

use super::context::{SyscallArgs, SyscallContext, SyscallResult};

pub fn file_open(ctx: &SyscallContext, args: &SyscallArgs, path: &[u8]) -> SyscallResult {
    let lookup = LookupFlags::from_bits_truncate(args.a1 as u8);
    let oflags = OFlags::from_bits_truncate(args.a2 as u16);
    let rights_base = Rights::from_bits_truncate(args.a3);
    let rights_inheriting = Rights::from_bits_truncate(args.a4);

    let result = (|| -> cosix_fs::FsResult<u32> {
        let dir = ctx.process.fd_check(args.a0 as u32, Rights::FILE_OPEN)?;
        let fdstat = FdStat {
            file_type: cosix_abi::FileType::Unknown,
            flags: Default::default(),
            rights_base,
            rights_inheriting,
        };
        let fd = cosix_fs::openat(dir, path, lookup, oflags, fdstat)?;
        ctx.process.fd_install(fd, rights_base, rights_inheriting)
    })();
    SyscallResult::from_kernel(result, |n| n as u64)
}

pub fn file_create(ctx: &SyscallContext, args: &SyscallArgs, path: &[u8]) -> SyscallResult {
    let file_type = match args.a1 {
        3 => cosix_abi::FileType::Directory,
        4 => cosix_abi::FileType::RegularFile,
        _ => return SyscallResult::err(Errno::Inval),
    };
    let right = if file_type == cosix_abi::FileType::Directory {
        Rights::FILE_CREATE_DIRECTORY
    } else {
        Rights::FILE_CREATE_FILE
    };
    let result = (|| -> cosix_fs::FsResult<()> {
        let dir = ctx.process.fd_check(args.a0 as u32, right)?;
        let resolved = cosix_fs::traverse(dir, path, LookupFlags::empty(), OFlags::CREAT)?;
        resolved.directory.file_create(&resolved.filename, file_type)
    })();
    SyscallResult::from_kernel(result, |_| 0)
}

pub fn file_unlink(ctx: &SyscallContext, args: &SyscallArgs, path: &[u8]) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<()> {
        let dir = ctx.process.fd_check(args.a0 as u32, Rights::FILE_UNLINK)?;
        dir.file_unlink(path)
    })();
    SyscallResult::from_kernel(result, |_| 0)
}

pub fn file_link(ctx: &SyscallContext, args: &SyscallArgs, name: &[u8], target_name: &[u8]) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<()> {
        let source_dir = ctx.process.fd_check(args.a0 as u32, Rights::FILE_LINK_SOURCE)?;
        let target_dir = ctx.process.fd_check(args.a2 as u32, Rights::FILE_LINK_TARGET)?;
        source_dir.file_link(name, &*target_dir, target_name)
    })();
    SyscallResult::from_kernel(result, |_| 0)
}

pub fn file_rename(ctx: &SyscallContext, args: &SyscallArgs, name: &[u8], target_name: &[u8]) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<()> {
        let source_dir = ctx.process.fd_check(args.a0 as u32, Rights::FILE_RENAME_SOURCE)?;
        let target_dir = ctx.process.fd_check(args.a2 as u32, Rights::FILE_RENAME_TARGET)?;
        source_dir.file_rename(name, &*target_dir, target_name)
    })();
    SyscallResult::from_kernel(result, |_| 0)
}

pub fn file_readlink(ctx: &SyscallContext, args: &SyscallArgs, name: &[u8], buf: &mut [u8]) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<usize> {
        let dir = ctx.process.fd_check(args.a0 as u32, Rights::FILE_READLINK)?;
        dir.file_readlink(name, buf)
    })();
    SyscallResult::from_kernel(result, |n| n as u64)
}

pub fn file_symlink(ctx: &SyscallContext, args: &SyscallArgs, target: &[u8], name: &[u8]) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<()> {
        let dir = ctx.process.fd_check(args.a0 as u32, Rights::FILE_SYMLINK)?;
        dir.file_symlink(target, name)
    })();
    SyscallResult::from_kernel(result, |_| 0)
}

/// `file_readdir(dirfd, cookie, buf) -> (bytes, next_cookie)`: operates on
/// an already-open directory FD, unlike the rest of this group (design
/// §4.8).
pub fn file_readdir(ctx: &SyscallContext, args: &SyscallArgs, buf: &mut [u8], next_cookie: &mut u64) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<usize> {
        let dir = ctx.process.fd_check(args.a0 as u32, Rights::FILE_READDIR)?;
        let (n, cookie) = dir.readdir(args.a1, buf)?;
        *next_cookie = cookie;
        Ok(n)
    })();
    SyscallResult::from_kernel(result, |n| n as u64)
}

pub fn file_stat_get(ctx: &SyscallContext, args: &SyscallArgs, name: &[u8], out: &mut FileStat) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<FileStat> {
        let dir = ctx.process.fd_check(args.a0 as u32, Rights::FILE_STAT_GET)?;
        dir.file_stat(name)
    })();
    match result {
        Ok(stat) => {
            *out = stat;
            SyscallResult::ok(0)
        }
        Err(e) => SyscallResult::err(e.into_errno()),
    }
}

/// `file_stat_put`: this filesystem doesn't track mutable atime/mtime, so
/// the only field a caller may usefully set is size, which `fd_stat_fput`
/// already covers on an open FD — a bare path-relative size change has no
/// resource to apply it to here.
pub fn file_stat_put(_ctx: &SyscallContext, _args: &SyscallArgs) -> SyscallResult {
    SyscallResult::err(Errno::NotSupported)
}

pub fn file_stat_fget(ctx: &SyscallContext, args: &SyscallArgs, out: &mut FileStat) -> SyscallResult {
    let result = (|| -> cosix_fs::FsResult<FileStat> {
        let fd = ctx.process.fd_check(args.a0 as u32, Rights::FILE_STAT_FGET)?;
        fd.stat_get()
    })();
    match result {
        Ok(stat) => {
            *out = stat;
            SyscallResult::ok(0)
        }
        Err(e) => SyscallResult::err(e.into_errno()),
    }
}

pub fn file_stat_fput(_ctx: &SyscallContext, _args: &SyscallArgs) -> SyscallResult {
    SyscallResult::err(Errno::NotSupported)
}

pub fn file_advise(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let result = ctx.process.fd_check(args.a0 as u32, Rights::FILE_ADVISE).map(|_| ());
    SyscallResult::from_kernel(result, |_| 0)
}

pub fn file_allocate(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let result = ctx.process.fd_check(args.a0 as u32, Rights::FILE_ALLOCATE).map(|_| ());
    SyscallResult::from_kernel(result, |_| 0)
}
