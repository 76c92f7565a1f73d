//! The `mem_*` syscall group (design §4.7).
//!
//! Rights validation happens here, one layer above `cosix_mm`, which only
//! implements the geometry once a request is known-valid (see
//! `cosix_mm::mmap`'s module doc).

use cosix_abi::{Errno, Rights};
use cosix_mm::{Backing, MemMapRequest, Prot, SyncMode, Visibility};

use super::context::{SyscallArgs, SyscallContext, SyscallResult};

fn prot_of(raw: u64) -> Prot {
    Prot::from_bits(raw as u8)
}

/// `mem_map(fd, addr_hint, len, prot, flags)`. `flags` bit 0 selects a
/// fixed address, bit 1 selects shared visibility (private otherwise);
/// `fd == u32::MAX` means an anonymous mapping.
pub fn mem_map(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let prot = prot_of(args.a3);
    if !prot.is_valid_request() {
        return SyscallResult::err(Errno::Inval);
    }
    let fixed = args.a4 & 0x1 != 0;
    let visibility = if args.a4 & 0x2 != 0 { Visibility::Shared } else { Visibility::Private };

    let fd = args.a0 as u32;
    let backing = if fd == u32::MAX {
        Backing::Anonymous
    } else {
        let required = if prot.is_executable() { Rights::MEM_MAP_EXEC } else { Rights::MEM_MAP };
        if let Err(e) = ctx.process.fd_check(fd, required) {
            return SyscallResult::err(e.into_errno());
        }
        Backing::File { fd, offset: 0 }
    };

    let req = MemMapRequest { addr_hint: args.a1, len: args.a2, prot, fixed, visibility, backing };
    let mut space = ctx.process.address_space.lock();
    match space.mem_map(ctx.frames, ctx.allocator, None, req) {
        Ok(addr) => SyscallResult::ok(addr),
        Err(e) => e.into(),
    }
}

pub fn mem_protect(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let prot = prot_of(args.a2);
    if !prot.is_valid_request() {
        return SyscallResult::err(Errno::Inval);
    }
    let mut space = ctx.process.address_space.lock();
    match space.mem_protect(args.a0, args.a1, prot) {
        Ok(()) => SyscallResult::ok(0),
        Err(e) => e.into(),
    }
}

pub fn mem_unmap(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let mut space = ctx.process.address_space.lock();
    match space.mem_unmap(ctx.frames, ctx.allocator, args.a0, args.a1) {
        Ok(()) => SyscallResult::ok(0),
        Err(e) => e.into(),
    }
}

pub fn mem_sync(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let mode = if args.a2 & 0x1 != 0 { SyncMode::Sync } else { SyncMode::Async };
    let space = ctx.process.address_space.lock();
    match space.mem_sync(args.a0, args.a1, mode) {
        Ok(()) => SyscallResult::ok(0),
        Err(e) => e.into(),
    }
}

pub fn mem_advise(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let space = ctx.process.address_space.lock();
    match space.mem_advise(args.a0, args.a1) {
        Ok(()) => SyscallResult::ok(0),
        Err(e) => e.into(),
    }
}

/// Wired memory (no swap to pin against, design §6 "no disk writes"): both
/// `mem_lock` and `mem_unlock` are accepted as no-ops once the range is
/// confirmed mapped.
pub fn mem_lock(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    let space = ctx.process.address_space.lock();
    match space.mem_advise(args.a0, args.a1) {
        Ok(()) => SyscallResult::ok(0),
        Err(e) => e.into(),
    }
}

pub fn mem_unlock(ctx: &SyscallContext, args: &SyscallArgs) -> SyscallResult {
    mem_lock(ctx, args)
}
