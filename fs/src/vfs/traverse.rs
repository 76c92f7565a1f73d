//! Path traversal confined to a root capability (design §4.8).
//!
//! Generalised from the teacher's `vfs::path::resolve_path`, which walks a
//! single global mount table; here there is no global namespace at all (the
//! CloudABI model forbids naming paths outside an FD a process was handed),
//! so traversal instead walks a stack of directory FDs starting at the
//! caller-supplied root, popping on `..` and refusing to pop past the root.

use alloc::sync::Arc;
use alloc::vec::Vec;

use cosix_abi::{Errno, FileStat, FileType, LookupFlags, OFlags};

use crate::config::MAX_SYMLINK_DEPTH;
use crate::error::{FsResult, KernelError};
use crate::fd::FileDescriptor;

pub struct TraverseResult {
    pub directory: Arc<dyn FileDescriptor>,
    pub filename: Vec<u8>,
    /// `None` means the final lookup succeeded outright (errno 0).
    pub lookup_errno: Option<Errno>,
    pub entry: Option<FileStat>,
}

fn split_first_component(path: &[u8]) -> (&[u8], &[u8]) {
    match path.iter().position(|&b| b == b'/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => (path, &[]),
    }
}

/// Walks `path` under `root`, following symlinks per `lookup.symlink_follow`
/// (design §4.8). `oflags` affects only how the final, not-found or
/// already-existing component is reported (`O_CREAT`, `O_CREAT|O_EXCL`).
pub fn traverse(
    root: Arc<dyn FileDescriptor>,
    path: &[u8],
    lookup: LookupFlags,
    oflags: OFlags,
) -> FsResult<TraverseResult> {
    if path.is_empty() {
        return Err(KernelError::Errno(Errno::Inval));
    }
    if path[0] == b'/' {
        return Err(KernelError::Errno(Errno::NotCapable));
    }

    let trailing_slash = path.last() == Some(&b'/');
    let mut stack: Vec<Arc<dyn FileDescriptor>> = alloc::vec![root];
    let mut remaining: Vec<u8> = path.to_vec();
    let mut symlink_budget = MAX_SYMLINK_DEPTH;

    loop {
        let (component, rest) = split_first_component(&remaining);

        if component.is_empty() {
            // Only reachable via a trailing slash already consumed below, or
            // a malformed "//" in the path; treat as "." (skip).
            if rest.is_empty() {
                return Err(KernelError::Errno(Errno::Inval));
            }
            remaining = rest.to_vec();
            continue;
        }

        if component == b"." {
            if rest.is_empty() {
                return Err(KernelError::Errno(Errno::Inval));
            }
            remaining = rest.to_vec();
            continue;
        }

        if component == b".." {
            if stack.len() <= 1 {
                return Err(KernelError::Errno(Errno::NotCapable));
            }
            stack.pop();
            if rest.is_empty() {
                return Err(KernelError::Errno(Errno::Inval));
            }
            remaining = rest.to_vec();
            continue;
        }

        let is_last = rest.is_empty();
        let dir = stack.last().unwrap().clone();

        if !is_last {
            let stat = dir.file_stat(component)?;
            if stat.file_type == FileType::SymbolicLink {
                if !lookup.contains(LookupFlags::SYMLINK_FOLLOW) {
                    return Err(KernelError::Errno(Errno::NotDir));
                }
                symlink_budget = symlink_budget
                    .checked_sub(1)
                    .ok_or(KernelError::Errno(Errno::Loop))?;
                let mut target = alloc::vec![0u8; 4096];
                let n = dir.file_readlink(component, &mut target)?;
                target.truncate(n);
                if target.first() == Some(&b'/') {
                    return Err(KernelError::Errno(Errno::NotCapable));
                }
                target.push(b'/');
                target.extend_from_slice(rest);
                remaining = target;
                continue;
            }
            if stat.file_type != FileType::Directory {
                return Err(KernelError::Errno(Errno::NotDir));
            }
            let sub = dir.openat(component, OFlags::empty(), default_dir_fdstat())?;
            stack.push(sub);
            remaining = rest.to_vec();
            continue;
        }

        // Final component.
        match dir.file_stat(component) {
            Ok(stat) => {
                if stat.file_type == FileType::SymbolicLink && !trailing_slash && lookup.contains(LookupFlags::SYMLINK_FOLLOW) {
                    symlink_budget = symlink_budget
                        .checked_sub(1)
                        .ok_or(KernelError::Errno(Errno::Loop))?;
                    let mut target = alloc::vec![0u8; 4096];
                    let n = dir.file_readlink(component, &mut target)?;
                    target.truncate(n);
                    if target.first() == Some(&b'/') {
                        return Err(KernelError::Errno(Errno::NotCapable));
                    }
                    remaining = target;
                    continue;
                }
                if trailing_slash && stat.file_type != FileType::Directory {
                    return Err(KernelError::Errno(Errno::NotDir));
                }
                let lookup_errno = if oflags.contains(OFlags::CREAT | OFlags::EXCL) {
                    Some(Errno::Exist)
                } else {
                    None
                };
                return Ok(TraverseResult {
                    directory: dir,
                    filename: component.to_vec(),
                    lookup_errno,
                    entry: Some(stat),
                });
            }
            Err(KernelError::Errno(Errno::NoEnt)) => {
                return Ok(TraverseResult {
                    directory: dir,
                    filename: component.to_vec(),
                    lookup_errno: Some(Errno::NoEnt),
                    entry: None,
                });
            }
            Err(e) => return Err(e),
        }
    }
}

fn default_dir_fdstat() -> cosix_abi::FdStat {
    cosix_abi::FdStat {
        file_type: FileType::Directory,
        flags: cosix_abi::FdFlags::empty(),
        rights_base: cosix_abi::Rights::DIRECTORY_BASE,
        rights_inheriting: cosix_abi::Rights::DIRECTORY_BASE,
    }
}

/// `openat` composes [`traverse`] with the directory's `openat`, applying
/// the rights-intersection rule the caller already computed into `fdstat`
/// (design §4.8: "applies the rights-intersection rule based on the opened
/// file type" — the intersection itself happens one layer up where the
/// calling FD mapping's rights are known).
pub fn openat(
    root: Arc<dyn FileDescriptor>,
    path: &[u8],
    lookup: LookupFlags,
    oflags: OFlags,
    fdstat: cosix_abi::FdStat,
) -> FsResult<Arc<dyn FileDescriptor>> {
    let result = traverse(root, path, lookup, oflags)?;
    match result.lookup_errno {
        None => result.directory.openat(&result.filename, oflags, fdstat),
        Some(Errno::NoEnt) if oflags.contains(OFlags::CREAT) => {
            result.directory.openat(&result.filename, oflags, fdstat)
        }
        Some(Errno::NoEnt) => Err(KernelError::Errno(Errno::NoEnt)),
        Some(Errno::Exist) => Err(KernelError::Errno(Errno::Exist)),
        Some(other) => Err(KernelError::Errno(other)),
    }
}
