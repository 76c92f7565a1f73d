//! The polymorphic FD object and its uniform operation contract
//! (design §3 "File descriptor", §4.4, §9 "deep virtual hierarchy... replace
//! with a trait with default implementations that fail not-supported").
//!
//! Every FD subtype in this crate (initrd files/directories, Unix sockets,
//! pseudo-FDs, raw sockets, block devices, partitions, terminals) implements
//! [`FileDescriptor`]. Operations that don't apply to a subtype simply don't
//! override the default, which fails [`Errno::NotSupported`] — matching the
//! teacher's `vfs::traits::FileSystem` default-method shape, generalised from
//! a filesystem-only trait to the full FD contract.
//!
//! Rust's `Result` return type replaces the original's `fd.error` slot
//! (design §9 "a result-type discipline preserves this exactly"); there is
//! deliberately no mutable error field on the trait object.

use alloc::sync::Arc;

use cosix_abi::{FdFlags, FdStat, FileStat, FileType, IoVec, IoVecMut, OFlags, Whence};
use cosix_lib::Signaler;

use crate::error::{FsResult, unsupported};

/// `sock_shutdown` direction (design §4.9 state machine: "shutdown(write)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownHow {
    Read,
    Write,
    Both,
}

/// Outcome of `sock_recv` (design §4.9 "Receive semantics").
#[derive(Debug, Clone, Copy, Default)]
pub struct RecvResult {
    pub bytes: usize,
    pub fds_received: usize,
    /// Set when the message had more payload than the iovecs could hold.
    pub data_truncated: bool,
    /// Set when the message carried more FDs than the caller offered slots.
    pub fds_truncated: bool,
}

/// The uniform contract every FD implements (design §4.4). Default methods
/// fail `not-supported`, matching inapplicable operations (e.g. `sock_bind`
/// on a regular file) without requiring every leaf type to restate them.
pub trait FileDescriptor: Send + Sync {
    fn file_type(&self) -> FileType;

    /// 32-character debug name (design §3). Empty by default.
    fn debug_name(&self) -> &str {
        ""
    }

    fn flags(&self) -> FdFlags;
    fn set_flags(&self, flags: FdFlags);

    fn read(&self, iovs: &mut [IoVecMut<'_>]) -> FsResult<usize> {
        let _ = iovs;
        unsupported()
    }

    fn pread(&self, iovs: &mut [IoVecMut<'_>], offset: u64) -> FsResult<usize> {
        let _ = (iovs, offset);
        unsupported()
    }

    fn write(&self, iovs: &[IoVec<'_>]) -> FsResult<usize> {
        let _ = iovs;
        unsupported()
    }

    fn pwrite(&self, iovs: &[IoVec<'_>], offset: u64) -> FsResult<usize> {
        let _ = (iovs, offset);
        unsupported()
    }

    fn seek(&self, delta: i64, whence: Whence) -> FsResult<u64> {
        let _ = (delta, whence);
        unsupported()
    }

    fn sync(&self) -> FsResult<()> {
        Ok(())
    }

    fn datasync(&self) -> FsResult<()> {
        Ok(())
    }

    fn stat_get(&self) -> FsResult<FileStat> {
        unsupported()
    }

    /// Directory only: open `path` relative to this FD (design §4.4, §4.8).
    fn openat(&self, path: &[u8], oflags: OFlags, fdstat: FdStat) -> FsResult<Arc<dyn FileDescriptor>> {
        let _ = (path, oflags, fdstat);
        unsupported()
    }

    /// Directory only. Returns the number of bytes written into `buf` and
    /// the cookie to resume from on the next call.
    fn readdir(&self, cookie: u64, buf: &mut [u8]) -> FsResult<(usize, u64)> {
        let _ = (cookie, buf);
        unsupported()
    }

    fn file_create(&self, name: &[u8], file_type: FileType) -> FsResult<()> {
        let _ = (name, file_type);
        unsupported()
    }

    fn file_unlink(&self, name: &[u8]) -> FsResult<()> {
        let _ = name;
        unsupported()
    }

    fn file_link(&self, name: &[u8], target_dir: &dyn FileDescriptor, target_name: &[u8]) -> FsResult<()> {
        let _ = (name, target_dir, target_name);
        unsupported()
    }

    fn file_rename(&self, name: &[u8], target_dir: &dyn FileDescriptor, target_name: &[u8]) -> FsResult<()> {
        let _ = (name, target_dir, target_name);
        unsupported()
    }

    fn file_readlink(&self, name: &[u8], buf: &mut [u8]) -> FsResult<usize> {
        let _ = (name, buf);
        unsupported()
    }

    fn file_symlink(&self, target: &[u8], name: &[u8]) -> FsResult<()> {
        let _ = (target, name);
        unsupported()
    }

    fn file_stat(&self, name: &[u8]) -> FsResult<FileStat> {
        let _ = name;
        unsupported()
    }

    fn sock_bind(&self, device: u64, inode: u64) -> FsResult<()> {
        let _ = (device, inode);
        unsupported()
    }

    fn sock_connect(&self, device: u64, inode: u64) -> FsResult<()> {
        let _ = (device, inode);
        unsupported()
    }

    fn sock_listen(&self, backlog: u32) -> FsResult<()> {
        let _ = backlog;
        unsupported()
    }

    /// Publish this FD into the process-wide listen store under `(device,
    /// inode)` so `sock_connect` can find it (design §4.9). Takes `self` by
    /// `Arc` since the store holds a `Weak` back-reference to the concrete
    /// socket, not the type-erased trait object. Only `UnixSock` overrides
    /// this; every other FD inherits the `unsupported()` default like the
    /// rest of the `sock_*` group.
    fn register_listener(self: Arc<Self>, store: &crate::listen_store::ListenStore, device: u64, inode: u64) -> FsResult<()> {
        let _ = (store, device, inode);
        unsupported()
    }

    fn sock_accept(&self) -> FsResult<Arc<dyn FileDescriptor>> {
        unsupported()
    }

    fn sock_shutdown(&self, how: ShutdownHow) -> FsResult<()> {
        let _ = how;
        unsupported()
    }

    fn sock_stat_get(&self) -> FsResult<FileStat> {
        unsupported()
    }

    /// The `(device, inode)` a prior `sock_bind` recorded, if any. Lets the
    /// syscall layer register a listener without re-threading the address
    /// through the `sock_listen` call. `None` by default.
    fn sock_bound_address(&self) -> Option<(u64, u64)> {
        None
    }

    fn sock_recv(
        &self,
        iovs: &mut [IoVecMut<'_>],
        fd_slots: &mut [Option<Arc<dyn FileDescriptor>>],
    ) -> FsResult<RecvResult> {
        let _ = (iovs, fd_slots);
        unsupported()
    }

    fn sock_send(&self, iovs: &[IoVec<'_>], fds: &[Arc<dyn FileDescriptor>]) -> FsResult<usize> {
        let _ = (iovs, fds);
        unsupported()
    }

    /// Poll integration (design §4.4, §4.12). `None` means this FD never
    /// becomes read/write-ready asynchronously (e.g. a regular file, which
    /// is always ready).
    fn get_read_signaler(&self) -> Option<&Signaler> {
        None
    }

    fn get_write_signaler(&self) -> Option<&Signaler> {
        None
    }
}
