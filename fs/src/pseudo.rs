//! Pseudo (reverse) filesystem bridge (design §4.10).
//!
//! A pseudo-FD forwards every [`FileDescriptor`] operation across a stream
//! socket to a userland process acting as the real filesystem; the userland
//! side answers by sending back a reply tagged with the same request id.
//! Grounded in the teacher's message-passing style in `fs/src/vfs/ops.rs`
//! (dispatch-by-opcode) and in `original_source/userland/pseudo_test/
//! pseudo_test.cpp`, which shows the client driving exactly this
//! request/reply shape by hand over a raw socket.
//!
//! Requests never block the sender on the wire: `call` sends the encoded
//! request, then suspends the calling thread on the bridge's reply signaler
//! until a reply tagged with its id arrives, or until the peer disconnects
//! (every outstanding call then fails [`Errno::Pipe`], matching design §4.10
//! "peer close fails every outstanding request pipe-error").

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use cosix_abi::{Errno, FdFlags, FdStat, FileStat, FileType, IoVec, IoVecMut, OFlags};
use cosix_lib::{KMutex, Signaler};

use crate::error::{FsResult, KernelError};
use crate::fd::FileDescriptor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoOp {
    Lookup { parent: u64, name: Vec<u8> },
    Open { parent: u64, name: Vec<u8>, oflags: OFlags },
    Readlink { inode: u64 },
    Symlink { parent: u64, name: Vec<u8>, target: Vec<u8> },
    Link { inode: u64, target_parent: u64, target_name: Vec<u8> },
    Rename { parent: u64, name: Vec<u8>, target_parent: u64, target_name: Vec<u8> },
    Unlink { parent: u64, name: Vec<u8> },
    Create { parent: u64, name: Vec<u8>, file_type: FileType },
    Close { inode: u64 },
    Pread { inode: u64, offset: u64, length: u32 },
    Pwrite { inode: u64, offset: u64, data: Vec<u8> },
    Datasync { inode: u64 },
    Sync,
    Readdir { inode: u64, cookie: u64 },
    StatGet { inode: u64 },
    IsReadable { inode: u64 },
    Allocate { inode: u64, offset: u64, len: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoReply {
    Ok,
    Inode(u64),
    Data(Vec<u8>),
    Stat(FileStat),
    Bool(bool),
    Err(Errno),
}

// Wire format: u64 request id, u8 opcode, then opcode-specific fields, each
// length-prefixed byte string as u32-len + bytes. Numbers are little-endian.
mod wire {
    use super::*;

    pub fn push_u64(buf: &mut Vec<u8>, v: u64) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_bytes(buf: &mut Vec<u8>, data: &[u8]) {
        push_u32(buf, data.len() as u32);
        buf.extend_from_slice(data);
    }

    pub struct Reader<'a> {
        data: &'a [u8],
        pos: usize,
    }

    impl<'a> Reader<'a> {
        pub fn new(data: &'a [u8]) -> Self {
            Self { data, pos: 0 }
        }

        pub fn u64(&mut self) -> FsResult<u64> {
            let bytes = self.take(8)?;
            Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
        }

        pub fn u32(&mut self) -> FsResult<u32> {
            let bytes = self.take(4)?;
            Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
        }

        pub fn u8(&mut self) -> FsResult<u8> {
            Ok(self.take(1)?[0])
        }

        pub fn bytes(&mut self) -> FsResult<Vec<u8>> {
            let len = self.u32()? as usize;
            Ok(self.take(len)?.to_vec())
        }

        fn take(&mut self, n: usize) -> FsResult<&'a [u8]> {
            if self.pos + n > self.data.len() {
                return Err(KernelError::Errno(Errno::Io));
            }
            let slice = &self.data[self.pos..self.pos + n];
            self.pos += n;
            Ok(slice)
        }
    }
}

fn encode_request(id: u64, op: &PseudoOp) -> Vec<u8> {
    use wire::*;
    let mut buf = Vec::new();
    push_u64(&mut buf, id);
    match op {
        PseudoOp::Lookup { parent, name } => {
            buf.push(0);
            push_u64(&mut buf, *parent);
            push_bytes(&mut buf, name);
        }
        PseudoOp::Open { parent, name, oflags } => {
            buf.push(1);
            push_u64(&mut buf, *parent);
            push_bytes(&mut buf, name);
            push_u32(&mut buf, oflags.bits() as u32);
        }
        PseudoOp::Readlink { inode } => {
            buf.push(2);
            push_u64(&mut buf, *inode);
        }
        PseudoOp::Symlink { parent, name, target } => {
            buf.push(3);
            push_u64(&mut buf, *parent);
            push_bytes(&mut buf, name);
            push_bytes(&mut buf, target);
        }
        PseudoOp::Link { inode, target_parent, target_name } => {
            buf.push(4);
            push_u64(&mut buf, *inode);
            push_u64(&mut buf, *target_parent);
            push_bytes(&mut buf, target_name);
        }
        PseudoOp::Rename { parent, name, target_parent, target_name } => {
            buf.push(5);
            push_u64(&mut buf, *parent);
            push_bytes(&mut buf, name);
            push_u64(&mut buf, *target_parent);
            push_bytes(&mut buf, target_name);
        }
        PseudoOp::Unlink { parent, name } => {
            buf.push(6);
            push_u64(&mut buf, *parent);
            push_bytes(&mut buf, name);
        }
        PseudoOp::Create { parent, name, file_type } => {
            buf.push(7);
            push_u64(&mut buf, *parent);
            push_bytes(&mut buf, name);
            buf.push(*file_type as u8);
        }
        PseudoOp::Close { inode } => {
            buf.push(8);
            push_u64(&mut buf, *inode);
        }
        PseudoOp::Pread { inode, offset, length } => {
            buf.push(9);
            push_u64(&mut buf, *inode);
            push_u64(&mut buf, *offset);
            push_u32(&mut buf, *length);
        }
        PseudoOp::Pwrite { inode, offset, data } => {
            buf.push(10);
            push_u64(&mut buf, *inode);
            push_u64(&mut buf, *offset);
            push_bytes(&mut buf, data);
        }
        PseudoOp::Datasync { inode } => {
            buf.push(11);
            push_u64(&mut buf, *inode);
        }
        PseudoOp::Sync => {
            buf.push(12);
        }
        PseudoOp::Readdir { inode, cookie } => {
            buf.push(13);
            push_u64(&mut buf, *inode);
            push_u64(&mut buf, *cookie);
        }
        PseudoOp::StatGet { inode } => {
            buf.push(14);
            push_u64(&mut buf, *inode);
        }
        PseudoOp::IsReadable { inode } => {
            buf.push(15);
            push_u64(&mut buf, *inode);
        }
        PseudoOp::Allocate { inode, offset, len } => {
            buf.push(16);
            push_u64(&mut buf, *inode);
            push_u64(&mut buf, *offset);
            push_u64(&mut buf, *len);
        }
    }
    buf
}

/// Only needed to let tests stand in for the remote userland peer; the
/// kernel side of the bridge never encodes a reply, only requests.
#[cfg(test)]
fn encode_reply(id: u64, reply: &PseudoReply) -> Vec<u8> {
    use wire::*;
    let mut buf = Vec::new();
    push_u64(&mut buf, id);
    match reply {
        PseudoReply::Ok => buf.push(0),
        PseudoReply::Inode(inode) => {
            buf.push(1);
            push_u64(&mut buf, *inode);
        }
        PseudoReply::Data(data) => {
            buf.push(2);
            push_bytes(&mut buf, data);
        }
        PseudoReply::Stat(stat) => {
            buf.push(3);
            push_u64(&mut buf, stat.device);
            push_u64(&mut buf, stat.inode);
            buf.push(stat.file_type as u8);
            push_u64(&mut buf, stat.size);
        }
        PseudoReply::Bool(b) => {
            buf.push(4);
            buf.push(*b as u8);
        }
        PseudoReply::Err(errno) => {
            buf.push(5);
            push_u32(&mut buf, errno.as_u16() as u32);
        }
    }
    buf
}

fn decode_reply(data: &[u8]) -> FsResult<(u64, PseudoReply)> {
    let mut reader = wire::Reader::new(data);
    let id = reader.u64()?;
    let tag = reader.u8()?;
    let reply = match tag {
        0 => PseudoReply::Ok,
        1 => PseudoReply::Inode(reader.u64()?),
        2 => PseudoReply::Data(reader.bytes()?),
        3 => {
            let device = reader.u64()?;
            let inode = reader.u64()?;
            let file_type = file_type_from_u8(reader.u8()?)?;
            let size = reader.u64()?;
            PseudoReply::Stat(FileStat::new(device, inode, file_type, size))
        }
        4 => PseudoReply::Bool(reader.u8()? != 0),
        5 => PseudoReply::Err(errno_from_u16(reader.u32()? as u16)?),
        _ => return Err(KernelError::Errno(Errno::Io)),
    };
    Ok((id, reply))
}

fn file_type_from_u8(v: u8) -> FsResult<FileType> {
    Ok(match v {
        0 => FileType::Unknown,
        1 => FileType::BlockDevice,
        2 => FileType::CharacterDevice,
        3 => FileType::Directory,
        4 => FileType::RegularFile,
        5 => FileType::SocketDgram,
        6 => FileType::SocketStream,
        7 => FileType::SymbolicLink,
        8 => FileType::Process,
        9 => FileType::SharedMemory,
        _ => return Err(KernelError::Errno(Errno::Io)),
    })
}

fn errno_from_u16(v: u16) -> FsResult<Errno> {
    // Round-trips through `Errno::Io` for any value this boot's ABI doesn't
    // recognise, rather than panicking on a foreign peer's wire data.
    Ok(match v {
        x if x == Errno::Success.as_u16() => Errno::Success,
        x if x == Errno::Again.as_u16() => Errno::Again,
        x if x == Errno::BadF.as_u16() => Errno::BadF,
        x if x == Errno::Exist.as_u16() => Errno::Exist,
        x if x == Errno::Inval.as_u16() => Errno::Inval,
        x if x == Errno::Io.as_u16() => Errno::Io,
        x if x == Errno::NoEnt.as_u16() => Errno::NoEnt,
        x if x == Errno::NotDir.as_u16() => Errno::NotDir,
        x if x == Errno::NotSupported.as_u16() => Errno::NotSupported,
        x if x == Errno::Pipe.as_u16() => Errno::Pipe,
        x if x == Errno::RoFs.as_u16() => Errno::RoFs,
        x if x == Errno::NotConnected.as_u16() => Errno::NotConnected,
        _ => Errno::Io,
    })
}

/// One side of a pseudo-FD bridge. `transport` is a connected stream socket
/// (typically a [`crate::unixsock::UnixSock`]) to the backing userland
/// process.
pub struct PseudoBridge {
    transport: Arc<dyn FileDescriptor>,
    next_id: AtomicU64,
    pending: KMutex<BTreeMap<u64, PseudoReply>>,
    reply_signaler: Signaler,
    connected: AtomicBool,
    // Serialises `call`: only one request is ever in flight per bridge, so
    // whichever thread's `pump_one` wakes always owns the reply it reads.
    call_lock: KMutex<()>,
}

impl PseudoBridge {
    pub fn new(transport: Arc<dyn FileDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            next_id: AtomicU64::new(1),
            pending: KMutex::new(BTreeMap::new()),
            reply_signaler: Signaler::new(),
            connected: AtomicBool::new(true),
            call_lock: KMutex::new(()),
        })
    }

    /// Sends `op` and blocks until its matching reply arrives or the peer
    /// disconnects. Drives its own receive loop: since one bridge serves
    /// one caller at a time from the kernel side, there is no separate
    /// pump thread to hand incoming bytes to.
    pub fn call(&self, op: PseudoOp) -> FsResult<PseudoReply> {
        let _serialized = self.call_lock.lock();
        if !self.connected.load(Ordering::Acquire) {
            return Err(KernelError::Errno(Errno::NotConnected));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = encode_request(id, &op);
        self.transport.sock_send(&[IoVec::new(&request)], &[])?;

        loop {
            if let Some(reply) = self.pending.lock().remove(&id) {
                return Ok(reply);
            }
            if !self.pump_one()? {
                return Err(KernelError::Errno(Errno::Pipe));
            }
        }
    }

    /// Reads and dispatches at most one reply frame. Returns `false` if
    /// nothing was available right now.
    fn pump_one(&self) -> FsResult<bool> {
        let mut buf = alloc::vec![0u8; crate::config::PSEUDO_MAX_MESSAGE_BYTES];
        let mut iovs = [IoVecMut::new(&mut buf)];
        let result = self.transport.sock_recv(&mut iovs, &mut [])?;
        if result.bytes == 0 {
            self.mark_disconnected();
            return Ok(false);
        }
        let (id, reply) = decode_reply(&buf[..result.bytes])?;
        self.pending.lock().insert(id, reply);
        self.reply_signaler.broadcast();
        Ok(true)
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        self.reply_signaler.broadcast();
    }
}

/// A directory-typed FD whose operations are served by a [`PseudoBridge`]
/// peer process, identified on the remote side by `inode` (design §4.10:
/// "the client chooses a 64-bit id naming the object on the remote side").
pub struct PseudoFd {
    bridge: Arc<PseudoBridge>,
    inode: u64,
    flags: AtomicU64,
}

impl PseudoFd {
    pub fn new(bridge: Arc<PseudoBridge>, inode: u64) -> Arc<Self> {
        Arc::new(Self { bridge, inode, flags: AtomicU64::new(0) })
    }
}

impl FileDescriptor for PseudoFd {
    fn file_type(&self) -> FileType {
        FileType::Directory
    }

    fn flags(&self) -> FdFlags {
        FdFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed) as u16)
    }

    fn set_flags(&self, flags: FdFlags) {
        self.flags.store(flags.bits() as u64, Ordering::Relaxed);
    }

    fn stat_get(&self) -> FsResult<FileStat> {
        match self.bridge.call(PseudoOp::StatGet { inode: self.inode })? {
            PseudoReply::Stat(stat) => Ok(stat),
            PseudoReply::Err(e) => Err(KernelError::Errno(e)),
            _ => Err(KernelError::Errno(Errno::Io)),
        }
    }

    fn openat(&self, path: &[u8], oflags: OFlags, _fdstat: FdStat) -> FsResult<Arc<dyn FileDescriptor>> {
        let reply = self.bridge.call(PseudoOp::Open { parent: self.inode, name: path.to_vec(), oflags })?;
        match reply {
            PseudoReply::Inode(child) => Ok(PseudoFd::new(self.bridge.clone(), child)),
            PseudoReply::Err(e) => Err(KernelError::Errno(e)),
            _ => Err(KernelError::Errno(Errno::Io)),
        }
    }

    fn file_stat(&self, name: &[u8]) -> FsResult<FileStat> {
        let looked_up = self.bridge.call(PseudoOp::Lookup { parent: self.inode, name: name.to_vec() })?;
        let inode = match looked_up {
            PseudoReply::Inode(inode) => inode,
            PseudoReply::Err(e) => return Err(KernelError::Errno(e)),
            _ => return Err(KernelError::Errno(Errno::Io)),
        };
        match self.bridge.call(PseudoOp::StatGet { inode })? {
            PseudoReply::Stat(stat) => Ok(stat),
            PseudoReply::Err(e) => Err(KernelError::Errno(e)),
            _ => Err(KernelError::Errno(Errno::Io)),
        }
    }

    fn file_create(&self, name: &[u8], file_type: FileType) -> FsResult<()> {
        match self.bridge.call(PseudoOp::Create { parent: self.inode, name: name.to_vec(), file_type })? {
            PseudoReply::Ok | PseudoReply::Inode(_) => Ok(()),
            PseudoReply::Err(e) => Err(KernelError::Errno(e)),
            _ => Err(KernelError::Errno(Errno::Io)),
        }
    }

    fn file_unlink(&self, name: &[u8]) -> FsResult<()> {
        match self.bridge.call(PseudoOp::Unlink { parent: self.inode, name: name.to_vec() })? {
            PseudoReply::Ok => Ok(()),
            PseudoReply::Err(e) => Err(KernelError::Errno(e)),
            _ => Err(KernelError::Errno(Errno::Io)),
        }
    }

    fn file_symlink(&self, target: &[u8], name: &[u8]) -> FsResult<()> {
        match self.bridge.call(PseudoOp::Symlink { parent: self.inode, name: name.to_vec(), target: target.to_vec() })? {
            PseudoReply::Ok => Ok(()),
            PseudoReply::Err(e) => Err(KernelError::Errno(e)),
            _ => Err(KernelError::Errno(Errno::Io)),
        }
    }

    fn file_readlink(&self, name: &[u8], buf: &mut [u8]) -> FsResult<usize> {
        let looked_up = self.bridge.call(PseudoOp::Lookup { parent: self.inode, name: name.to_vec() })?;
        let inode = match looked_up {
            PseudoReply::Inode(inode) => inode,
            PseudoReply::Err(e) => return Err(KernelError::Errno(e)),
            _ => return Err(KernelError::Errno(Errno::Io)),
        };
        match self.bridge.call(PseudoOp::Readlink { inode })? {
            PseudoReply::Data(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            PseudoReply::Err(e) => Err(KernelError::Errno(e)),
            _ => Err(KernelError::Errno(Errno::Io)),
        }
    }

    fn readdir(&self, cookie: u64, buf: &mut [u8]) -> FsResult<(usize, u64)> {
        match self.bridge.call(PseudoOp::Readdir { inode: self.inode, cookie })? {
            PseudoReply::Data(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok((n, cookie + 1))
            }
            PseudoReply::Err(e) => Err(KernelError::Errno(e)),
            _ => Err(KernelError::Errno(Errno::Io)),
        }
    }

    fn pread(&self, iovs: &mut [IoVecMut<'_>], offset: u64) -> FsResult<usize> {
        let length = cosix_abi::iovec::iovecs_capacity(iovs).min(crate::config::PSEUDO_MAX_MESSAGE_BYTES) as u32;
        match self.bridge.call(PseudoOp::Pread { inode: self.inode, offset, length })? {
            PseudoReply::Data(data) => {
                let (copied, _truncated) = cosix_abi::iovec::copy_into_iovecs(iovs, &data);
                Ok(copied)
            }
            PseudoReply::Err(e) => Err(KernelError::Errno(e)),
            _ => Err(KernelError::Errno(Errno::Io)),
        }
    }

    fn pwrite(&self, iovs: &[IoVec<'_>], offset: u64) -> FsResult<usize> {
        let mut data = Vec::new();
        for iov in iovs {
            data.extend_from_slice(iov.buf);
        }
        let len = data.len();
        match self.bridge.call(PseudoOp::Pwrite { inode: self.inode, offset, data })? {
            PseudoReply::Ok => Ok(len),
            PseudoReply::Err(e) => Err(KernelError::Errno(e)),
            _ => Err(KernelError::Errno(Errno::Io)),
        }
    }

    fn sync(&self) -> FsResult<()> {
        match self.bridge.call(PseudoOp::Sync)? {
            PseudoReply::Ok => Ok(()),
            PseudoReply::Err(e) => Err(KernelError::Errno(e)),
            _ => Err(KernelError::Errno(Errno::Io)),
        }
    }

    fn datasync(&self) -> FsResult<()> {
        match self.bridge.call(PseudoOp::Datasync { inode: self.inode })? {
            PseudoReply::Ok => Ok(()),
            PseudoReply::Err(e) => Err(KernelError::Errno(e)),
            _ => Err(KernelError::Errno(Errno::Io)),
        }
    }
}

impl Drop for PseudoFd {
    fn drop(&mut self) {
        let _ = self.bridge.call(PseudoOp::Close { inode: self.inode });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unixsock::{SockKind, UnixSock};

    #[test]
    fn request_reply_round_trips_through_wire_encoding() {
        let op = PseudoOp::Lookup { parent: 4, name: alloc::vec![b'a', b'b'] };
        let encoded = encode_request(7, &op);
        let mut reader = wire::Reader::new(&encoded);
        assert_eq!(reader.u64().unwrap(), 7);
        assert_eq!(reader.u8().unwrap(), 0);
        assert_eq!(reader.u64().unwrap(), 4);
        assert_eq!(reader.bytes().unwrap(), alloc::vec![b'a', b'b']);
    }

    #[test]
    fn reply_encoding_round_trips() {
        let encoded = encode_reply(9, &PseudoReply::Inode(42));
        let (id, reply) = decode_reply(&encoded).unwrap();
        assert_eq!(id, 9);
        assert_eq!(reply, PseudoReply::Inode(42));
    }

    #[test]
    fn lookup_failure_surfaces_remote_errno() {
        let (kernel_side, user_side) = UnixSock::pair(SockKind::Stream, 1, 2);
        let bridge = PseudoBridge::new(kernel_side);
        let fd = PseudoFd::new(bridge, 1);

        // This test never runs a real scheduler, so a call that has to wait
        // on a reply would spin forever. Queue the reply for request id 1
        // (the first id `PseudoBridge` ever hands out) up front, so by the
        // time `file_stat` reaches its receive loop the answer is already
        // sitting in the transport's queue and no wait is needed.
        let reply = encode_reply(1, &PseudoReply::Err(Errno::NoEnt));
        user_side.sock_send(&[IoVec::new(&reply)], &[]).unwrap();

        let err = fd.file_stat(b"missing").unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::NoEnt));
    }

    #[test]
    fn peer_disconnect_fails_pending_call_with_pipe() {
        let (kernel_side, user_side) = UnixSock::pair(SockKind::Stream, 1, 2);
        let bridge = PseudoBridge::new(kernel_side);
        let fd = PseudoFd::new(bridge, 1);
        drop(user_side);

        let err = fd.stat_get().unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::Pipe));
    }
}
