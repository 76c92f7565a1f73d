//! Unix-domain stream and datagram sockets (design §4.9).
//!
//! Grounded in `original_source/fd/unixsock.hpp`: a connected pair holds
//! weak back-references to each other (the strong reference lives in
//! whichever FD mappings hold the `Arc`s), a bounded receive queue per side,
//! and a separate queue of "accepting ends" a listener drains on `accept`.
//! `connect` never blocks (design §4.9: "the connecting side never blocks,
//! only `accept` does"); blocking happens through the same
//! `cosix_lib::{Signaler, wait_until}` substrate every other suspension
//! point in the kernel uses (design §4.3).

use alloc::collections::VecDeque;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU16, Ordering};

use cosix_abi::iovec::{copy_into_iovecs, iovecs_capacity};
use cosix_abi::{Errno, FdFlags, FileStat, FileType, IoVec, IoVecMut};
use cosix_lib::{KMutex, Signaler, wait_until};

use crate::config::{SOCK_MAX_FDS_PER_MESSAGE, SOCK_MAX_MESSAGE_BYTES, SOCK_MAX_QUEUED_BYTES, SOCK_MAX_QUEUED_MESSAGES};
use crate::error::{FsResult, KernelError};
use crate::fd::{FileDescriptor, RecvResult, ShutdownHow};
use crate::listen_store::ListenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockKind {
    Stream,
    Datagram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Bound { device: u64, inode: u64 },
    Listening { device: u64, inode: u64 },
    Connected,
    Shutdown,
}

struct Message {
    data: Vec<u8>,
    /// Bytes of `data` already delivered to a previous `recv` call. A stream
    /// message that didn't fit the caller's buffer whole stays queued with
    /// this advanced, the same partial-progress tracking
    /// `unixsock_message::stream_data_recv` uses in the original.
    offset: usize,
    fds: Vec<Arc<dyn FileDescriptor>>,
}

impl Message {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn remaining(&self) -> &[u8] {
        &self.data[self.offset..]
    }
}

struct RecvQueue {
    messages: VecDeque<Message>,
    bytes: usize,
}

impl RecvQueue {
    const fn new() -> Self {
        Self { messages: VecDeque::new(), bytes: 0 }
    }

    fn is_full(&self) -> bool {
        self.messages.len() >= SOCK_MAX_QUEUED_MESSAGES || self.bytes >= SOCK_MAX_QUEUED_BYTES
    }

    fn push(&mut self, msg: Message) {
        self.bytes += msg.len();
        self.messages.push_back(msg);
    }
}

/// A Unix-domain socket FD. Owns its own state behind one lock; the only
/// cross-socket interaction is pushing a message onto a peer's queue or
/// pushing an accepting end onto a listener's queue, both reached through a
/// `Weak` upgrade (design §9 "distinguishing ownership ... from navigation").
pub struct UnixSock {
    kind: SockKind,
    flags: AtomicU16,
    state: KMutex<State>,
    peer: KMutex<Weak<UnixSock>>,
    recv_queue: KMutex<RecvQueue>,
    read_signaler: Signaler,
    space_signaler: Signaler,
    listen_queue: KMutex<VecDeque<Arc<UnixSock>>>,
    listen_signaler: Signaler,
    inode: u64,
}

impl UnixSock {
    pub fn new(kind: SockKind, inode: u64) -> Arc<Self> {
        Arc::new(Self {
            kind,
            flags: AtomicU16::new(0),
            state: KMutex::new(State::Idle),
            peer: KMutex::new(Weak::new()),
            recv_queue: KMutex::new(RecvQueue::new()),
            read_signaler: Signaler::new(),
            space_signaler: Signaler::new(),
            listen_queue: KMutex::new(VecDeque::new()),
            listen_signaler: Signaler::new(),
            inode,
        })
    }

    /// Creates two connected sockets sharing no listen-store registration
    /// (design §4.9 "`socketpair` creates two peer connected sockets").
    pub fn pair(kind: SockKind, inode_a: u64, inode_b: u64) -> (Arc<Self>, Arc<Self>) {
        let a = Self::new(kind, inode_a);
        let b = Self::new(kind, inode_b);
        *a.peer.lock() = Arc::downgrade(&b);
        *b.peer.lock() = Arc::downgrade(&a);
        *a.state.lock() = State::Connected;
        *b.state.lock() = State::Connected;
        (a, b)
    }

    fn is_nonblocking(&self) -> bool {
        FdFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed)).contains(FdFlags::NONBLOCK)
    }

    fn peer_arc(&self) -> Option<Arc<UnixSock>> {
        self.peer.lock().upgrade()
    }

    /// Drains the front of a non-empty recv queue into `iovs`/`fd_slots`.
    /// Stream sockets coalesce consecutive messages' bytes across the
    /// whole call as long as none of them carry FDs (design §4.9); a
    /// message carrying FDs is always its own boundary, delivered on its
    /// own, never merged with bytes before or after it. A message that
    /// doesn't fit the caller's buffer whole is left partially queued
    /// (`Message::offset`) rather than having its remainder dropped.
    fn drain_locked(
        &self,
        queue: &mut RecvQueue,
        iovs: &mut [IoVecMut<'_>],
        fd_slots: &mut [Option<Arc<dyn FileDescriptor>>],
    ) -> RecvResult {
        let capacity = iovecs_capacity(iovs);
        let mut collected: Vec<u8> = Vec::new();
        let mut result = RecvResult::default();

        loop {
            let Some(front) = queue.messages.front_mut() else { break };
            let has_fds = !front.fds.is_empty();
            if has_fds && !collected.is_empty() {
                break;
            }

            let coalescible = self.kind == SockKind::Stream && !has_fds;
            let remaining = front.remaining().len();
            let take = if coalescible { remaining.min(capacity.saturating_sub(collected.len())) } else { remaining };
            collected.extend_from_slice(&front.data[front.offset..front.offset + take]);
            front.offset += take;
            queue.bytes -= take;

            if front.offset != front.data.len() {
                break; // buffer ran out mid-message, leave the rest queued
            }

            let finished = queue.messages.pop_front().expect("front message just matched above");
            if has_fds {
                let total_fds = finished.fds.len();
                let fd_count = total_fds.min(fd_slots.len());
                for (slot, fd) in fd_slots.iter_mut().zip(finished.fds.into_iter().take(fd_count)) {
                    *slot = Some(fd);
                }
                result.fds_received = fd_count;
                result.fds_truncated = total_fds > fd_count;
            }

            if !coalescible || collected.len() >= capacity || queue.messages.is_empty() {
                break;
            }
        }

        let (copied, truncated) = copy_into_iovecs(iovs, &collected);
        result.bytes = copied;
        result.data_truncated = truncated;
        result
    }
}

impl FileDescriptor for UnixSock {
    fn file_type(&self) -> FileType {
        match self.kind {
            SockKind::Stream => FileType::SocketStream,
            SockKind::Datagram => FileType::SocketDgram,
        }
    }

    fn flags(&self) -> FdFlags {
        FdFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed))
    }

    fn set_flags(&self, flags: FdFlags) {
        self.flags.store(flags.bits(), Ordering::Relaxed);
    }

    fn stat_get(&self) -> FsResult<FileStat> {
        Ok(FileStat::new(0, self.inode, self.file_type(), 0))
    }

    fn sock_bind(&self, device: u64, inode: u64) -> FsResult<()> {
        let mut state = self.state.lock();
        if *state != State::Idle {
            return Err(KernelError::Errno(Errno::Inval));
        }
        *state = State::Bound { device, inode };
        Ok(())
    }

    fn sock_listen(&self, _backlog: u32) -> FsResult<()> {
        let mut state = self.state.lock();
        match *state {
            State::Bound { device, inode } => {
                *state = State::Listening { device, inode };
                Ok(())
            }
            _ => Err(KernelError::Errno(Errno::Inval)),
        }
    }

    fn sock_connect(&self, device: u64, inode: u64) -> FsResult<()> {
        // A connecting socket doesn't mutate itself in place: the caller
        // gets back a *new*, already-connected FD (see the free function
        // `connect` below), so this trait method is never reached through
        // the ordinary dispatch path.
        let _ = (device, inode);
        Err(KernelError::Errno(Errno::NotSupported))
    }

    fn sock_accept(&self) -> FsResult<Arc<dyn FileDescriptor>> {
        loop {
            {
                let mut queue = self.listen_queue.lock();
                if let Some(accepted) = queue.pop_front() {
                    return Ok(accepted as Arc<dyn FileDescriptor>);
                }
            }
            if self.is_nonblocking() {
                return Err(KernelError::Errno(Errno::Again));
            }
            wait_until(&self.listen_signaler, || !self.listen_queue.lock().is_empty());
        }
    }

    fn sock_shutdown(&self, how: ShutdownHow) -> FsResult<()> {
        if matches!(how, ShutdownHow::Write | ShutdownHow::Both) {
            *self.state.lock() = State::Shutdown;
        }
        self.read_signaler.broadcast();
        if let Some(peer) = self.peer_arc() {
            peer.read_signaler.broadcast();
        }
        Ok(())
    }

    fn sock_stat_get(&self) -> FsResult<FileStat> {
        self.stat_get()
    }

    fn sock_bound_address(&self) -> Option<(u64, u64)> {
        match *self.state.lock() {
            State::Bound { device, inode } | State::Listening { device, inode } => Some((device, inode)),
            _ => None,
        }
    }

    fn register_listener(self: Arc<Self>, store: &ListenStore, device: u64, inode: u64) -> FsResult<()> {
        if !matches!(*self.state.lock(), State::Listening { .. }) {
            return Err(KernelError::Errno(Errno::Inval));
        }
        store.register(device, inode, &self);
        Ok(())
    }

    fn sock_recv(
        &self,
        iovs: &mut [IoVecMut<'_>],
        fd_slots: &mut [Option<Arc<dyn FileDescriptor>>],
    ) -> FsResult<RecvResult> {
        loop {
            {
                let mut queue = self.recv_queue.lock();
                if !queue.messages.is_empty() {
                    let result = self.drain_locked(&mut queue, iovs, fd_slots);
                    self.space_signaler.broadcast();
                    return Ok(result);
                }
            }

            let disconnected = self.peer_arc().is_none() || matches!(*self.state.lock(), State::Shutdown);
            if disconnected {
                return Ok(RecvResult::default());
            }
            if self.is_nonblocking() {
                return Err(KernelError::Errno(Errno::Again));
            }
            wait_until(&self.read_signaler, || {
                !self.recv_queue.lock().messages.is_empty()
                    || self.peer_arc().is_none()
                    || matches!(*self.state.lock(), State::Shutdown)
            });
        }
    }

    fn sock_send(&self, iovs: &[IoVec<'_>], fds: &[Arc<dyn FileDescriptor>]) -> FsResult<usize> {
        if matches!(*self.state.lock(), State::Shutdown) {
            return Err(KernelError::Errno(Errno::Pipe));
        }
        let Some(peer) = self.peer_arc() else {
            return Err(KernelError::Errno(Errno::Pipe));
        };
        if fds.len() > SOCK_MAX_FDS_PER_MESSAGE {
            return Err(KernelError::Errno(Errno::Inval));
        }

        let total: usize = iovs.iter().map(|v| v.len()).sum();
        if self.kind == SockKind::Datagram && total > SOCK_MAX_MESSAGE_BYTES {
            return Err(KernelError::Errno(Errno::MsgSize));
        }

        let mut data = Vec::with_capacity(total);
        for iov in iovs {
            data.extend_from_slice(iov.buf);
        }
        let msg = Message { data, offset: 0, fds: fds.to_vec() };
        let msg_len = msg.len();

        loop {
            {
                let mut queue = peer.recv_queue.lock();
                if !queue.is_full() {
                    queue.push(msg);
                    break;
                }
            }
            if self.is_nonblocking() {
                return Err(KernelError::Errno(Errno::Again));
            }
            wait_until(&peer.space_signaler, || !peer.recv_queue.lock().is_full());
        }

        peer.read_signaler.broadcast();
        Ok(msg_len)
    }

    fn get_read_signaler(&self) -> Option<&Signaler> {
        Some(&self.read_signaler)
    }

    fn get_write_signaler(&self) -> Option<&Signaler> {
        Some(&self.space_signaler)
    }
}

impl Drop for UnixSock {
    fn drop(&mut self) {
        self.read_signaler.broadcast();
        self.listen_signaler.broadcast();
        if let Some(peer) = self.peer_arc() {
            peer.read_signaler.broadcast();
        }
    }
}

/// `connect(path)` per design §4.9: looks the listener up by `(device,
/// inode)`, creates a connected pair, enqueues the "accepting end" on the
/// listener and returns the other end immediately without blocking.
pub fn connect(store: &ListenStore, device: u64, inode: u64) -> FsResult<Arc<UnixSock>> {
    let listener = store.lookup(device, inode).ok_or(KernelError::Errno(Errno::ConnRefused))?;
    if !matches!(*listener.state.lock(), State::Listening { .. }) {
        return Err(KernelError::Errno(Errno::ConnRefused));
    }

    let (accepting_end, connecting_end) = UnixSock::pair(listener.kind, inode, inode);
    listener.listen_queue.lock().push_back(accepting_end);
    listener.listen_signaler.broadcast();
    Ok(connecting_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosix_abi::IoVecMut;

    #[test]
    fn datagram_roundtrip_preserves_message_boundaries() {
        let (a, b) = UnixSock::pair(SockKind::Datagram, 1, 2);
        a.sock_send(&[IoVec::new(b"foo")], &[]).unwrap();
        a.sock_send(&[IoVec::new(b"bar")], &[]).unwrap();

        let mut buf = [0u8; 10];
        let mut iovs = [IoVecMut::new(&mut buf)];
        let r1 = b.sock_recv(&mut iovs, &mut []).unwrap();
        assert_eq!(&buf[..r1.bytes], b"foo");

        let mut buf2 = [0u8; 10];
        let mut iovs2 = [IoVecMut::new(&mut buf2)];
        let r2 = b.sock_recv(&mut iovs2, &mut []).unwrap();
        assert_eq!(&buf2[..r2.bytes], b"bar");
    }

    #[test]
    fn stream_recv_coalesces_consecutive_sends_with_no_fds() {
        let (a, b) = UnixSock::pair(SockKind::Stream, 1, 2);
        a.sock_send(&[IoVec::new(b"Hello ")], &[]).unwrap();
        a.sock_send(&[IoVec::new(b"world!")], &[]).unwrap();

        let mut buf = [0u8; 13];
        let mut iovs = [IoVecMut::new(&mut buf)];
        let r = b.sock_recv(&mut iovs, &mut []).unwrap();
        assert_eq!(&buf[..r.bytes], b"Hello world!");
    }

    #[test]
    fn stream_recv_splits_a_message_across_calls_when_the_buffer_is_too_small() {
        let (a, b) = UnixSock::pair(SockKind::Stream, 1, 2);
        a.sock_send(&[IoVec::new(b"Hello world!")], &[]).unwrap();

        let mut buf = [0u8; 6];
        let mut iovs = [IoVecMut::new(&mut buf)];
        let r1 = b.sock_recv(&mut iovs, &mut []).unwrap();
        assert_eq!(&buf[..r1.bytes], b"Hello ");

        let mut buf2 = [0u8; 6];
        let mut iovs2 = [IoVecMut::new(&mut buf2)];
        let r2 = b.sock_recv(&mut iovs2, &mut []).unwrap();
        assert_eq!(&buf2[..r2.bytes], b"world!");
    }

    #[test]
    fn stream_recv_does_not_coalesce_past_a_message_carrying_fds() {
        let (a, b) = UnixSock::pair(SockKind::Stream, 1, 2);
        let (fd_a, _fd_b) = UnixSock::pair(SockKind::Stream, 3, 4);
        a.sock_send(&[IoVec::new(b"tagged")], &[fd_a as Arc<dyn FileDescriptor>]).unwrap();
        a.sock_send(&[IoVec::new(b"plain")], &[]).unwrap();

        let mut buf = [0u8; 32];
        let mut fd_slots = [None];
        let mut iovs = [IoVecMut::new(&mut buf)];
        let r = b.sock_recv(&mut iovs, &mut fd_slots).unwrap();
        assert_eq!(&buf[..r.bytes], b"tagged");
        assert_eq!(r.fds_received, 1);

        let mut buf2 = [0u8; 32];
        let mut iovs2 = [IoVecMut::new(&mut buf2)];
        let r2 = b.sock_recv(&mut iovs2, &mut []).unwrap();
        assert_eq!(&buf2[..r2.bytes], b"plain");
    }

    #[test]
    fn send_after_shutdown_write_fails_pipe() {
        let (a, _b) = UnixSock::pair(SockKind::Stream, 1, 2);
        a.sock_shutdown(ShutdownHow::Write).unwrap();
        let err = a.sock_send(&[IoVec::new(b"x")], &[]).unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::Pipe));
    }

    #[test]
    fn recv_after_peer_drop_returns_zero() {
        let (a, b) = UnixSock::pair(SockKind::Stream, 1, 2);
        drop(a);
        let mut buf = [0u8; 4];
        let mut iovs = [IoVecMut::new(&mut buf)];
        let r = b.sock_recv(&mut iovs, &mut []).unwrap();
        assert_eq!(r.bytes, 0);
    }

    #[test]
    fn datagram_over_limit_fails_message_size() {
        let (a, _b) = UnixSock::pair(SockKind::Datagram, 1, 2);
        let big = alloc::vec![0u8; SOCK_MAX_MESSAGE_BYTES + 1];
        let err = a.sock_send(&[IoVec::new(&big)], &[]).unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::MsgSize));
    }

    #[test]
    fn connect_before_listen_is_connection_refused() {
        let store = ListenStore::new();
        let listener = UnixSock::new(SockKind::Stream, 7);
        listener.sock_bind(1, 7).unwrap();
        store.register(1, 7, &listener);

        let err = connect(&store, 1, 7).unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::ConnRefused));
    }

    #[test]
    fn accept_returns_connect_order() {
        let store = ListenStore::new();
        let listener = UnixSock::new(SockKind::Stream, 7);
        listener.sock_bind(1, 7).unwrap();
        listener.sock_listen(8).unwrap();
        store.register(1, 7, &listener);

        let _c1 = connect(&store, 1, 7).unwrap();
        let _c2 = connect(&store, 1, 7).unwrap();

        let accepted1 = listener.sock_accept().unwrap();
        let accepted2 = listener.sock_accept().unwrap();
        assert!(!Arc::ptr_eq(
            &(accepted1.clone() as Arc<dyn FileDescriptor>),
            &(accepted2 as Arc<dyn FileDescriptor>)
        ));
        let _ = accepted1;
    }
}
