//! Raw network socket FD (design §2 "Raw socket... FDs", §6 "raw-frame
//! plumbing and interface registration only").
//!
//! Grounded in `original_source/fd/rawsock.cpp`: a raw socket is bound to one
//! network interface for its whole life, receives whatever frames the
//! interface delivers into a bounded queue, and sends frames straight through
//! the interface with no protocol interpretation. The interface itself (and
//! the store that looks interfaces up by name) is an external collaborator
//! per design §6; this module only needs the narrow [`NetworkInterface`]
//! boundary to stay decoupled from the driver layer.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use cosix_abi::iovec::copy_into_iovecs;
use cosix_abi::{Errno, FdFlags, FileStat, FileType, IoVec, IoVecMut};
use cosix_lib::{KMutex, Signaler, wait_until};

use crate::config::{SOCK_MAX_MESSAGE_BYTES, SOCK_MAX_QUEUED_BYTES, SOCK_MAX_QUEUED_MESSAGES};
use crate::error::{FsResult, KernelError};
use crate::fd::{FileDescriptor, RecvResult, ShutdownHow};

/// A network interface that can send a raw frame and accept subscribers.
/// Implemented by whatever driver owns the interface (out of scope here);
/// `RawSock` is just one subscriber.
pub trait NetworkInterface: Send + Sync {
    fn send_frame(&self, frame: &[u8]) -> FsResult<()>;
}

struct Queue {
    frames: VecDeque<Vec<u8>>,
    bytes: usize,
}

impl Queue {
    const fn new() -> Self {
        Self { frames: VecDeque::new(), bytes: 0 }
    }

    fn is_full(&self) -> bool {
        self.frames.len() >= SOCK_MAX_QUEUED_MESSAGES || self.bytes >= SOCK_MAX_QUEUED_BYTES
    }

    fn push(&mut self, frame: Vec<u8>) {
        self.bytes += frame.len();
        self.frames.push_back(frame);
    }

    fn pop(&mut self) -> Option<Vec<u8>> {
        let frame = self.frames.pop_front()?;
        self.bytes -= frame.len();
        Some(frame)
    }
}

pub struct RawSock {
    iface: Arc<dyn NetworkInterface>,
    flags: AtomicU16,
    shutdown: AtomicBool,
    queue: KMutex<Queue>,
    read_signaler: Signaler,
}

impl RawSock {
    pub fn new(iface: Arc<dyn NetworkInterface>, flags: FdFlags) -> Arc<Self> {
        Arc::new(Self {
            iface,
            flags: AtomicU16::new(flags.bits()),
            shutdown: AtomicBool::new(false),
            queue: KMutex::new(Queue::new()),
            read_signaler: Signaler::new(),
        })
    }

    fn is_nonblocking(&self) -> bool {
        FdFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed)).contains(FdFlags::NONBLOCK)
    }

    /// Called by the owning interface when a frame arrives off the wire.
    /// Drops the frame if the queue is already full rather than blocking the
    /// driver (design §5: the kernel-running thread must never stall on a
    /// slow reader).
    pub fn frame_received(&self, frame: &[u8]) {
        let mut queue = self.queue.lock();
        if queue.is_full() {
            return;
        }
        queue.push(frame.to_vec());
        drop(queue);
        self.read_signaler.broadcast();
    }
}

impl FileDescriptor for RawSock {
    fn file_type(&self) -> FileType {
        FileType::SocketDgram
    }

    fn flags(&self) -> FdFlags {
        FdFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed))
    }

    fn set_flags(&self, flags: FdFlags) {
        self.flags.store(flags.bits(), Ordering::Relaxed);
    }

    fn stat_get(&self) -> FsResult<FileStat> {
        Ok(FileStat::new(0, 0, FileType::SocketDgram, 0))
    }

    fn sock_shutdown(&self, how: ShutdownHow) -> FsResult<()> {
        if matches!(how, ShutdownHow::Write | ShutdownHow::Both) {
            self.shutdown.store(true, Ordering::Release);
        }
        Ok(())
    }

    fn sock_stat_get(&self) -> FsResult<FileStat> {
        self.stat_get()
    }

    fn sock_recv(
        &self,
        iovs: &mut [IoVecMut<'_>],
        fd_slots: &mut [Option<Arc<dyn FileDescriptor>>],
    ) -> FsResult<RecvResult> {
        let _ = fd_slots;
        loop {
            if let Some(frame) = self.queue.lock().pop() {
                let (bytes, data_truncated) = copy_into_iovecs(iovs, &frame);
                return Ok(RecvResult { bytes, fds_received: 0, data_truncated, fds_truncated: false });
            }
            if self.is_nonblocking() {
                return Err(KernelError::Errno(Errno::Again));
            }
            wait_until(&self.read_signaler, || !self.queue.lock().frames.is_empty());
        }
    }

    fn sock_send(&self, iovs: &[IoVec<'_>], fds: &[Arc<dyn FileDescriptor>]) -> FsResult<usize> {
        if !fds.is_empty() {
            return Err(KernelError::Errno(Errno::Inval));
        }
        if self.shutdown.load(Ordering::Acquire) {
            return Err(KernelError::Errno(Errno::Pipe));
        }
        let total: usize = iovs.iter().map(|v| v.len()).sum();
        if total > SOCK_MAX_MESSAGE_BYTES {
            return Err(KernelError::Errno(Errno::MsgSize));
        }
        let mut frame = Vec::with_capacity(total);
        for iov in iovs {
            frame.extend_from_slice(iov.buf);
        }
        self.iface.send_frame(&frame)?;
        Ok(total)
    }

    fn get_read_signaler(&self) -> Option<&Signaler> {
        Some(&self.read_signaler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LoopbackIface {
        sent: KMutex<Vec<Vec<u8>>>,
    }

    impl NetworkInterface for LoopbackIface {
        fn send_frame(&self, frame: &[u8]) -> FsResult<()> {
            self.sent.lock().push(frame.to_vec());
            Ok(())
        }
    }

    #[test]
    fn send_forwards_frame_to_interface() {
        let iface = Arc::new(LoopbackIface { sent: KMutex::new(Vec::new()) });
        let sock = RawSock::new(iface.clone(), FdFlags::empty());
        let frame = [1u8, 2, 3, 4];
        let n = sock.sock_send(&[IoVec::new(&frame)], &[]).unwrap();
        assert_eq!(n, 4);
        assert_eq!(iface.sent.lock()[0], frame);
    }

    #[test]
    fn received_frame_is_readable() {
        let iface = Arc::new(LoopbackIface { sent: KMutex::new(Vec::new()) });
        let sock = RawSock::new(iface, FdFlags::empty());
        sock.frame_received(&[9, 8, 7]);

        let mut buf = [0u8; 16];
        let mut iovs = [IoVecMut::new(&mut buf)];
        let result = sock.sock_recv(&mut iovs, &mut []).unwrap();
        assert_eq!(result.bytes, 3);
        assert_eq!(&buf[..3], &[9, 8, 7]);
    }

    #[test]
    fn send_after_shutdown_fails_pipe() {
        let iface = Arc::new(LoopbackIface { sent: KMutex::new(Vec::new()) });
        let sock = RawSock::new(iface, FdFlags::empty());
        sock.sock_shutdown(ShutdownHow::Write).unwrap();
        let frame = [1u8];
        let err = sock.sock_send(&[IoVec::new(&frame)], &[]).unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::Pipe));
    }

    #[test]
    fn oversized_send_fails_msgsize() {
        let iface = Arc::new(LoopbackIface { sent: KMutex::new(Vec::new()) });
        let sock = RawSock::new(iface, FdFlags::empty());
        let frame = alloc::vec![0u8; SOCK_MAX_MESSAGE_BYTES + 1];
        let err = sock.sock_send(&[IoVec::new(&frame)], &[]).unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::MsgSize));
    }

    #[test]
    fn empty_queue_nonblocking_recv_fails_again() {
        let iface = Arc::new(LoopbackIface { sent: KMutex::new(Vec::new()) });
        let sock = RawSock::new(iface, FdFlags::NONBLOCK);
        let mut buf = [0u8; 16];
        let mut iovs = [IoVecMut::new(&mut buf)];
        let err = sock.sock_recv(&mut iovs, &mut []).unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::Again));
    }
}
