//! Terminal FD (design §4.11 supplemented feature, grounded in
//! `original_source/term/terminal.hpp` and `term/terminal_fd.cpp`).
//!
//! A [`Terminal`] holds a bounded keystroke buffer fed by whatever drives it
//! (keyboard IRQ handler, pseudoterminal peer) and recognises ANSI escape
//! sequences written to it, stripping the ones Cosix answers itself (a
//! cursor-position report) before forwarding the rest to an [`OutputSink`].
//! The sink is the narrow boundary to the actual display (VGA text mode,
//! serial port, or a pseudoterminal's driving side), which this crate does
//! not implement (design §6: VGA/serial drivers are an external
//! collaborator). [`TerminalFd`] is the character-device FD wrapping one
//! `Terminal` for a process to `read`/`write`.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU16, Ordering};

use cosix_abi::{FdFlags, FileStat, FileType, IoVec, IoVecMut};
use cosix_lib::{KMutex, Signaler, wait_until};

use crate::config::{TERMINAL_KEYSTROKE_BUFFER_LEN, TERMINAL_OUTPUT_BUFFER_LEN};
use crate::error::{FsResult, KernelError};
use crate::fd::FileDescriptor;
use cosix_abi::Errno;

const CURSOR_POSITION_REPORT_REQUEST: &[u8] = b"\x1b[6n";
const CURSOR_POSITION_REPORT_REPLY: &[u8] = b"\x1b[1;1R";

/// Where a terminal's processed output tokens ultimately go. Implemented by
/// whatever owns the real display; tests use an in-memory stand-in.
pub trait OutputSink: Send + Sync {
    fn write_token(&self, token: &[u8]);
}

struct State {
    keystrokes: VecDeque<u8>,
    /// Bytes of an escape sequence seen so far; empty when not mid-sequence.
    escape: Vec<u8>,
    echoing: bool,
    lf_to_crlf: bool,
}

pub struct Terminal {
    sink: Arc<dyn OutputSink>,
    state: KMutex<State>,
    read_signaler: Signaler,
}

impl Terminal {
    pub fn new(sink: Arc<dyn OutputSink>) -> Arc<Self> {
        Arc::new(Self {
            sink,
            state: KMutex::new(State {
                keystrokes: VecDeque::new(),
                escape: Vec::new(),
                echoing: true,
                lf_to_crlf: true,
            }),
            read_signaler: Signaler::new(),
        })
    }

    /// Feed keystrokes in from the driving side. Input past the buffer's
    /// capacity is dropped rather than blocking the driver (design §5: the
    /// kernel-running thread must never stall on a slow reader).
    pub fn deliver_keystrokes(&self, data: &[u8]) {
        let mut state = self.state.lock();
        let echo = state.echoing;
        for &b in data {
            if state.keystrokes.len() >= TERMINAL_KEYSTROKE_BUFFER_LEN {
                break;
            }
            state.keystrokes.push_back(b);
        }
        drop(state);
        if echo {
            self.sink.write_token(data);
        }
        self.read_signaler.broadcast();
    }

    fn read_keystrokes_into(&self, buf: &mut [u8]) -> usize {
        let mut state = self.state.lock();
        let mut n = 0;
        while n < buf.len() {
            match state.keystrokes.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    fn has_keystrokes(&self) -> bool {
        !self.state.lock().keystrokes.is_empty()
    }

    /// Write output through the escape-code recogniser (design: "ANSI
    /// escape codes... some of those are specific to Cosix").
    pub fn write_output(&self, data: &[u8]) -> FsResult<()> {
        let mut state = self.state.lock();
        for &b in data {
            if !state.escape.is_empty() {
                state.escape.push(b);
                let is_final = (0x40..=0x7e).contains(&b);
                if is_final || state.escape.len() >= TERMINAL_OUTPUT_BUFFER_LEN {
                    let seq = core::mem::take(&mut state.escape);
                    self.handle_escape_code(&mut state, &seq);
                }
                continue;
            }
            if b == 0x1b {
                state.escape.push(b);
                continue;
            }
            if b == b'\n' && state.lf_to_crlf {
                self.sink.write_token(b"\r\n");
            } else {
                self.sink.write_token(core::slice::from_ref(&b));
            }
        }
        Ok(())
    }

    fn handle_escape_code(&self, state: &mut State, seq: &[u8]) {
        if seq == CURSOR_POSITION_REPORT_REQUEST {
            for &b in CURSOR_POSITION_REPORT_REPLY {
                if state.keystrokes.len() < TERMINAL_KEYSTROKE_BUFFER_LEN {
                    state.keystrokes.push_back(b);
                }
            }
            self.read_signaler.broadcast();
            return;
        }
        self.sink.write_token(seq);
    }
}

pub struct TerminalFd {
    term: Arc<Terminal>,
    flags: AtomicU16,
}

impl TerminalFd {
    pub fn new(term: Arc<Terminal>, flags: FdFlags) -> Arc<Self> {
        Arc::new(Self { term, flags: AtomicU16::new(flags.bits()) })
    }

    fn is_nonblocking(&self) -> bool {
        self.flags().contains(FdFlags::NONBLOCK)
    }
}

impl FileDescriptor for TerminalFd {
    fn file_type(&self) -> FileType {
        FileType::CharacterDevice
    }

    fn flags(&self) -> FdFlags {
        FdFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed))
    }

    fn set_flags(&self, flags: FdFlags) {
        self.flags.store(flags.bits(), Ordering::Relaxed);
    }

    fn stat_get(&self) -> FsResult<FileStat> {
        Ok(FileStat::new(0, 0, FileType::CharacterDevice, 0))
    }

    fn read(&self, iovs: &mut [IoVecMut<'_>]) -> FsResult<usize> {
        loop {
            let mut total = 0;
            for iov in iovs.iter_mut() {
                let n = self.term.read_keystrokes_into(iov.buf);
                total += n;
                if n < iov.buf.len() {
                    break;
                }
            }
            if total > 0 {
                return Ok(total);
            }
            if self.is_nonblocking() {
                return Err(KernelError::Errno(Errno::Again));
            }
            wait_until(&self.term.read_signaler, || self.term.has_keystrokes());
        }
    }

    fn write(&self, iovs: &[IoVec<'_>]) -> FsResult<usize> {
        let mut total = 0;
        for iov in iovs {
            self.term.write_output(iov.buf)?;
            total += iov.len();
        }
        Ok(total)
    }

    fn get_read_signaler(&self) -> Option<&Signaler> {
        Some(&self.term.read_signaler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectingSink {
        tokens: KMutex<Vec<u8>>,
    }

    impl OutputSink for CollectingSink {
        fn write_token(&self, token: &[u8]) {
            self.tokens.lock().extend_from_slice(token);
        }
    }

    fn sink() -> Arc<CollectingSink> {
        Arc::new(CollectingSink { tokens: KMutex::new(Vec::new()) })
    }

    #[test]
    fn plain_output_passes_through() {
        let sink = sink();
        let term = Terminal::new(sink.clone());
        let fd = TerminalFd::new(term, FdFlags::empty());
        fd.write(&[IoVec::new(b"hi")]).unwrap();
        assert_eq!(&sink.tokens.lock()[..], b"hi");
    }

    #[test]
    fn lf_is_translated_to_crlf() {
        let sink = sink();
        let term = Terminal::new(sink.clone());
        let fd = TerminalFd::new(term, FdFlags::empty());
        fd.write(&[IoVec::new(b"a\nb")]).unwrap();
        assert_eq!(&sink.tokens.lock()[..], b"a\r\nb");
    }

    #[test]
    fn cursor_position_report_is_answered_internally() {
        let sink = sink();
        let term = Terminal::new(sink.clone());
        term.write_output(CURSOR_POSITION_REPORT_REQUEST).unwrap();
        // Answered from the keystroke buffer, never forwarded to the sink.
        assert!(sink.tokens.lock().is_empty());
        let mut buf = [0u8; 16];
        let n = term.read_keystrokes_into(&mut buf);
        assert_eq!(&buf[..n], CURSOR_POSITION_REPORT_REPLY);
    }

    #[test]
    fn keystrokes_delivered_are_readable() {
        let sink = sink();
        let term = Terminal::new(sink);
        let fd = TerminalFd::new(term.clone(), FdFlags::NONBLOCK);
        term.deliver_keystrokes(b"ls\n");
        let mut buf = [0u8; 8];
        let mut iovs = [IoVecMut::new(&mut buf)];
        let n = fd.read(&mut iovs).unwrap();
        assert_eq!(&buf[..n], b"ls\n");
    }

    #[test]
    fn nonblocking_read_with_no_keystrokes_fails_again() {
        let sink = sink();
        let term = Terminal::new(sink);
        let fd = TerminalFd::new(term, FdFlags::NONBLOCK);
        let mut buf = [0u8; 8];
        let mut iovs = [IoVecMut::new(&mut buf)];
        let err = fd.read(&mut iovs).unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::Again));
    }

    #[test]
    fn keystroke_buffer_drops_input_past_capacity() {
        let sink = sink();
        let term = Terminal::new(sink);
        let overflow = alloc::vec![b'x'; TERMINAL_KEYSTROKE_BUFFER_LEN + 10];
        term.deliver_keystrokes(&overflow);
        assert_eq!(term.state.lock().keystrokes.len(), TERMINAL_KEYSTROKE_BUFFER_LEN);
    }
}
