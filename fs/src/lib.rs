#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod blockdev;
pub mod config;
pub mod error;
pub mod fd;
pub mod initrd;
pub mod listen_store;
pub mod partition;
pub mod pseudo;
pub mod rawsock;
pub mod terminal;
pub mod unixsock;
pub mod vfs;

pub use blockdev::{BlockDev, SectorDevice};
pub use error::{FsResult, KernelError, KernelResult};
pub use fd::{FileDescriptor, RecvResult, ShutdownHow};
pub use initrd::{INITRD_DEVICE, mount as mount_initrd};
pub use listen_store::ListenStore;
pub use partition::Partition;
pub use pseudo::{PseudoBridge, PseudoFd, PseudoOp, PseudoReply};
pub use rawsock::{NetworkInterface, RawSock};
pub use terminal::{OutputSink, Terminal, TerminalFd};
pub use unixsock::{SockKind, UnixSock, connect as connect_unix_socket};
pub use vfs::{TraverseResult, openat, traverse};
