//! The syscall surface (design §4.4): argument/result plumbing, one module
//! per syscall group, and the dispatch table tying them to
//! [`cosix_abi::syscall::SyscallNo`].

pub mod clock_handlers;
pub mod context;
pub mod dispatch;
pub mod fd_handlers;
pub mod file_handlers;
pub mod mem_handlers;
pub mod net_handlers;
pub mod poll_handlers;
pub mod process_handlers;

pub use context::{SyscallArgs, SyscallContext, SyscallResult};
pub use dispatch::{dispatch, SyscallPayload};
