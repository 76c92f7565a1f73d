#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod clock;
pub mod config;
pub mod futex;
pub mod poll;
pub mod process;
pub mod random;
pub mod scheduler;
pub mod stores;
pub mod syscall;
pub mod thread;

pub use clock::{ClockStore, TickSource};
pub use futex::FutexTable;
pub use process::{ExitStatus, FdMapping, Process, ProcessFd};
pub use random::{RandomSource, RandomStore};
pub use scheduler::{ContextSwitch, NoopContextSwitch, Scheduler};
pub use stores::{
    make_blockdev_store_sock, make_interface_store_sock, BlockDevStore, Driver, DriverStore,
    HwType, Interface, InterfaceStore, ProcessStore, TextCommandSock,
};
pub use thread::{Thread, ThreadState};
