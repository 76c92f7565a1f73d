#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[cfg(feature = "alloc-debug")]
pub mod alloc_debug;
pub mod condition;
pub mod error;
pub mod klog;
pub mod ports;
pub mod spinlock;

pub use condition::{Condition, Signaler, ThreadHandle, register_scheduler_hooks, wait_until};
pub use error::{ErrorCategory, KernelError, KernelResult};
pub use klog::{KlogLevel, klog_get_level, klog_init, klog_set_level};
pub use spinlock::{KMutex, KMutexGuard};
