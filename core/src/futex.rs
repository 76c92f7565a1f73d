//! Userland locks and condition variables (design §4.6 "Userland locks and
//! CVs").
//!
//! The CloudABI syscall surface has no blocking futex-wait call: a thread
//! waits on a lock or CV word by issuing `poll` with a lock-acquire or
//! condvar subscription (design §4.12), which attaches a `Condition` to the
//! signaler this table hands out. `futex.rs` itself only needs the
//! addr-to-signaler table and the two wake-side syscalls, `lock_unlock` and
//! `condvar_signal`; waiting is entirely `poll.rs`'s job.
//!
//! One simplification worth noting: `condvar_signal`'s wake-count `n` can't
//! be honoured precisely, since [`cosix_lib::Signaler::broadcast`] always
//! wakes every attached waiter. A CV signal therefore wakes all current
//! waiters rather than exactly `n` of them.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use cosix_lib::{KMutex, Signaler};

/// Maps a userland lock/CV word's virtual address to the signaler waiters
/// attach to. Entries are created lazily on first wait/signal and pruned
/// once nothing references them.
pub struct FutexTable {
    entries: KMutex<BTreeMap<u64, Arc<Signaler>>>,
}

impl FutexTable {
    pub const fn new() -> Self {
        Self {
            entries: KMutex::new(BTreeMap::new()),
        }
    }

    /// The signaler for `addr`, creating it if this is the first reference.
    pub fn get_or_create(&self, addr: u64) -> Arc<Signaler> {
        self.entries
            .lock()
            .entry(addr)
            .or_insert_with(|| Arc::new(Signaler::new()))
            .clone()
    }

    /// Drop `addr`'s entry once nothing but this table still holds it
    /// (the caller's own clone plus whatever `poll` conditions have
    /// attached already keep the `Arc` alive as long as needed).
    pub fn remove_if_unused(&self, addr: u64) {
        let mut entries = self.entries.lock();
        if let Some(signaler) = entries.get(&addr) {
            if Arc::strong_count(signaler) == 1 && !signaler.has_waiters() {
                entries.remove(&addr);
            }
        }
    }

    /// `lock_unlock(addr, scope)` (design §4.6): transfers ownership to one
    /// waiter, or simply clears the word if none. This table cannot single
    /// out "one" waiter (broadcast wakes everyone attached); the syscall
    /// handler that owns the actual word contents is responsible for
    /// re-arbitrating ownership among whoever wakes up first.
    pub fn lock_unlock(&self, addr: u64) {
        if let Some(signaler) = self.entries.lock().get(&addr).cloned() {
            signaler.broadcast();
        }
        self.remove_if_unused(addr);
    }

    /// `condvar_signal(addr, scope, n)` (design §4.6). See the module-level
    /// note: this wakes every attached waiter regardless of `n`.
    pub fn condvar_signal(&self, addr: u64, n: u32) {
        let _ = n;
        self.lock_unlock(addr);
    }
}

impl Default for FutexTable {
    fn default() -> Self {
        Self::new()
    }
}
