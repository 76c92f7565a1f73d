//! Thread state (design §3 "Thread", §4.6 "Thread Model").
//!
//! Threads are cooperative: a thread only ever stops running at an explicit
//! suspension point (`wait`/`yield`), never preemptively (design §5). The
//! state machine here is just bookkeeping for [`crate::scheduler::Scheduler`]
//! — the actual stopping and resuming of execution is the `ContextSwitch`
//! callback the scheduler holds.

use alloc::collections::BTreeSet;
use alloc::sync::Weak;

use cosix_lib::{KMutex, ThreadHandle};

use crate::process::Process;

/// Where a thread sits in the cooperative run queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Eligible to run, waiting in the ready queue.
    Runnable,
    /// Currently the one thread executing kernel/user code.
    Running,
    /// Waiting on a condition (syscall, futex, poll); not in the ready queue.
    Blocked,
    Exited,
}

/// One thread of execution. Holds a `Weak` back-reference to its owning
/// [`Process`] rather than the reverse, so a process can be torn down
/// without every thread having to be dropped first (design §9 cyclic
/// ownership, the same pattern as `UnixSock` peers).
pub struct Thread {
    pub id: ThreadHandle,
    pub process: Weak<Process>,
    state: KMutex<ThreadState>,
    /// Whether this thread currently has a [`cosix_lib::condition::Condition`]
    /// attached (design §3 "a 'blocked on' pointer, exactly one condition at
    /// a time"). `cosix_lib::condition` can't hold a real pointer back into
    /// this struct without a dependency cycle, so [`Scheduler`]'s
    /// `SchedulerHooks::set_condition_attached` mirrors the attach/detach
    /// here instead; `set_blocked_on_condition` asserts the "at most one"
    /// half of the invariant directly.
    ///
    /// [`Scheduler`]: crate::scheduler::Scheduler
    blocked_on_condition: KMutex<bool>,
    /// Userland lock addresses this thread currently holds, read/write
    /// (design §3). This kernel's futex ABI only ever transfers exclusive
    /// ownership (`lock_unlock`, design §4.6 "transfers ownership to one
    /// waiter") — there is no separate shared/read-lock acquire syscall —
    /// so only `held_write_locks` is ever populated; `held_read_locks`
    /// holds the data-model slot spec.md §3 names for a shared-lock
    /// primitive this syscall surface doesn't have.
    held_read_locks: KMutex<BTreeSet<u64>>,
    held_write_locks: KMutex<BTreeSet<u64>>,
}

impl Thread {
    pub fn new(id: ThreadHandle, process: Weak<Process>) -> Self {
        Self {
            id,
            process,
            state: KMutex::new(ThreadState::Runnable),
            blocked_on_condition: KMutex::new(false),
            held_read_locks: KMutex::new(BTreeSet::new()),
            held_write_locks: KMutex::new(BTreeSet::new()),
        }
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: ThreadState) {
        *self.state.lock() = state;
    }

    /// Records whether this thread currently has a condition attached.
    /// Debug-asserts the "exactly one at a time" half of design §3's
    /// invariant rather than silently overwriting it.
    pub fn set_blocked_on_condition(&self, attached: bool) {
        let mut flag = self.blocked_on_condition.lock();
        if attached {
            debug_assert!(!*flag, "thread attached a second condition while one was already active");
        }
        *flag = attached;
    }

    pub fn is_blocked_on_condition(&self) -> bool {
        *self.blocked_on_condition.lock()
    }

    pub fn note_write_lock_held(&self, addr: u64) {
        self.held_write_locks.lock().insert(addr);
    }

    pub fn note_write_lock_released(&self, addr: u64) {
        self.held_write_locks.lock().remove(&addr);
    }

    pub fn holds_write_lock(&self, addr: u64) -> bool {
        self.held_write_locks.lock().contains(&addr)
    }

    /// Always `false` in this kernel: there is no shared/read-lock
    /// acquisition syscall in this ABI, so `held_read_locks` never gets
    /// anything inserted into it. Kept so the data model has somewhere to
    /// put one if this syscall surface ever grows one.
    pub fn holds_read_lock(&self, addr: u64) -> bool {
        self.held_read_locks.lock().contains(&addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_thread_starts_runnable() {
        let thread = Thread::new(1, Weak::new());
        assert_eq!(thread.state(), ThreadState::Runnable);
    }

    #[test]
    fn state_round_trips() {
        let thread = Thread::new(1, Weak::new());
        thread.set_state(ThreadState::Blocked);
        assert_eq!(thread.state(), ThreadState::Blocked);
    }

    #[test]
    fn write_lock_bookkeeping_round_trips() {
        let thread = Thread::new(1, Weak::new());
        assert!(!thread.holds_write_lock(0x4000));
        thread.note_write_lock_held(0x4000);
        assert!(thread.holds_write_lock(0x4000));
        thread.note_write_lock_released(0x4000);
        assert!(!thread.holds_write_lock(0x4000));
    }

    #[test]
    fn blocked_on_condition_round_trips() {
        let thread = Thread::new(1, Weak::new());
        assert!(!thread.is_blocked_on_condition());
        thread.set_blocked_on_condition(true);
        assert!(thread.is_blocked_on_condition());
        thread.set_blocked_on_condition(false);
        assert!(!thread.is_blocked_on_condition());
    }
}
