//! Thread conditions and signalers — the substrate for all blocking in the
//! kernel: socket read/write wakeups, userland locks and condvars, poll
//! deadlines, process-exit waits, pseudo-FD responses.
//!
//! A [`Signaler`] is a broadcast point: any number of threads can attach a
//! [`Condition`] to it, and [`Signaler::broadcast`] wakes every thread
//! currently attached and detaches them atomically. A thread may attach at
//! most one condition at a time (enforced by the scheduler's thread struct,
//! not by this module): `poll`'s wait-for-any-of-N doesn't need N conditions
//! for N subscriptions, since one `Condition` can itself be attached to many
//! signalers at once, each tagged with its subscription index
//! ([`Condition::attach_to`]) — `poll` builds exactly one and blocks on it.
//!
//! Decoupled from the scheduler the same way: this crate never depends on
//! the process/thread crate, so the scheduler registers a small set of
//! hooks (`current_thread`, `block_current`, `wake`) at boot instead.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::spinlock::KMutex;

/// Opaque thread identity, assigned by the scheduler.
pub type ThreadHandle = u32;

/// Hooks the scheduler installs so this crate can block and wake threads
/// without depending on the scheduler's types.
pub trait SchedulerHooks: Sync {
    /// The thread currently executing kernel code, if any.
    fn current_thread(&self) -> Option<ThreadHandle>;
    /// Suspend the current thread until some signaler wakes it.
    fn block_current(&self);
    /// Make `thread` runnable again.
    fn wake(&self, thread: ThreadHandle);
    /// Mirrors a [`Condition`]'s attach/detach into the thread's own
    /// "blocked on" bookkeeping (design §3). Default no-op so existing
    /// hook implementations that don't care about this still compile; the
    /// real scheduler overrides it to enforce "at most one at a time".
    fn set_condition_attached(&self, _thread: ThreadHandle, _attached: bool) {}
}

static HOOKS: KMutex<Option<&'static dyn SchedulerHooks>> = KMutex::new(None);
static HOOKS_SET: AtomicBool = AtomicBool::new(false);

/// Install the scheduler hooks. Called once during boot before any thread
/// can block on a condition.
pub fn register_scheduler_hooks(hooks: &'static dyn SchedulerHooks) {
    *HOOKS.lock() = Some(hooks);
    HOOKS_SET.store(true, Ordering::Release);
}

fn hooks() -> Option<&'static dyn SchedulerHooks> {
    if !HOOKS_SET.load(Ordering::Acquire) {
        return None;
    }
    *HOOKS.lock()
}

struct SignalerInner {
    waiters: Vec<ThreadHandle>,
}

/// A broadcast point that threads attach conditions to and wait on.
pub struct Signaler {
    inner: KMutex<SignalerInner>,
}

impl Signaler {
    pub const fn new() -> Self {
        Self {
            inner: KMutex::new(SignalerInner {
                waiters: Vec::new(),
            }),
        }
    }

    fn attach_thread(&self, thread: ThreadHandle) {
        let mut inner = self.inner.lock();
        if !inner.waiters.contains(&thread) {
            inner.waiters.push(thread);
        }
    }

    fn detach_thread(&self, thread: ThreadHandle) {
        let mut inner = self.inner.lock();
        inner.waiters.retain(|&t| t != thread);
    }

    fn is_attached(&self, thread: ThreadHandle) -> bool {
        self.inner.lock().waiters.contains(&thread)
    }

    /// Wake every attached thread and clear the waiter list. Returns the
    /// number of threads woken.
    pub fn broadcast(&self) -> usize {
        let woken = {
            let mut inner = self.inner.lock();
            core::mem::take(&mut inner.waiters)
        };
        let count = woken.len();
        if let Some(hooks) = hooks() {
            for thread in &woken {
                hooks.wake(*thread);
            }
        }
        count
    }

    pub fn has_waiters(&self) -> bool {
        !self.inner.lock().waiters.is_empty()
    }
}

impl Default for Signaler {
    fn default() -> Self {
        Self::new()
    }
}

/// One thread's single pending wait (design §3 "a 'blocked on' pointer,
/// exactly one condition at a time"). A `Condition` may be attached to more
/// than one [`Signaler`] at once — that's how `poll`'s wait-for-any-of-N
/// works — but a thread only ever has one `Condition` value alive, tagging
/// each attachment with the caller's own index (`poll`'s subscription
/// index) rather than creating a separate `Condition` per signaler.
/// Dropping it detaches from everything it was attached to.
pub struct Condition<'a> {
    thread: ThreadHandle,
    attachments: Vec<(&'a Signaler, usize)>,
}

impl<'a> Condition<'a> {
    /// Begin a new wait for the current thread, with nothing attached yet.
    /// Returns `None` if there is no current thread.
    pub fn new() -> Option<Self> {
        let thread = hooks()?.current_thread()?;
        if let Some(h) = hooks() {
            h.set_condition_attached(thread, true);
        }
        Some(Self { thread, attachments: Vec::new() })
    }

    /// Attach the current thread to a single `signaler`, tagged index `0`
    /// (the common case outside `poll`: every other blocking call in this
    /// kernel waits on exactly one). Returns `None` if there is no current
    /// thread.
    pub fn attach(signaler: &'a Signaler) -> Option<Self> {
        let mut condition = Self::new()?;
        condition.attach_to(signaler, 0);
        Some(condition)
    }

    /// Attach to `signaler` under `index` (design §4.12 "attaches a
    /// condition with the subscription index"). Can be called more than
    /// once on the same `Condition` to watch several signalers at once.
    pub fn attach_to(&mut self, signaler: &'a Signaler, index: usize) {
        signaler.attach_thread(self.thread);
        self.attachments.push((signaler, index));
    }

    /// True once any attached signaler has broadcast since it was attached.
    pub fn fired(&self) -> bool {
        self.attachments.iter().any(|(sig, _)| !sig.is_attached(self.thread))
    }

    /// True if `signaler` specifically has fired. Meaningless for a
    /// signaler this condition was never attached to.
    pub fn fired_for(&self, signaler: &Signaler) -> bool {
        !signaler.is_attached(self.thread)
    }

    pub fn detach(&self) {
        for (sig, _) in &self.attachments {
            sig.detach_thread(self.thread);
        }
    }
}

impl Drop for Condition<'_> {
    fn drop(&mut self) {
        self.detach();
        if let Some(h) = hooks() {
            h.set_condition_attached(self.thread, false);
        }
    }
}

/// Block the current thread until `condition` has at least one attachment
/// fire. Unlike [`wait_until`], `condition` is already attached (possibly
/// to several signalers); this only loops `block_current`/re-check, it
/// never creates a new attachment.
pub fn wait_on(condition: &Condition) -> bool {
    loop {
        if condition.fired() {
            return true;
        }
        match hooks() {
            Some(h) => h.block_current(),
            None => return false,
        }
    }
}

/// Block the current thread until `predicate` holds, re-checking it after
/// every wake on `signaler`. Closes the classic check/sleep race by
/// attaching before the re-check and only then blocking.
pub fn wait_until<F: Fn() -> bool>(signaler: &Signaler, predicate: F) -> bool {
    loop {
        if predicate() {
            return true;
        }
        let Some(condition) = Condition::attach(signaler) else {
            return false;
        };
        if predicate() {
            return true;
        }
        match hooks() {
            Some(hooks) => hooks.block_current(),
            None => return false,
        }
        drop(condition);
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use std::vec::Vec as StdVec;

    struct TestHooks {
        current: AtomicU32,
        woken: Mutex<StdVec<ThreadHandle>>,
    }

    impl SchedulerHooks for TestHooks {
        fn current_thread(&self) -> Option<ThreadHandle> {
            Some(self.current.load(Ordering::Relaxed))
        }
        fn block_current(&self) {}
        fn wake(&self, thread: ThreadHandle) {
            self.woken.lock().unwrap().push(thread);
        }
    }

    // Both cases share one test function: `register_scheduler_hooks` writes
    // a process-global static, so running them as separate #[test] fns
    // under a parallel test runner would race on which hooks are active.
    #[test]
    fn signaler_and_wait_until_behaviour() {
        static HOOKS: TestHooks = TestHooks {
            current: AtomicU32::new(7),
            woken: Mutex::new(StdVec::new()),
        };
        register_scheduler_hooks(&HOOKS);

        let signaler = Signaler::new();
        let condition = Condition::attach(&signaler).unwrap();
        assert!(!condition.fired());
        assert_eq!(signaler.broadcast(), 1);
        assert!(condition.fired());
        assert!(!signaler.has_waiters());

        assert!(wait_until(&signaler, || true));
        assert!(!signaler.has_waiters());
    }
}
