//! Cooperative round-robin scheduler (design §4.6, §5).
//!
//! Generalised from the teacher's per-CPU, work-stealing, preemptible
//! scheduler (`core/src/scheduler/scheduler.rs`, `global_asm!` context
//! switches) down to the single invariant this kernel actually relies on:
//! at most one thread ever executes kernel code at a time (design §5). That
//! collapses per-CPU ready queues to one, removes preemption entirely (a
//! thread only yields the CPU at an explicit suspension point), and leaves
//! the register/stack save-restore itself behind the [`ContextSwitch`]
//! trait — the one piece of this subsystem that is genuinely
//! architecture-specific, on the same footing as page-table bit layout
//! (design §1).
//!
//! [`Scheduler`] implements [`cosix_lib::condition::SchedulerHooks`], which
//! is how every blocking wait in the kernel (clocks, futexes, poll, Unix
//! socket backpressure) reaches this module without a dependency cycle.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use cosix_lib::condition::SchedulerHooks;
use cosix_lib::{KMutex, ThreadHandle};

use crate::process::Process;
use crate::thread::{Thread, ThreadState};

/// The arch-specific half of a context switch. `cosix-core` only ever
/// decides *which* thread runs next; actually saving and restoring
/// registers and stack pointer is supplied by the kernel binary crate.
pub trait ContextSwitch: Sync {
    fn switch_to(&self, thread: &Thread);
}

/// A `ContextSwitch` that does nothing, for use before a real one is wired
/// up (e.g. constructing the very first, still-idle scheduler at boot) and
/// in tests, which never actually transfer control between stacks.
pub struct NoopContextSwitch;

impl ContextSwitch for NoopContextSwitch {
    fn switch_to(&self, _thread: &Thread) {}
}

pub struct Scheduler {
    ready: KMutex<VecDeque<Arc<Thread>>>,
    current: KMutex<Option<Arc<Thread>>>,
    all: KMutex<BTreeMap<ThreadHandle, Arc<Thread>>>,
    next_id: AtomicU32,
    context_switch: &'static dyn ContextSwitch,
}

impl Scheduler {
    pub const fn new(context_switch: &'static dyn ContextSwitch) -> Self {
        Self {
            ready: KMutex::new(VecDeque::new()),
            current: KMutex::new(None),
            all: KMutex::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
            context_switch,
        }
    }

    /// Create a new thread belonging to `process`. The first thread ever
    /// spawned becomes the running thread directly; later ones join the
    /// ready queue.
    pub fn spawn(&self, process: Weak<Process>) -> Arc<Thread> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let thread = Arc::new(Thread::new(id, process));
        self.all.lock().insert(id, thread.clone());

        let mut current = self.current.lock();
        if current.is_none() {
            thread.set_state(ThreadState::Running);
            *current = Some(thread.clone());
        } else {
            drop(current);
            self.ready.lock().push_back(thread.clone());
        }
        thread
    }

    pub fn current(&self) -> Option<Arc<Thread>> {
        self.current.lock().clone()
    }

    /// `thread_yield` (design §4.6): round-robin to the next ready thread.
    /// A no-op if nothing else is runnable.
    pub fn yield_now(&self) {
        let Some(next) = self.ready.lock().pop_front() else {
            return;
        };

        let mut current = self.current.lock();
        if let Some(prev) = current.take() {
            prev.set_state(ThreadState::Runnable);
            self.ready.lock().push_back(prev);
        }
        next.set_state(ThreadState::Running);
        *current = Some(next.clone());
        drop(current);

        self.context_switch.switch_to(&next);
    }

    /// Remove the current thread from scheduling entirely (`thread_exit`,
    /// the calling side of a terminated process's last thread). Hands off
    /// to the next ready thread the same way `block_current` does.
    pub fn exit_current(&self) {
        if let Some(thread) = self.current.lock().take() {
            thread.set_state(ThreadState::Exited);
            self.all.lock().remove(&thread.id);
        }
        self.schedule_next();
    }

    /// `proc_exec` (design §4.5 "terminates every thread of the current
    /// process except the calling one"): drops every other thread
    /// belonging to `process` out of the ready queue and the live thread
    /// table. A thread already blocked elsewhere (futex, poll, a socket
    /// wait) is removed from `all` the same way but is left to whatever
    /// holds its `Arc` to notice it is gone; there is no separate kill
    /// signal to deliver since a cooperative thread never runs kernel code
    /// it didn't ask to run.
    pub fn terminate_other_threads(&self, process: &Arc<Process>, keep: ThreadHandle) {
        let dead: Vec<ThreadHandle> = {
            let mut all = self.all.lock();
            let dead: Vec<ThreadHandle> = all
                .values()
                .filter(|t| t.id != keep)
                .filter(|t| t.process.upgrade().is_some_and(|p| Arc::ptr_eq(&p, process)))
                .map(|t| t.id)
                .collect();
            for id in &dead {
                if let Some(thread) = all.remove(id) {
                    thread.set_state(ThreadState::Exited);
                }
            }
            dead
        };
        if !dead.is_empty() {
            self.ready.lock().retain(|t| !dead.contains(&t.id));
        }
    }

    fn schedule_next(&self) {
        let Some(next) = self.ready.lock().pop_front() else {
            return;
        };
        next.set_state(ThreadState::Running);
        *self.current.lock() = Some(next.clone());
        self.context_switch.switch_to(&next);
    }
}

impl SchedulerHooks for Scheduler {
    fn current_thread(&self) -> Option<ThreadHandle> {
        self.current.lock().as_ref().map(|t| t.id)
    }

    /// Mark the current thread `Blocked` and switch away. The thread is
    /// not in any queue while blocked; [`SchedulerHooks::wake`] is what
    /// puts it back in the ready queue later.
    fn block_current(&self) {
        if let Some(thread) = self.current.lock().take() {
            thread.set_state(ThreadState::Blocked);
        }
        self.schedule_next();
    }

    fn wake(&self, thread: ThreadHandle) {
        let Some(thread) = self.all.lock().get(&thread).cloned() else {
            return;
        };
        if thread.state() == ThreadState::Blocked {
            thread.set_state(ThreadState::Runnable);
            self.ready.lock().push_back(thread);
        }
    }

    /// Mirrors a `Condition`'s attach/detach into the owning `Thread`'s own
    /// bookkeeping (design §3), enforcing "at most one condition at a time"
    /// via `Thread::set_blocked_on_condition`'s debug assertion.
    fn set_condition_attached(&self, thread: ThreadHandle, attached: bool) {
        if let Some(thread) = self.all.lock().get(&thread).cloned() {
            thread.set_blocked_on_condition(attached);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;

    use cosix_abi::ProcessId;
    use cosix_mm::{FrameId, PageDirectory, Prot};

    static CONTEXT_SWITCH: NoopContextSwitch = NoopContextSwitch;

    #[derive(Default)]
    struct FakeDir;
    impl PageDirectory for FakeDir {
        fn is_mapped(&self, _vaddr: u64) -> bool {
            false
        }
        fn frame_of(&self, _vaddr: u64) -> Option<FrameId> {
            None
        }
        fn is_cow(&self, _vaddr: u64) -> bool {
            false
        }
        fn protection_of(&self, _vaddr: u64) -> Prot {
            Prot::NONE
        }
        fn map(&mut self, _vaddr: u64, _frame: FrameId, _prot: Prot, _cow: bool) {}
        fn reprotect(&mut self, _vaddr: u64, _prot: Prot) {}
        fn unmap(&mut self, _vaddr: u64) {}
        fn flush(&mut self, _vaddr: u64) {}
    }

    fn process() -> Arc<Process> {
        Process::new(ProcessId::zeroed(), Box::new(FakeDir), 0x1000, 0x10000)
    }

    #[test]
    fn first_spawned_thread_runs_immediately() {
        let sched = Scheduler::new(&CONTEXT_SWITCH);
        let t = sched.spawn(Weak::new());
        assert_eq!(t.state(), ThreadState::Running);
        assert_eq!(sched.current().unwrap().id, t.id);
    }

    #[test]
    fn second_thread_waits_until_yield() {
        let sched = Scheduler::new(&CONTEXT_SWITCH);
        let first = sched.spawn(Weak::new());
        let second = sched.spawn(Weak::new());
        assert_eq!(second.state(), ThreadState::Runnable);

        sched.yield_now();
        assert_eq!(sched.current().unwrap().id, second.id);
        assert_eq!(first.state(), ThreadState::Runnable);
        assert_eq!(second.state(), ThreadState::Running);
    }

    #[test]
    fn yield_with_nothing_else_ready_is_a_no_op() {
        let sched = Scheduler::new(&CONTEXT_SWITCH);
        let only = sched.spawn(Weak::new());
        sched.yield_now();
        assert_eq!(sched.current().unwrap().id, only.id);
    }

    #[test]
    fn block_then_wake_returns_a_thread_to_the_ready_queue() {
        let sched = Scheduler::new(&CONTEXT_SWITCH);
        let first = sched.spawn(Weak::new());
        let second = sched.spawn(Weak::new());

        // `first` is current; blocking it hands the CPU to `second`.
        sched.block_current();
        assert_eq!(first.state(), ThreadState::Blocked);
        assert_eq!(sched.current().unwrap().id, second.id);

        sched.wake(first.id);
        assert_eq!(first.state(), ThreadState::Runnable);

        sched.yield_now();
        assert_eq!(sched.current().unwrap().id, first.id);
    }

    #[test]
    fn exit_current_removes_the_thread_and_schedules_next() {
        let sched = Scheduler::new(&CONTEXT_SWITCH);
        let first = sched.spawn(Weak::new());
        let second = sched.spawn(Weak::new());

        sched.yield_now();
        assert_eq!(sched.current().unwrap().id, second.id);

        sched.exit_current();
        assert_eq!(sched.current().unwrap().id, first.id);
    }

    #[test]
    fn terminate_other_threads_drops_only_the_named_process_and_keeps_the_caller() {
        let sched = Scheduler::new(&CONTEXT_SWITCH);
        let exec_process = process();
        let other_process = process();

        let caller = sched.spawn(Arc::downgrade(&exec_process));
        let sibling = sched.spawn(Arc::downgrade(&exec_process));
        let unrelated = sched.spawn(Arc::downgrade(&other_process));

        sched.terminate_other_threads(&exec_process, caller.id);

        assert_eq!(sibling.state(), ThreadState::Exited);
        assert_eq!(unrelated.state(), ThreadState::Runnable);
        assert!(sched.all.lock().contains_key(&caller.id));
        assert!(!sched.all.lock().contains_key(&sibling.id));
        assert!(sched.all.lock().contains_key(&unrelated.id));
        assert!(!sched.ready.lock().iter().any(|t| t.id == sibling.id));
    }
}
