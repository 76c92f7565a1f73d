//! The poll engine (design §4.12): every blocking syscall in this kernel
//! is, at bottom, one `poll` call with a single subscription. `poll` itself
//! accepts N of them — clock deadlines, FD readiness, process termination,
//! userland condvars and locks — materialises a signaler for each, then
//! attaches one [`Condition`] to all of them at once, each tagged by its
//! subscription index, blocks once, then reports which fired.
//!
//! A subscription whose FD reports itself always-ready (design §4.4
//! `get_read_signaler` returning `None`) fires without blocking at all; a
//! subscription that fails to resolve (bad FD, unregistered clock,
//! non-private lock scope) reports its errno as a fired event rather than
//! failing the whole call, matching CloudABI's per-event error reporting.

use alloc::sync::Arc;
use alloc::vec::Vec;

use cosix_abi::event::{Event, EventType, Subscription, SubscriptionKind};
use cosix_abi::{Errno, Rights};
use cosix_fs::FileDescriptor;
use cosix_lib::condition::{Condition, wait_on};
use cosix_lib::error::{KernelError, KernelResult};
use cosix_lib::Signaler;

use crate::clock::ClockStore;
use crate::config::MAX_POLL_SUBSCRIPTIONS;
use crate::futex::FutexTable;
use crate::process::Process;

enum Resolved {
    Clock(Arc<Signaler>),
    Fd { obj: Arc<dyn FileDescriptor>, write: bool },
    Futex(Arc<Signaler>),
    Failed(Errno),
}

impl Resolved {
    fn signaler(&self) -> Option<&Signaler> {
        match self {
            Resolved::Clock(s) | Resolved::Futex(s) => Some(s),
            Resolved::Fd { obj, write } => {
                if *write {
                    obj.get_write_signaler()
                } else {
                    obj.get_read_signaler()
                }
            }
            Resolved::Failed(_) => None,
        }
    }

    fn error(&self) -> Errno {
        match self {
            Resolved::Failed(e) => *e,
            _ => Errno::Success,
        }
    }
}

fn resolve_one(process: &Process, futex: &FutexTable, clocks: &ClockStore, sub: &Subscription) -> Resolved {
    match sub.kind {
        SubscriptionKind::ClockDeadline { clock, timeout, precision, absolute } => {
            let deadline = if absolute {
                timeout
            } else {
                match clocks.time(clock, 0) {
                    Ok(now) => now.saturating_add(timeout),
                    Err(e) => return Resolved::Failed(e.into_errno()),
                }
            };
            match clocks.signaler(clock, deadline, precision) {
                Ok(sig) => Resolved::Clock(sig),
                Err(e) => Resolved::Failed(e.into_errno()),
            }
        }
        SubscriptionKind::FdReadReady { fd } | SubscriptionKind::ProcessTerminate { fd } => {
            match process.fd_check(fd, Rights::POLL_FD_READWRITE) {
                Ok(obj) => Resolved::Fd { obj, write: false },
                Err(e) => Resolved::Failed(e.into_errno()),
            }
        }
        SubscriptionKind::FdWriteReady { fd } => match process.fd_check(fd, Rights::POLL_FD_READWRITE) {
            Ok(obj) => Resolved::Fd { obj, write: true },
            Err(e) => Resolved::Failed(e.into_errno()),
        },
        SubscriptionKind::Condvar { address, scope_private } | SubscriptionKind::LockAcquire { address, scope_private } => {
            if !scope_private {
                return Resolved::Failed(Errno::NoSys);
            }
            Resolved::Futex(futex.get_or_create(address))
        }
    }
}

fn event_type_of(kind: &SubscriptionKind) -> EventType {
    match kind {
        SubscriptionKind::ClockDeadline { .. } => EventType::Clock,
        SubscriptionKind::FdReadReady { .. } => EventType::FdRead,
        SubscriptionKind::FdWriteReady { .. } => EventType::FdWrite,
        SubscriptionKind::ProcessTerminate { .. } => EventType::ProcessTerminate,
        SubscriptionKind::Condvar { .. } => EventType::Condvar,
        SubscriptionKind::LockAcquire { .. } => EventType::LockAcquire,
    }
}

/// `poll` (design §4.12). Blocks the calling thread until at least one
/// subscription fires, then returns one event per fired signaler (deduped:
/// two subscriptions sharing a signaler report only the earliest).
pub fn poll(process: &Process, futex: &FutexTable, clocks: &ClockStore, subs: &[Subscription]) -> KernelResult<Vec<Event>> {
    if subs.is_empty() {
        return Err(KernelError::Errno(Errno::Inval));
    }
    if subs.len() > MAX_POLL_SUBSCRIPTIONS {
        return Err(KernelError::Errno(Errno::TooBig));
    }

    let resolved: Vec<Resolved> = subs.iter().map(|s| resolve_one(process, futex, clocks, s)).collect();

    // One condition for the whole call (design §4.12/§9: a thread attaches
    // at most one condition at a time), each subscription with a signaler
    // tagged onto it by its own index rather than getting its own condition.
    let mut condition = Condition::new().ok_or(KernelError::Invariant("poll: no current thread"))?;
    let mut any_ready = false;
    for (i, r) in resolved.iter().enumerate() {
        match r.signaler() {
            Some(sig) => condition.attach_to(sig, i),
            None => any_ready = true,
        }
    }

    if !any_ready {
        wait_on(&condition);
    }

    let mut events = Vec::with_capacity(subs.len());
    let mut seen: Vec<*const Signaler> = Vec::with_capacity(subs.len());
    for (i, sub) in subs.iter().enumerate() {
        let fired = match resolved[i].signaler() {
            Some(sig) => condition.fired_for(sig),
            None => true,
        };
        if !fired {
            continue;
        }
        if let Some(sig) = resolved[i].signaler() {
            let ptr = sig as *const Signaler;
            if seen.contains(&ptr) {
                continue;
            }
            seen.push(ptr);
        }
        events.push(Event {
            user_data: sub.user_data,
            error: resolved[i].error(),
            event_type: event_type_of(&sub.kind),
            bytes_available: 0,
            hangup: false,
        });
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use cosix_abi::clock::ClockId;
    use cosix_abi::{FdFlags, FileType};
    use cosix_lib::condition::{SchedulerHooks, register_scheduler_hooks};
    use cosix_mm::{FrameId, PageDirectory, Prot};
    use core::sync::atomic::{AtomicU32, Ordering};

    struct TestHooks {
        current: AtomicU32,
    }
    impl SchedulerHooks for TestHooks {
        fn current_thread(&self) -> Option<cosix_lib::ThreadHandle> {
            Some(self.current.load(Ordering::Relaxed))
        }
        fn block_current(&self) {}
        fn wake(&self, _thread: cosix_lib::ThreadHandle) {}
    }
    static HOOKS: TestHooks = TestHooks { current: AtomicU32::new(1) };

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

    struct AlwaysReadyFd;
    impl FileDescriptor for AlwaysReadyFd {
        fn file_type(&self) -> FileType {
            FileType::RegularFile
        }
        fn flags(&self) -> FdFlags {
            FdFlags::empty()
        }
        fn set_flags(&self, _flags: FdFlags) {}
    }

    fn process() -> Arc<Process> {
        Process::new(cosix_abi::ProcessId::zeroed(), Box::new(FakeDir), 0x1000, 0x10000)
    }

    #[test]
    fn zero_subscriptions_fails_invalid() {
        let p = process();
        let futex = FutexTable::new();
        let clocks = ClockStore::new();
        let err = poll(&p, &futex, &clocks, &[]).unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::Inval));
    }

    #[test]
    fn fd_without_a_signaler_fires_without_blocking() {
        register_scheduler_hooks(&HOOKS);
        let p = process();
        let futex = FutexTable::new();
        let clocks = ClockStore::new();
        let fd = p.fd_install(Arc::new(AlwaysReadyFd), Rights::POLL_FD_READWRITE, Rights::empty()).unwrap();

        let subs = [Subscription { user_data: 42, kind: SubscriptionKind::FdReadReady { fd } }];
        let events = poll(&p, &futex, &clocks, &subs).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_data, 42);
        assert_eq!(events[0].error, Errno::Success);
        assert_eq!(events[0].event_type, EventType::FdRead);
    }

    #[test]
    fn bad_fd_reports_an_errored_event_instead_of_failing_the_call() {
        register_scheduler_hooks(&HOOKS);
        let p = process();
        let futex = FutexTable::new();
        let clocks = ClockStore::new();

        let subs = [Subscription { user_data: 7, kind: SubscriptionKind::FdReadReady { fd: 99 } }];
        let events = poll(&p, &futex, &clocks, &subs).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error, Errno::BadF);
    }

    // `poll` itself blocks (via `wait_on`) once no subscription is
    // immediately ready, and this test harness's `block_current` is a
    // no-op with nothing to drive a real timer tick mid-call — so rather
    // than exercise the blocking wrapper, this drives the same resolution
    // path `poll` uses directly and checks it against `ClockStore::tick`,
    // the way `clock.rs`'s own tests do.
    #[test]
    fn resolve_clock_deadline_converts_relative_timeout_and_fires_on_tick() {
        use core::sync::atomic::AtomicU64;
        register_scheduler_hooks(&HOOKS);
        let p = process();
        let futex = FutexTable::new();
        let clocks = ClockStore::new();

        struct CountingSource(AtomicU64);
        impl crate::clock::TickSource for CountingSource {
            fn now_ns(&self) -> u64 {
                self.0.load(Ordering::Relaxed)
            }
        }
        let mono = Arc::new(CountingSource(AtomicU64::new(1_000)));
        clocks.register(ClockId::Monotonic, mono.clone()).unwrap();

        let sub = Subscription {
            user_data: 1,
            kind: SubscriptionKind::ClockDeadline {
                clock: ClockId::Monotonic,
                timeout: 50,
                precision: 0,
                absolute: false,
            },
        };

        let resolved = resolve_one(&p, &futex, &clocks, &sub);
        let Resolved::Clock(sig) = resolved else {
            panic!("expected a clock signaler");
        };
        let cond = Condition::attach(&sig).unwrap();

        mono.0.store(1_100, Ordering::Relaxed);
        clocks.tick().unwrap();
        assert!(cond.fired());
    }
}
