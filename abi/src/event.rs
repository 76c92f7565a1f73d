//! `poll` subscription/event wire shapes (design §4.12).

use crate::clock::{ClockId, Timestamp};
use crate::errno::Errno;

/// What a subscription is waiting for.
#[derive(Clone, Copy, Debug)]
pub enum SubscriptionKind {
    ClockDeadline {
        clock: ClockId,
        timeout: Timestamp,
        precision: Timestamp,
        /// If true, `timeout` is an absolute deadline; otherwise relative to "now".
        absolute: bool,
    },
    FdReadReady {
        fd: u32,
    },
    FdWriteReady {
        fd: u32,
    },
    ProcessTerminate {
        fd: u32,
    },
    Condvar {
        address: u64,
        scope_private: bool,
    },
    LockAcquire {
        address: u64,
        scope_private: bool,
    },
}

/// One entry in a `poll` call: a user-chosen opaque tag plus what to wait for.
#[derive(Clone, Copy, Debug)]
pub struct Subscription {
    pub user_data: u64,
    pub kind: SubscriptionKind,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Clock = 0,
    FdRead = 1,
    FdWrite = 2,
    ProcessTerminate = 3,
    Condvar = 4,
    LockAcquire = 5,
}

/// One fired event, reported back from `poll`.
#[derive(Clone, Copy, Debug)]
pub struct Event {
    pub user_data: u64,
    pub error: Errno,
    pub event_type: EventType,
    /// For `FdRead`/`FdWrite`: bytes available/space available, best-effort.
    pub bytes_available: u64,
    /// Set when a read-ready event coincides with peer hangup.
    pub hangup: bool,
}
