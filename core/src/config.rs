//! Resource ceilings for the process/thread/scheduler layer (design §5
//! "Resource ceilings"), in the same named-constant style as
//! `cosix_fs::config`.

/// Upper bound on simultaneously live processes. Not named explicitly in
/// the source; sized generously since each entry is just a table slot.
pub const MAX_PROCESSES: usize = 256;

/// Upper bound on threads per process.
pub const MAX_THREADS_PER_PROCESS: usize = 64;

/// Upper bound on FD table entries per process ("too-many-files").
pub const MAX_FDS_PER_PROCESS: usize = 256;

/// Maximum poll subscriptions accepted in one `poll` call (design §4.12
/// "N subscriptions"). Zero is rejected separately as `invalid`.
pub const MAX_POLL_SUBSCRIPTIONS: usize = 64;

/// Number of clocks the store holds (design §4.2: monotonic, realtime).
pub const NUM_CLOCKS: usize = cosix_abi::ClockId::COUNT;
