//! Clock identifiers (design §4.2).

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockId {
    /// Starts at zero at boot, driven by the periodic tick device.
    Monotonic = 0,
    /// Monotonic plus the RTC offset; may jump when the RTC is reset.
    Realtime = 1,
}

impl ClockId {
    pub const COUNT: usize = 2;

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Nanosecond timestamp, matching CloudABI's `cloudabi_timestamp_t`.
pub type Timestamp = u64;
