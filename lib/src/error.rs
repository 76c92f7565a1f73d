//! Error categorisation and the one case `Errno` cannot express: an
//! internal invariant violation, which panics rather than returning a code
//! to userland (design §7).

use cosix_abi::errno::Errno;

/// The seven error categories named in design §7. Purely descriptive — used
/// by logging and by callers deciding whether a failure is worth retrying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    ArgumentValidation,
    CapabilityDenied,
    NotSupported,
    Transient,
    PeerConnection,
    ResourceExhaustion,
}

/// Classify an errno into its design §7 category. Returns `None` for
/// `Success`, which is not an error.
pub fn category(errno: Errno) -> Option<ErrorCategory> {
    use ErrorCategory::*;
    Some(match errno {
        Errno::Success => return None,
        Errno::Inval | Errno::NameTooLong | Errno::Range => ArgumentValidation,
        Errno::NotCapable | Errno::BadF | Errno::RoFs | Errno::Perm => CapabilityDenied,
        Errno::NoSys | Errno::NotSupported => NotSupported,
        Errno::Again | Errno::Busy | Errno::DeviceOrResourceBusy | Errno::Intr => Transient,
        Errno::Pipe | Errno::NotConn | Errno::NotConnected | Errno::ConnRefused | Errno::MsgSize => {
            PeerConnection
        }
        Errno::NoMem | Errno::MFile | Errno::NoSpc => ResourceExhaustion,
        _ => ArgumentValidation,
    })
}

/// True for the categories design §7 says userland may retry without
/// treating the failure as fatal to the operation.
pub fn is_retryable(errno: Errno) -> bool {
    matches!(category(errno), Some(ErrorCategory::Transient))
}

/// A kernel-internal result. Most kernel code speaks `cosix_abi::Errno`
/// directly and returns it straight to the dispatcher; `KernelError` adds
/// the internal-invariant case, which must never reach userland.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    Errno(Errno),
    /// A kernel invariant was violated. Converting this to an errno panics;
    /// the caller should only construct it where recovery is impossible.
    Invariant(&'static str),
}

impl KernelError {
    /// Resolve to the errno to return to userland, or panic if this is an
    /// internal invariant violation (design §7: "kernel panic, never
    /// surfaced to userland").
    pub fn into_errno(self) -> Errno {
        match self {
            KernelError::Errno(e) => e,
            KernelError::Invariant(msg) => panic!("kernel invariant violated: {msg}"),
        }
    }
}

impl From<Errno> for KernelError {
    fn from(e: Errno) -> Self {
        KernelError::Errno(e)
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_has_no_category() {
        assert_eq!(category(Errno::Success), None);
    }

    #[test]
    fn capability_and_transient_categories() {
        assert_eq!(category(Errno::NotCapable), Some(ErrorCategory::CapabilityDenied));
        assert_eq!(category(Errno::Again), Some(ErrorCategory::Transient));
        assert!(is_retryable(Errno::Busy));
        assert!(!is_retryable(Errno::NotCapable));
    }

    #[test]
    fn errno_round_trips_through_kernel_error() {
        let err: KernelError = Errno::Pipe.into();
        assert_eq!(err.into_errno(), Errno::Pipe);
    }
}
