//! Error type for the memory management subsystem.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmError {
    NoMemory,
    MappingFailed,
    InvalidAddress,
    NotAligned { address: u64, required: u64 },
    NotMapped { address: u64 },
    AlreadyMapped { address: u64 },
    NotCowPage,
    NoVma,
    PermissionDenied,
    InvalidArgument,
}

impl fmt::Display for MmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMemory => write!(f, "out of memory for page allocation"),
            Self::MappingFailed => write!(f, "page mapping operation failed"),
            Self::InvalidAddress => write!(f, "invalid address"),
            Self::NotAligned { address, required } => {
                write!(f, "address {:#x} not aligned to {:#x}", address, required)
            }
            Self::NotMapped { address } => write!(f, "address {:#x} not mapped", address),
            Self::AlreadyMapped { address } => write!(f, "address {:#x} already mapped", address),
            Self::NotCowPage => write!(f, "page is not copy-on-write"),
            Self::NoVma => write!(f, "no mapping covers the faulting address"),
            Self::PermissionDenied => write!(f, "mapping permissions deny this access"),
            Self::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

impl From<MmError> for cosix_abi::errno::Errno {
    fn from(e: MmError) -> Self {
        use cosix_abi::errno::Errno;
        match e {
            MmError::NoMemory => Errno::NoMem,
            MmError::MappingFailed => Errno::Fault,
            MmError::InvalidAddress => Errno::Fault,
            MmError::NotAligned { .. } => Errno::Inval,
            MmError::NotMapped { .. } => Errno::Fault,
            MmError::AlreadyMapped { .. } => Errno::Inval,
            MmError::NotCowPage => Errno::Fault,
            MmError::NoVma => Errno::Fault,
            MmError::PermissionDenied => Errno::Perm,
            MmError::InvalidArgument => Errno::Inval,
        }
    }
}

pub type MmResult<T = ()> = Result<T, MmError>;
