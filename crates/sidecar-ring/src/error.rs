use core::fmt;

/// Errors from constructing a ring.
///
/// Short reads and writes are not errors: `read`/`write` report the number of
/// bytes actually transferred and the caller decides whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// The requested configuration is unusable (for example, zero capacity).
    InvalidArgument(&'static str),
    /// Backing storage of `size` bytes could not be obtained.
    AllocationError { size: usize },
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::AllocationError { size } => {
                write!(f, "failed to allocate {size} bytes of ring storage")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RingError {}
