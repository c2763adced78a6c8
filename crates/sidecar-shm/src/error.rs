use std::io;

/// Errors from creating, opening or using a shared region.
#[derive(Debug)]
pub enum RegionError {
    /// Zero capacity, a malformed name, or a size the platform cannot map.
    InvalidArgument(String),
    /// A region with this name already exists.
    NameCollision(String),
    /// No region with this name exists.
    NotFound(String),
    /// The OS refused to provide the memory.
    AllocationError(io::Error),
    /// Any other OS-level failure while attaching.
    Io(io::Error),
    /// The region exists but its header is not one we wrote.
    InvalidHeader(&'static str),
    /// An existing region carries a different capacity than requested.
    CapacityMismatch {
        name: String,
        expected: u32,
        found: u32,
    },
    /// The region was already closed.
    Closed,
}

impl std::fmt::Display for RegionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Self::NameCollision(name) => write!(f, "shared region {} already exists", name),
            Self::NotFound(name) => write!(f, "shared region {} not found", name),
            Self::AllocationError(e) => write!(f, "failed to allocate shared region: {}", e),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::InvalidHeader(msg) => write!(f, "invalid region header: {}", msg),
            Self::CapacityMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "shared region {} has capacity {}, expected {}",
                name, found, expected
            ),
            Self::Closed => write!(f, "shared region is closed"),
        }
    }
}

impl std::error::Error for RegionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AllocationError(e) | Self::Io(e) => Some(e),
            _ => None,
        }
    }
}
