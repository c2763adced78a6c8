use std::io;
use std::time::Duration;

use sidecar_ring::RingError;
use sidecar_shm::RegionError;

/// Errors from the sidecar host and worker.
#[derive(Debug)]
pub enum SidecarError {
    /// Ring construction failed.
    Ring(RingError),
    /// Shared region create/open/close failed.
    Region(RegionError),
    /// The worker thread could not be spawned.
    Spawn(io::Error),
    /// The region named by a descriptor has a different capacity.
    CapacityMismatch { expected: u32, found: u32 },
    /// A frame can never fit in the ring.
    FrameTooLarge { len: usize, max: usize },
    /// The ring did not drain enough to take a frame in time.
    Timeout(Duration),
}

impl std::fmt::Display for SidecarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ring(e) => write!(f, "ring error: {}", e),
            Self::Region(e) => write!(f, "region error: {}", e),
            Self::Spawn(e) => write!(f, "failed to spawn sidecar worker: {}", e),
            Self::CapacityMismatch { expected, found } => write!(
                f,
                "ring capacity mismatch: descriptor says {}, region has {}",
                expected, found
            ),
            Self::FrameTooLarge { len, max } => {
                write!(f, "frame of {} bytes exceeds ring capacity {}", len, max)
            }
            Self::Timeout(d) => write!(f, "timed out after {:?} waiting for ring space", d),
        }
    }
}

impl std::error::Error for SidecarError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Ring(e) => Some(e),
            Self::Region(e) => Some(e),
            Self::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RingError> for SidecarError {
    fn from(e: RingError) -> Self {
        Self::Ring(e)
    }
}

impl From<RegionError> for SidecarError {
    fn from(e: RegionError) -> Self {
        Self::Region(e)
    }
}

/// Failure reported by a [`SidecarCallbacks::process`] implementation.
///
/// Any `std::error::Error` converts into it with `?`. It deliberately does
/// not implement `Error` itself so that blanket conversion stays coherent.
///
/// [`SidecarCallbacks::process`]: crate::SidecarCallbacks::process
pub struct CallbackError {
    inner: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl CallbackError {
    /// An error carrying only a message.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self {
            inner: message.to_string().into(),
        }
    }
}

impl<E> From<E> for CallbackError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(e: E) -> Self {
        Self { inner: Box::new(e) }
    }
}

impl std::fmt::Debug for CallbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.inner, f)
    }
}

impl std::fmt::Display for CallbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.inner, f)
    }
}
