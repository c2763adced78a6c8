//! Named shared memory regions that carry a [`sidecar_ring::ByteRing`].
//!
//! A [`SharedRegion`] is created by the host under a process-wide name and
//! opened by the sidecar under the same name. Both sides then operate the
//! same ring cursors through their own mapping of the same physical pages.
//!
//! See [`layout`] for the bit-exact segment layout.
//!
//! Only unix targets are supported (`shm_open` + `mmap`).

#![forbid(unsafe_op_in_unsafe_fn)]

mod error;
pub mod layout;
#[cfg(unix)]
mod region;

pub use error::RegionError;
pub use layout::{DATA_OFFSET, REGION_HEADER_SIZE, RING_OFFSET, RegionHeader, region_size};
#[cfg(unix)]
pub use region::{SharedRegion, SharedRing};
