//! Shared region memory layout.
//!
//! These `repr(C)` structures are the cross-process contract: a region
//! created by one process must be readable by any other that links this
//! crate.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Region Header (64 bytes)                                    │
//! │    capacity: u32, reserved: [u32; 15] (zero)                 │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Ring Header (192 bytes: head, tail, capacity + padding)     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Ring Data (capacity bytes)                                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The region header is written once by the creator and never modified
//! afterwards. An opener reads `capacity` from it to learn how much of the
//! mapping is ring data.

use sidecar_ring::{ByteRingHeader, RING_HEADER_SIZE};
use static_assertions::const_assert_eq;

use crate::RegionError;

/// Number of reserved words following `capacity` in the region header.
pub const RESERVED_WORDS: usize = 15;

/// Size of [`RegionHeader`].
pub const REGION_HEADER_SIZE: usize = 64;

/// Offset of the ring header within the region.
pub const RING_OFFSET: usize = REGION_HEADER_SIZE;

/// Offset of the first ring data byte within the region.
pub const DATA_OFFSET: usize = RING_OFFSET + RING_HEADER_SIZE;

/// Header at the start of every shared region (64 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionHeader {
    /// Ring data capacity in bytes.
    pub capacity: u32,
    /// Reserved for future versioning, always zero today.
    pub reserved: [u32; RESERVED_WORDS],
}

const_assert_eq!(core::mem::size_of::<RegionHeader>(), REGION_HEADER_SIZE);
const_assert_eq!(core::mem::size_of::<ByteRingHeader>(), 192);
const_assert_eq!(RING_OFFSET % 64, 0);

impl RegionHeader {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            reserved: [0; RESERVED_WORDS],
        }
    }

    /// Validate the header against the size of the mapping it was read from
    /// and return the ring capacity.
    pub fn validate(&self, mapped_len: usize) -> Result<u32, RegionError> {
        if self.capacity == 0 {
            return Err(RegionError::InvalidHeader("capacity is zero"));
        }
        match region_size(self.capacity) {
            Some(required) if required <= mapped_len => Ok(self.capacity),
            _ => Err(RegionError::InvalidHeader(
                "mapping is smaller than the advertised capacity",
            )),
        }
    }
}

/// Total bytes needed for a region holding a ring of `capacity` bytes.
///
/// Returns `None` if the size does not fit in `usize`.
pub fn region_size(capacity: u32) -> Option<usize> {
    DATA_OFFSET.checked_add(capacity as usize)
}
