//! Lock-free byte ring for shared memory IPC.
//!
//! This crate provides a `no_std`-compatible, wait-free single-producer
//! single-consumer (SPSC) ring of bytes, designed to live inside a
//! memory-mapped region that two processes map at the same time.
//!
//! # Layers
//!
//! - [`ByteRingRaw`]: works on raw pointers to a [`ByteRingHeader`] and its
//!   data bytes, suitable for shared memory where you have `*mut` pointers
//!   from mmap. Caller manages memory lifetime.
//! - [`ByteRing`]: a view at an offset inside a [`Region`].
//! - [`RingBuffer`]: owns its backing memory through a [`HeapRegion`]
//!   (requires the `alloc` feature).
//!
//! # Cursors
//!
//! `head` and `tail` are unbounded 64-bit counters. The physical offset of a
//! cursor is `cursor % capacity`, so "full" (`head - tail == capacity`) and
//! "empty" (`head == tail`) never alias. Each cursor has exactly one writer:
//! the producer stores `head` with `Release` after copying bytes in, the
//! consumer stores `tail` with `Release` after copying bytes out, and each
//! side loads the other's cursor with `Acquire`.
//!
//! # Loom Testing
//!
//! Enable the `loom` feature for concurrency verification:
//!
//! ```text
//! cargo test -p sidecar-ring --features loom --release
//! ```

#![no_std]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod error;
pub mod region;
pub mod ring;
pub mod sync;

pub use error::RingError;
#[cfg(any(test, feature = "alloc"))]
pub use region::HeapRegion;
pub use region::Region;
#[cfg(any(test, feature = "alloc"))]
pub use ring::RingBuffer;
pub use ring::{AsByteRing, ByteRing, ByteRingHeader, ByteRingRaw, RING_HEADER_SIZE, RingStatus};
