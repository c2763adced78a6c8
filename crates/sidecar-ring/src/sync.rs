//! Atomics used by the ring cursors, swapped for loom's model-checked
//! versions under the `loom` feature.

#[cfg(not(feature = "loom"))]
pub use core::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "loom")]
pub use loom::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "loom")]
pub use loom::thread;
