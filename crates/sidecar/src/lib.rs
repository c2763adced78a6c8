//! Host/worker sidecar protocol over a shared-memory byte ring.
//!
//! A [`SidecarHost`] creates a named [`SharedRegion`](sidecar_shm::SharedRegion)
//! holding a wait-free SPSC byte ring and writes commands into it. A
//! [`SidecarWorker`] attaches to the same ring, drains it on its own thread and
//! hands the bytes to a [`SidecarCallbacks`] implementation. Results travel
//! back as direct `on_event` calls, never through the ring.
//!
//! ```text
//!  host ── send_command / send_frame ──► [ ring ] ──► worker thread ── process()
//!    ▲                                                               │
//!    └──────────────────────── on_event(id, bytes) ◄─────────────────┘
//! ```
//!
//! The ring carries opaque bytes. [`frame`] defines an optional
//! `[kind][len][payload]` convention used by [`Framing::Frames`] and by the
//! `sidecar-helper` binary.

mod callbacks;
mod config;
mod error;
pub mod frame;
mod host;
mod worker;

pub use callbacks::{EventSink, LoggingCallbacks, SidecarCallbacks};
pub use config::{
    DEFAULT_CAPACITY, DEFAULT_READ_CHUNK, DEFAULT_REGION_NAME, Framing, HostConfig, IdleStrategy,
    WorkerConfig,
};
pub use error::{CallbackError, SidecarError};
pub use frame::{Command, CommandKind, FrameDecoder, FrameError};
pub use host::SidecarHost;
pub use worker::{ACK_PAYLOAD, EVENT_ACK, RingDescriptor, SidecarWorker, WorkerState};

pub use sidecar_ring::{AsByteRing, RingBuffer, RingError};
pub use sidecar_shm::{RegionError, SharedRegion, SharedRing};
