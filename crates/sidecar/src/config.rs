//! Host and worker configuration.

use std::time::Duration;

/// Region name used when none is given.
pub const DEFAULT_REGION_NAME: &str = "SidecarRB";

/// Ring capacity used when none is given.
pub const DEFAULT_CAPACITY: u32 = 4096;

/// Largest single read the worker performs.
pub const DEFAULT_READ_CHUNK: usize = 1024;

/// What the worker does when it polls an empty ring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdleStrategy {
    /// `std::thread::yield_now()` between polls.
    #[default]
    Yield,
    /// Sleep for a fixed duration between polls.
    Sleep(Duration),
}

/// How the worker hands ring bytes to `process`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    /// Each read chunk is delivered as-is. Message boundaries are not
    /// preserved.
    #[default]
    Stream,
    /// Bytes are reassembled into `[kind][len][payload]` command frames and
    /// each complete frame is delivered once.
    Frames,
}

/// Configuration for a [`SidecarWorker`](crate::SidecarWorker).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Size of the worker's read buffer.
    pub read_chunk: usize,
    pub idle: IdleStrategy,
    pub framing: Framing,
    /// Emit `on_event(EVENT_ACK, b"OK")` after every successful `process`.
    pub ack_events: bool,
    /// Name given to the worker thread.
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            read_chunk: DEFAULT_READ_CHUNK,
            idle: IdleStrategy::default(),
            framing: Framing::default(),
            ack_events: true,
            thread_name: "sidecar-worker".to_string(),
        }
    }
}

/// Configuration for a [`SidecarHost`](crate::SidecarHost).
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Shared region name.
    pub name: String,
    /// Ring data capacity in bytes.
    pub capacity: u32,
    /// Configuration for the worker the host starts.
    pub worker: WorkerConfig,
}

impl HostConfig {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            worker: WorkerConfig::default(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REGION_NAME, DEFAULT_CAPACITY)
    }
}
