//! The host side: owns the shared region and feeds commands into it.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sidecar_shm::{RegionError, SharedRegion, SharedRing};

use crate::callbacks::EventSink;
use crate::config::HostConfig;
use crate::frame::Command;
use crate::worker::{RingDescriptor, SidecarWorker};
use crate::{SidecarCallbacks, SidecarError};

/// Creates a named shared ring, starts a [`SidecarWorker`] on it and writes
/// commands into it.
///
/// The host is the ring's only producer; everything that writes takes
/// `&mut self`.
pub struct SidecarHost {
    config: HostConfig,
    region: SharedRegion,
    // `None` once closed so the local mapping is released with the region.
    ring: Option<SharedRing>,
    worker: SidecarWorker,
    callbacks: Arc<dyn SidecarCallbacks>,
}

impl SidecarHost {
    pub fn new(
        name: &str,
        capacity: u32,
        callbacks: Arc<dyn SidecarCallbacks>,
    ) -> Result<Self, SidecarError> {
        Self::with_config(HostConfig::new(name, capacity), callbacks)
    }

    /// Create the shared region described by `config`.
    ///
    /// Fails if a region with that name already exists.
    pub fn with_config(
        config: HostConfig,
        callbacks: Arc<dyn SidecarCallbacks>,
    ) -> Result<Self, SidecarError> {
        let region = SharedRegion::create(&config.name, config.capacity)?;
        let ring = region.ring()?;
        let worker = SidecarWorker::new(config.worker.clone());
        tracing::info!(name = %config.name, capacity = config.capacity, "sidecar host created");
        Ok(Self {
            config,
            region,
            ring: Some(ring),
            worker,
            callbacks,
        })
    }

    /// The descriptor a worker (in this or another process) attaches with.
    pub fn descriptor(&self) -> RingDescriptor {
        RingDescriptor {
            name: self.region.name().to_owned(),
            capacity: self.region.capacity(),
        }
    }

    /// Start the in-process worker. Does nothing if it is already running.
    pub fn start(&mut self) -> Result<(), SidecarError> {
        if self.ring.is_none() {
            return Err(RegionError::Closed.into());
        }
        if self.worker.is_running() {
            return Ok(());
        }
        let desc = self.descriptor();
        self.worker
            .start_with_descriptor(&desc, self.callbacks.clone())
    }

    /// Write as many of `bytes` as fit; returns the count written.
    ///
    /// A short write is not an error. Returns 0 after [`close`](Self::close).
    pub fn send_command(&mut self, bytes: &[u8]) -> u32 {
        let Some(ring) = self.ring.as_ref() else {
            return 0;
        };
        let n = ring.write(bytes);
        if (n as usize) < bytes.len() {
            tracing::trace!(requested = bytes.len(), written = n, "short command write");
        }
        n
    }

    /// Write `command` as one encoded frame, waiting up to `timeout` for the
    /// ring to have room for all of it.
    ///
    /// A frame is never written partially. `Duration::MAX` waits forever.
    pub fn send_frame(&mut self, command: &Command, timeout: Duration) -> Result<(), SidecarError> {
        let ring = self.ring.as_ref().ok_or(RegionError::Closed)?;
        let len = command.encoded_len();
        let max = ring.capacity() as usize;
        if len > max {
            return Err(SidecarError::FrameTooLarge { len, max });
        }

        let encoded = command.to_bytes();
        // A timeout too large to represent means no deadline.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            // Only this side writes, so free space can only grow until we do.
            if ring.available_to_write() as usize >= len {
                let n = ring.write(&encoded);
                debug_assert_eq!(n as usize, len);
                tracing::trace!(kind = ?command.kind, len, "sent command frame");
                return Ok(());
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(SidecarError::Timeout(timeout));
            }
            thread::yield_now();
        }
    }

    /// Stop the worker. Idempotent.
    pub fn stop(&mut self) {
        self.worker.stop();
    }

    /// Stop the worker and close the region. Idempotent.
    pub fn close(&mut self) {
        if self.ring.is_none() {
            return;
        }
        self.worker.stop();
        self.ring = None;
        self.region.close();
        tracing::info!(name = %self.config.name, "sidecar host closed");
    }

    pub fn name(&self) -> &str {
        self.region.name()
    }

    pub fn capacity(&self) -> u32 {
        self.region.capacity()
    }

    pub fn is_started(&self) -> bool {
        self.worker.is_running()
    }

    pub fn is_closed(&self) -> bool {
        self.ring.is_none()
    }

    /// Free space in the ring; 0 after close.
    pub fn available_to_write(&self) -> u32 {
        self.ring.as_ref().map_or(0, |r| r.available_to_write())
    }

    /// Event handle for the running worker.
    pub fn events(&self) -> Option<EventSink> {
        self.worker.events()
    }

}

impl Drop for SidecarHost {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SidecarHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarHost")
            .field("region", &self.region)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}
