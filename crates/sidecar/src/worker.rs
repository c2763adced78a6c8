//! The sidecar worker: a thread that drains the ring into `process`.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use sidecar_ring::AsByteRing;
use sidecar_shm::SharedRegion;

use crate::callbacks::{Dispatch, EventSink};
use crate::config::{Framing, IdleStrategy, WorkerConfig};
use crate::frame::FrameDecoder;
use crate::{SidecarCallbacks, SidecarError};

/// Event id emitted after every successful `process`.
pub const EVENT_ACK: i32 = 1;

/// Payload of the acknowledgement event.
pub const ACK_PAYLOAD: &[u8] = b"OK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Names a shared ring for a worker to attach to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingDescriptor {
    pub name: String,
    pub capacity: u32,
}

#[derive(Default)]
struct Lifecycle {
    thread: Option<JoinHandle<usize>>,
    // Attachment opened by `start_with_descriptor`, closed on stop.
    region: Option<SharedRegion>,
}

/// Drains a byte ring on a dedicated thread and hands the bytes to
/// [`SidecarCallbacks::process`].
///
/// `start` and `stop` may be called any number of times from any thread;
/// both are idempotent. They must not be called from inside a callback.
pub struct SidecarWorker {
    config: WorkerConfig,
    state: AtomicU8,
    running: Arc<AtomicBool>,
    lifecycle: Mutex<Lifecycle>,
    dispatch: Mutex<Option<Arc<Dispatch>>>,
}

impl SidecarWorker {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(WorkerState::Stopped as u8),
            running: Arc::new(AtomicBool::new(false)),
            lifecycle: Mutex::new(Lifecycle::default()),
            dispatch: Mutex::new(None),
        }
    }

    /// Start draining `rb`.
    ///
    /// Calls `init` on this thread, then spawns the worker thread. Does
    /// nothing if the worker is not stopped.
    pub fn start<R: AsByteRing>(
        &self,
        rb: Arc<R>,
        callbacks: Arc<dyn SidecarCallbacks>,
    ) -> Result<(), SidecarError> {
        let mut lifecycle = self.lifecycle.lock();
        if self.state() != WorkerState::Stopped {
            tracing::debug!(state = ?self.state(), "sidecar worker already started");
            return Ok(());
        }
        self.check_thread_name()?;
        self.launch(&mut lifecycle, rb, callbacks)
    }

    /// Open the shared region named by `desc` and start draining it.
    ///
    /// Fails with [`SidecarError::CapacityMismatch`] if the region's capacity
    /// differs from the descriptor's; `init` is not called in that case.
    pub fn start_with_descriptor(
        &self,
        desc: &RingDescriptor,
        callbacks: Arc<dyn SidecarCallbacks>,
    ) -> Result<(), SidecarError> {
        let mut lifecycle = self.lifecycle.lock();
        if self.state() != WorkerState::Stopped {
            tracing::debug!(state = ?self.state(), "sidecar worker already started");
            return Ok(());
        }
        self.check_thread_name()?;

        let region = SharedRegion::open(&desc.name)?;
        if region.capacity() != desc.capacity {
            return Err(SidecarError::CapacityMismatch {
                expected: desc.capacity,
                found: region.capacity(),
            });
        }
        let ring = Arc::new(region.ring()?);
        lifecycle.region = Some(region);
        self.launch(&mut lifecycle, ring, callbacks)
    }

    // `thread::Builder::spawn` panics rather than failing on an interior NUL.
    fn check_thread_name(&self) -> Result<(), SidecarError> {
        if self.config.thread_name.contains('\0') {
            return Err(SidecarError::Spawn(io::Error::new(
                io::ErrorKind::InvalidInput,
                "worker thread name contains a NUL byte",
            )));
        }
        Ok(())
    }

    fn launch(
        &self,
        lifecycle: &mut Lifecycle,
        ring: Arc<dyn AsByteRing>,
        callbacks: Arc<dyn SidecarCallbacks>,
    ) -> Result<(), SidecarError> {
        self.set_state(WorkerState::Starting);
        let dispatch = Arc::new(Dispatch::new(callbacks));
        dispatch.init();

        self.running.store(true, Ordering::Release);
        dispatch.set_live(true);
        *self.dispatch.lock() = Some(dispatch.clone());
        self.set_state(WorkerState::Running);

        let worker_loop = WorkerLoop {
            ring,
            dispatch,
            running: self.running.clone(),
            config: self.config.clone(),
        };
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker_loop.run());

        match spawned {
            Ok(handle) => {
                lifecycle.thread = Some(handle);
                tracing::debug!(thread = %self.config.thread_name, "sidecar worker started");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn sidecar worker thread");
                self.teardown(lifecycle);
                Err(SidecarError::Spawn(e))
            }
        }
    }

    /// Stop the worker thread and call `dispose`.
    ///
    /// Safe to call before `start` and more than once.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if self.state() == WorkerState::Stopped {
            return;
        }
        self.teardown(&mut lifecycle);
        tracing::debug!("sidecar worker stopped");
    }

    fn teardown(&self, lifecycle: &mut Lifecycle) {
        self.set_state(WorkerState::Stopping);
        self.running.store(false, Ordering::Release);

        if let Some(handle) = lifecycle.thread.take()
            && handle.join().is_err()
        {
            tracing::error!("sidecar worker thread panicked");
        }

        let dispatch = self.dispatch.lock().take();
        if let Some(dispatch) = dispatch {
            dispatch.set_live(false);
            dispatch.dispose();
        }

        if let Some(mut region) = lifecycle.region.take() {
            region.close();
        }
        self.set_state(WorkerState::Stopped);
    }

    /// Deliver `on_event` directly to the callbacks.
    ///
    /// Returns `false` if the worker is not running.
    pub fn emit_event(&self, id: i32, payload: &[u8]) -> bool {
        let dispatch = self.dispatch.lock().clone();
        dispatch.is_some_and(|d| d.emit(id, payload))
    }

    /// A handle for emitting events while this run of the worker is live.
    pub fn events(&self) -> Option<EventSink> {
        self.dispatch
            .lock()
            .clone()
            .map(|dispatch| EventSink { dispatch })
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Default for SidecarWorker {
    fn default() -> Self {
        Self::new(WorkerConfig::default())
    }
}

impl Drop for SidecarWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SidecarWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarWorker")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

struct WorkerLoop {
    ring: Arc<dyn AsByteRing>,
    dispatch: Arc<Dispatch>,
    running: Arc<AtomicBool>,
    config: WorkerConfig,
}

impl WorkerLoop {
    /// Drain the ring until `running` clears. Returns the number of buffered
    /// bytes of an incomplete frame that were discarded on exit.
    fn run(self) -> usize {
        let ring = self.ring.byte_ring();
        let mut chunk = vec![0u8; self.config.read_chunk.max(1)];
        let mut decoder = match self.config.framing {
            Framing::Stream => None,
            Framing::Frames => Some(FrameDecoder::new()),
        };
        tracing::debug!(capacity = ring.capacity(), framing = ?self.config.framing, "sidecar worker loop running");

        while self.running.load(Ordering::Acquire) {
            if ring.available_to_read() == 0 {
                self.idle();
                continue;
            }
            let n = ring.read(&mut chunk) as usize;
            if n == 0 {
                continue;
            }
            tracing::trace!(n, "sidecar worker read");

            match decoder.as_mut() {
                None => self.deliver(&chunk[..n]),
                Some(decoder) => {
                    decoder.push(&chunk[..n]);
                    loop {
                        match decoder.next_frame() {
                            Ok(Some(frame)) => self.deliver(&frame),
                            Ok(None) => break,
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    dropped = decoder.buffered(),
                                    "malformed command frame, resetting decoder"
                                );
                                decoder.reset();
                                break;
                            }
                        }
                    }
                }
            }
        }
        let dropped = decoder.as_ref().map_or(0, FrameDecoder::buffered);
        if dropped > 0 {
            tracing::warn!(
                dropped,
                "sidecar worker stopped with a partial command frame buffered"
            );
        }
        tracing::debug!("sidecar worker loop exited");
        dropped
    }

    fn deliver(&self, bytes: &[u8]) {
        match self.dispatch.process(bytes) {
            Ok(()) => {
                if self.config.ack_events {
                    self.dispatch.emit(EVENT_ACK, ACK_PAYLOAD);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, len = bytes.len(), "sidecar process callback failed");
            }
        }
    }

    fn idle(&self) {
        match self.config.idle {
            IdleStrategy::Yield => thread::yield_now(),
            IdleStrategy::Sleep(d) => thread::sleep(d),
        }
    }
}
