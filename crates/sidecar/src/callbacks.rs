//! The callback capability set a host registers with its worker.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::ReentrantMutex;

use crate::CallbackError;

/// Callbacks invoked by a [`SidecarWorker`](crate::SidecarWorker).
///
/// Invocations are serialized: no two callbacks on the same worker run at
/// the same time. `init` runs once on the thread calling `start`, before the
/// first `process`; `dispose` runs once on the thread calling `stop`, after
/// the last `process`. `process` and acknowledgement events run on the worker
/// thread.
pub trait SidecarCallbacks: Send + Sync + 'static {
    fn init(&self) {}

    fn dispose(&self) {}

    /// Handle bytes read from the ring.
    ///
    /// The bytes have already been consumed. An `Err` (or a panic) is logged
    /// and the worker moves on.
    fn process(&self, command: &[u8]) -> Result<(), CallbackError>;

    /// An event delivered directly, not through the ring.
    fn on_event(&self, _id: i32, _payload: &[u8]) {}
}

/// Reports every callback through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallbacks;

impl SidecarCallbacks for LoggingCallbacks {
    fn init(&self) {
        tracing::info!("sidecar init");
    }

    fn dispose(&self) {
        tracing::info!("sidecar dispose");
    }

    fn process(&self, command: &[u8]) -> Result<(), CallbackError> {
        tracing::info!(len = command.len(), bytes = %HexPreview(command), "sidecar process");
        Ok(())
    }

    fn on_event(&self, id: i32, payload: &[u8]) {
        tracing::info!(id, payload = %String::from_utf8_lossy(payload), "sidecar event");
    }
}

struct HexPreview<'a>(&'a [u8]);

impl std::fmt::Display for HexPreview<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const LIMIT: usize = 32;
        for (i, b) in self.0.iter().take(LIMIT).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", b)?;
        }
        if self.0.len() > LIMIT {
            write!(f, " ..")?;
        }
        Ok(())
    }
}

/// Serializes callback invocations for one worker run.
pub(crate) struct Dispatch {
    callbacks: Arc<dyn SidecarCallbacks>,
    // Reentrant so `on_event` can be emitted from inside `process`.
    lock: ReentrantMutex<()>,
    live: AtomicBool,
}

impl Dispatch {
    pub(crate) fn new(callbacks: Arc<dyn SidecarCallbacks>) -> Self {
        Self {
            callbacks,
            lock: ReentrantMutex::new(()),
            live: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Release);
    }

    pub(crate) fn init(&self) {
        let _guard = self.lock.lock();
        self.callbacks.init();
    }

    pub(crate) fn dispose(&self) {
        let _guard = self.lock.lock();
        self.callbacks.dispose();
    }

    /// Run `process`, turning a panic into an error.
    pub(crate) fn process(&self, bytes: &[u8]) -> Result<(), CallbackError> {
        let _guard = self.lock.lock();
        match panic::catch_unwind(AssertUnwindSafe(|| self.callbacks.process(bytes))) {
            Ok(result) => result,
            Err(payload) => Err(CallbackError::msg(format_args!(
                "process panicked: {}",
                panic_message(&*payload)
            ))),
        }
    }

    /// Deliver an event if the worker is running.
    pub(crate) fn emit(&self, id: i32, payload: &[u8]) -> bool {
        if !self.live.load(Ordering::Acquire) {
            return false;
        }
        let _guard = self.lock.lock();
        // `dispose` may have run while we waited for the lock.
        if !self.live.load(Ordering::Acquire) {
            return false;
        }
        if let Err(p) = panic::catch_unwind(AssertUnwindSafe(|| {
            self.callbacks.on_event(id, payload)
        })) {
            tracing::error!(id, panic = %panic_message(&*p), "on_event panicked");
        }
        true
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

/// A cloneable handle for emitting events to a running worker's callbacks.
///
/// Events bypass the ring and are delivered synchronously on the calling
/// thread. Once the worker stops, [`emit`](Self::emit) returns `false`.
#[derive(Clone)]
pub struct EventSink {
    pub(crate) dispatch: Arc<Dispatch>,
}

impl EventSink {
    pub fn emit(&self, id: i32, payload: &[u8]) -> bool {
        self.dispatch.emit(id, payload)
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("live", &self.dispatch.live.load(Ordering::Relaxed))
            .finish()
    }
}
