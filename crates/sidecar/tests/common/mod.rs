#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sidecar::{CallbackError, SidecarCallbacks};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Region names unique per process and per call. Kept short for macOS.
pub fn unique_name(tag: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("sct{}-{}{}", std::process::id(), tag, n)
}

/// Spin until `cond` holds, failing the test after ten seconds.
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Init,
    Dispose,
    Process(Vec<u8>),
    Event(i32, Vec<u8>),
}

/// Records every callback. `process` fails for input ending in `!fail` and
/// panics for input ending in `!panic`.
#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn inits(&self) -> usize {
        self.count(|c| *c == Call::Init)
    }

    pub fn disposes(&self) -> usize {
        self.count(|c| *c == Call::Dispose)
    }

    pub fn processed(&self) -> Vec<Vec<u8>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Process(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn processed_bytes(&self) -> Vec<u8> {
        self.processed().concat()
    }

    pub fn events(&self) -> Vec<(i32, Vec<u8>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Event(id, b) => Some((*id, b.clone())),
                _ => None,
            })
            .collect()
    }
}

impl SidecarCallbacks for Recorder {
    fn init(&self) {
        self.calls.lock().push(Call::Init);
    }

    fn dispose(&self) {
        self.calls.lock().push(Call::Dispose);
    }

    fn process(&self, command: &[u8]) -> Result<(), CallbackError> {
        self.calls.lock().push(Call::Process(command.to_vec()));
        if command.ends_with(b"!panic") {
            panic!("process asked to panic");
        }
        if command.ends_with(b"!fail") {
            return Err(CallbackError::msg("process asked to fail"));
        }
        Ok(())
    }

    fn on_event(&self, id: i32, payload: &[u8]) {
        self.calls.lock().push(Call::Event(id, payload.to_vec()));
    }
}
