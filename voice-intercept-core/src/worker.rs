use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::error::InterceptError;

/// Per-run permission to deliver.
///
/// Holders run delivery inside [`pass`](Self::pass); [`close`](Self::close)
/// waits for an in-flight pass, so nothing is delivered once it returns.
/// Do not close a gate from inside its own `pass`.
#[derive(Clone)]
pub struct Gate(Arc<Mutex<bool>>);

impl Gate {
    pub fn open() -> Self {
        Self(Arc::new(Mutex::new(true)))
    }

    pub fn is_open(&self) -> bool {
        *self.0.lock()
    }

    pub fn close(&self) {
        *self.0.lock() = false;
    }

    /// Run `f` if the gate is open, holding it open until `f` returns.
    pub fn pass<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let open = self.0.lock();
        if *open {
            Some(f())
        } else {
            None
        }
    }
}

struct Run {
    gate: Gate,
    handle: thread::JoinHandle<()>,
}

/// A named background loop with cooperative cancellation.
///
/// Every spawn gets its own [`Gate`]. `stop` never waits longer than its
/// timeout: a thread stuck inside SDK code is detached rather than
/// joined, and its closed gate keeps it from delivering or from touching
/// a later run.
pub struct PollWorker {
    name: String,
    current: Mutex<Option<Run>>,
}

impl PollWorker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.lock().as_ref().is_some_and(|run| run.gate.is_open())
    }

    /// Run `tick` every `interval` until it returns `false` or `stop` is called.
    ///
    /// `tick` receives this run's gate and should deliver through it.
    /// No-op if the loop is already running.
    pub fn spawn<F>(&self, interval: Duration, mut tick: F) -> Result<(), InterceptError>
    where
        F: FnMut(&Gate) -> bool + Send + 'static,
    {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|run| run.gate.is_open()) {
            return Ok(());
        }

        let gate = Gate::open();
        let own = gate.clone();
        let spawned = thread::Builder::new().name(self.name.clone()).spawn(move || {
            while own.is_open() {
                if !tick(&own) {
                    break;
                }
                thread::sleep(interval);
            }
            own.close();
        });

        match spawned {
            Ok(handle) => {
                *current = Some(Run { gate, handle });
                Ok(())
            }
            Err(e) => Err(InterceptError::Unknown(format!("failed to spawn {}: {}", self.name, e))),
        }
    }

    /// Close the current run's gate and wait up to `timeout` for its thread.
    ///
    /// Returns `false` if the thread had to be detached. Idempotent.
    pub fn stop(&self, timeout: Duration) -> bool {
        let Some(run) = self.current.lock().take() else {
            return true;
        };
        run.gate.close();

        if run.handle.thread().id() == thread::current().id() {
            // Stopped from inside its own tick; the loop exits on return.
            return true;
        }

        let deadline = Instant::now() + timeout;
        while !run.handle.is_finished() {
            if Instant::now() >= deadline {
                log::warn!("{} did not exit within {:?}; detaching", self.name, timeout);
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        let _ = run.handle.join();
        true
    }
}

impl Drop for PollWorker {
    fn drop(&mut self) {
        if let Some(run) = self.current.get_mut().take() {
            run.gate.close();
        }
    }
}
