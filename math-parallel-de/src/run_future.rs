use std::fmt;
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::population::GenerationResult;

struct Shared {
    outcome: OnceLock<Result<GenerationResult>>,
    lock: Mutex<()>,
    ready: Condvar,
}

/// One-shot handle on the outcome of a run.
///
/// Resolves exactly once, with the terminal generation or with the failure that
/// ended the run. Clones observe the same outcome.
#[derive(Clone)]
pub struct RunFuture {
    shared: Arc<Shared>,
}

impl RunFuture {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                outcome: OnceLock::new(),
                lock: Mutex::new(()),
                ready: Condvar::new(),
            }),
        }
    }

    /// Stores `outcome` unless one is already stored. Returns whether it was stored.
    pub(crate) fn resolve(&self, outcome: Result<GenerationResult>) -> bool {
        let _guard = self.shared.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = self.shared.outcome.set(outcome).is_ok();
        if stored {
            self.shared.ready.notify_all();
        }
        stored
    }

    /// Whether the outcome is available.
    pub fn is_resolved(&self) -> bool {
        self.shared.outcome.get().is_some()
    }

    /// The outcome, if available, without blocking.
    pub fn try_get(&self) -> Option<Result<GenerationResult>> {
        self.shared.outcome.get().cloned()
    }

    /// Blocks the calling thread until the outcome is available.
    pub fn wait(&self) -> Result<GenerationResult> {
        let mut guard = self.shared.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = self.shared.outcome.get() {
                return outcome.clone();
            }
            guard = self
                .shared
                .ready
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<GenerationResult>> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = self.shared.outcome.get() {
                return Some(outcome.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            guard = self
                .shared
                .ready
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl fmt::Debug for RunFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunFuture")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
