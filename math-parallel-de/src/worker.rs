//! Dedicated worker threads and the permission-gated pass loop.
//!
//! Every worker repeats: wait for permission, run one pass, mark itself
//! completed. The leader additionally hands control to its
//! [`PassCompletionHandler`] after each pass, which decides whether the next
//! generation starts. All flags are atomics polled with `spin_until`; the only
//! lock is the one serialising `start`/`stop` on a given worker.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_utils::CachePadded;
use log::{debug, error, warn};

use crate::error::{DEError, Result, panic_message};
use crate::spin::spin_until;
use crate::step_executor::PassExecutor;

const NO_BEST: usize = usize::MAX;

static LIVE_WORKERS: AtomicUsize = AtomicUsize::new(0);

/// Number of worker threads currently alive in the process.
pub fn live_worker_count() -> usize {
    LIVE_WORKERS.load(Ordering::Acquire)
}

/// Cross-thread state of one worker.
#[derive(Debug)]
pub struct WorkerState {
    id: usize,
    running: AtomicBool,
    preparing: AtomicBool,
    permitted: CachePadded<AtomicBool>,
    completed: CachePadded<AtomicBool>,
    stop_requested: AtomicBool,
    failed: AtomicBool,
    best_index: AtomicUsize,
    failure: Mutex<Option<DEError>>,
}

impl WorkerState {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            running: AtomicBool::new(false),
            preparing: AtomicBool::new(false),
            permitted: CachePadded::new(AtomicBool::new(false)),
            completed: CachePadded::new(AtomicBool::new(false)),
            stop_requested: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            best_index: AtomicUsize::new(NO_BEST),
            failure: Mutex::new(None),
        }
    }

    /// Worker id.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether the worker thread is inside its loop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the last granted pass has finished (successfully or not).
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Whether the worker captured a failure since it was started.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Best index reported by the last successful pass.
    pub fn best_index(&self) -> Option<usize> {
        match self.best_index.load(Ordering::Acquire) {
            NO_BEST => None,
            i => Some(i),
        }
    }

    /// The captured failure, if any.
    pub fn failure(&self) -> Option<DEError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Releases the worker for its next pass.
    pub(crate) fn grant_permission(&self) {
        self.completed.store(false, Ordering::Release);
        self.permitted.store(true, Ordering::Release);
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Requests exit and spins until the thread has left its loop.
    pub(crate) fn stop_and_wait(&self) {
        self.request_stop();
        spin_until(|| !self.is_running());
    }

    fn reset_for_start(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.failed.store(false, Ordering::Release);
        self.best_index.store(NO_BEST, Ordering::Release);
        self.stop_requested.store(false, Ordering::Release);
        self.preparing.store(true, Ordering::Release);
    }

    fn record_failure(&self, err: DEError) {
        warn!("worker {} failed: {}", self.id, err);
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
        self.failed.store(true, Ordering::Release);
    }
}

/// What the leader does after its completion handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassDecision {
    /// Permission was granted again; keep looping.
    Continue,
    /// Leave the loop.
    Terminate,
}

/// Generation-level decision point, run on the leader thread after every pass.
pub trait PassCompletionHandler: Send {
    /// Called after the leader finished a pass (or failed it).
    fn on_pass_complete(&mut self, leader: &WorkerState) -> PassDecision;

    /// Called once the leader thread has marked itself not running.
    fn on_leader_exit(&mut self) {}
}

/// Shared handle to a completion handler.
pub type SharedHandler = Arc<Mutex<dyn PassCompletionHandler>>;

/// A worker owning one dedicated OS thread.
pub struct WorkerThread<E: PassExecutor> {
    state: Arc<WorkerState>,
    executor: Arc<E>,
    handler: Option<SharedHandler>,
    lifecycle: Mutex<Option<JoinHandle<()>>>,
}

impl<E: PassExecutor> WorkerThread<E> {
    /// A follower: runs passes, never coordinates.
    pub fn follower(id: usize, executor: Arc<E>) -> Self {
        Self::with_handler(id, executor, None)
    }

    /// The leader: runs passes, then hands control to `handler`.
    pub fn leader(id: usize, executor: Arc<E>, handler: SharedHandler) -> Self {
        Self::with_handler(id, executor, Some(handler))
    }

    fn with_handler(id: usize, executor: Arc<E>, handler: Option<SharedHandler>) -> Self {
        Self {
            state: Arc::new(WorkerState::new(id)),
            executor,
            handler,
            lifecycle: Mutex::new(None),
        }
    }

    /// Worker id.
    pub fn id(&self) -> usize {
        self.state.id
    }

    /// Whether this worker triggers coordination.
    pub fn is_leader(&self) -> bool {
        self.handler.is_some()
    }

    /// Shared flags of this worker.
    pub fn state(&self) -> &Arc<WorkerState> {
        &self.state
    }

    /// Whether the thread is inside its loop.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Spawns the thread with initial permission and returns once it runs.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` if the thread is alive, `ThreadSpawn` if the OS refuses.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        let id = self.state.id;
        if self.state.is_running() {
            return Err(DEError::AlreadyRunning { worker_id: id });
        }
        if let Some(handle) = lifecycle.take() {
            join_worker(id, handle);
        }

        self.state.reset_for_start();
        self.state.grant_permission();

        let state = Arc::clone(&self.state);
        let executor = Arc::clone(&self.executor);
        let handler = self.handler.clone();
        let spawned = thread::Builder::new()
            .name(format!("de-worker-{}", id))
            .spawn(move || thread_main(&state, &*executor, handler.as_ref()));

        match spawned {
            Ok(handle) => *lifecycle = Some(handle),
            Err(e) => {
                self.state.permitted.store(false, Ordering::Release);
                self.state.preparing.store(false, Ordering::Release);
                return Err(DEError::ThreadSpawn {
                    worker_id: id,
                    reason: e.to_string(),
                });
            }
        }

        spin_until(|| !self.state.preparing.load(Ordering::Acquire));
        debug!("worker {} started", id);
        Ok(())
    }

    /// Signals the thread to exit at its next checkpoint and waits for it.
    ///
    /// An in-flight pass is never interrupted.
    ///
    /// # Errors
    ///
    /// `NotRunning` if the thread is not alive.
    pub fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        let id = self.state.id;
        if !self.state.is_running() {
            return Err(DEError::NotRunning { worker_id: id });
        }
        self.state.stop_and_wait();
        if let Some(handle) = lifecycle.take() {
            join_worker(id, handle);
        }
        debug!("worker {} stopped", id);
        Ok(())
    }

    /// Joins a thread that already left its loop.
    ///
    /// The leader publishes the run outcome on its way out, so joining is what
    /// makes that outcome visible after a stop.
    pub(crate) fn release(&self) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = lifecycle.take() {
            if self.state.is_running() {
                self.state.stop_and_wait();
            }
            join_worker(self.state.id, handle);
        }
    }
}

impl<E: PassExecutor> Drop for WorkerThread<E> {
    fn drop(&mut self) {
        self.release();
    }
}

fn join_worker(id: usize, handle: JoinHandle<()>) {
    if let Err(payload) = handle.join() {
        error!(
            "worker {} thread panicked: {}",
            id,
            panic_message(payload.as_ref())
        );
    }
}

/// Clears `running` however the loop is left.
struct RunningGuard<'a>(&'a WorkerState);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
        LIVE_WORKERS.fetch_sub(1, Ordering::AcqRel);
    }
}

fn thread_main<E: PassExecutor>(
    state: &WorkerState,
    executor: &E,
    handler: Option<&SharedHandler>,
) {
    {
        LIVE_WORKERS.fetch_add(1, Ordering::AcqRel);
        state.running.store(true, Ordering::Release);
        let _running = RunningGuard(state);
        state.preparing.store(false, Ordering::Release);

        let looped = panic::catch_unwind(AssertUnwindSafe(|| pass_loop(state, executor, handler)));
        if let Err(payload) = looped {
            error!(
                "worker {} left its loop by panic: {}",
                state.id,
                panic_message(payload.as_ref())
            );
        }
    }

    if let Some(handler) = handler {
        handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_leader_exit();
    }
    debug!("worker {} exited", state.id);
}

fn pass_loop<E: PassExecutor>(
    state: &WorkerState,
    executor: &E,
    handler: Option<&SharedHandler>,
) {
    let mut scratch = executor.scratch(state.id);
    while !state.stop_requested() {
        spin_until(|| state.permitted.load(Ordering::Acquire) || state.stop_requested());
        state.permitted.store(false, Ordering::Release);
        if state.stop_requested() {
            break;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            executor.execute(state.id, &mut scratch)
        }))
        .unwrap_or_else(|payload| {
            Err(DEError::WorkerPanicked {
                worker_id: state.id,
                message: panic_message(payload.as_ref()),
            })
        });

        let failed = match outcome {
            Ok(best) => {
                state
                    .best_index
                    .store(best.unwrap_or(NO_BEST), Ordering::Release);
                false
            }
            Err(err) => {
                state.record_failure(err);
                true
            }
        };
        state.completed.store(true, Ordering::Release);

        if let Some(handler) = handler {
            let decision = handler
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .on_pass_complete(state);
            if decision == PassDecision::Terminate {
                break;
            }
        }
        if failed {
            break;
        }
    }
}
