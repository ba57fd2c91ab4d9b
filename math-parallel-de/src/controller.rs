use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};

use crate::context::ProblemContext;
use crate::coordinator::GenerationBarrierCoordinator;
use crate::error::{DEError, Result};
use crate::run_future::RunFuture;
use crate::step_executor::GenerationStepExecutor;
use crate::traits::{PopulationObserver, TerminationPredicate};
use crate::worker::{SharedHandler, WorkerThread};

/// Owns the worker threads of one run and the future of its outcome.
///
/// Worker `workers - 1` is the leader. Dropping the controller shuts the run
/// down and joins every thread.
pub struct RunController {
    workers: Vec<WorkerThread<GenerationStepExecutor>>,
    future: RunFuture,
    context: Arc<ProblemContext>,
    // set once every worker started; serialises `run` against `run` and `shutdown`
    started: Mutex<bool>,
}

impl RunController {
    pub(crate) fn new(
        context: Arc<ProblemContext>,
        termination: Box<dyn TerminationPredicate>,
        observer: Option<Box<dyn PopulationObserver>>,
    ) -> Self {
        let future = RunFuture::new();
        let executor = Arc::new(GenerationStepExecutor::new(Arc::clone(&context)));
        let leader_id = context.workers - 1;

        let mut workers: Vec<_> = (0..leader_id)
            .map(|id| WorkerThread::follower(id, Arc::clone(&executor)))
            .collect();
        let followers = workers.iter().map(|w| Arc::clone(w.state())).collect();
        let coordinator = GenerationBarrierCoordinator::new(
            Arc::clone(&context),
            followers,
            termination,
            observer,
            future.clone(),
        );
        let handler: SharedHandler = Arc::new(Mutex::new(coordinator));
        workers.push(WorkerThread::leader(leader_id, executor, handler));

        Self {
            workers,
            future,
            context,
            started: Mutex::new(false),
        }
    }

    /// Starts every worker and returns the future of the outcome.
    ///
    /// Once the run has resolved, further calls return the same future without
    /// starting anything.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` if the run is in progress, or any start failure; workers
    /// already started are stopped again before the error is returned.
    pub fn run(&self) -> Result<RunFuture> {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if self.future.is_resolved() {
            return Ok(self.future.clone());
        }
        if *started {
            return Err(DEError::AlreadyRunning {
                worker_id: self.leader_id(),
            });
        }
        if let Some(worker) = self.workers.iter().find(|w| w.is_running()) {
            return Err(DEError::AlreadyRunning {
                worker_id: worker.id(),
            });
        }

        debug!(
            "starting run: {} workers, population {}, genome size {}",
            self.workers.len(),
            self.context.population_size,
            self.context.genome_size
        );
        // followers first, so the leader never coordinates a worker that is not up yet
        for (n, worker) in self.workers.iter().enumerate() {
            if let Err(err) = worker.start() {
                warn!("worker {} failed to start: {}", worker.id(), err);
                Self::stop_workers(&self.workers[..n]);
                return Err(err);
            }
        }
        *started = true;
        Ok(self.future.clone())
    }

    /// Future of the outcome; resolves only once [`run`](Self::run) was called.
    pub fn future(&self) -> RunFuture {
        self.future.clone()
    }

    /// Stops and joins every worker. If the run had not finished, its future
    /// resolves with [`DEError::Cancelled`]. Safe to call more than once.
    pub fn shutdown(&self) {
        let _started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        Self::stop_workers(&self.workers);
        if self.future.resolve(Err(DEError::Cancelled)) {
            warn!("run cancelled before termination");
        }
    }

    fn stop_workers(workers: &[WorkerThread<GenerationStepExecutor>]) {
        for worker in workers {
            match worker.stop() {
                Ok(()) | Err(DEError::NotRunning { .. }) => {}
                Err(err) => warn!("stopping worker {}: {}", worker.id(), err),
            }
            worker.release();
        }
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Id of the worker that runs the coordinator.
    pub fn leader_id(&self) -> usize {
        self.workers.len() - 1
    }

    /// Number of workers whose thread is inside its loop.
    pub fn running_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.is_running()).count()
    }

    /// Worker `id`, if it exists.
    pub fn worker(&self, id: usize) -> Option<&WorkerThread<GenerationStepExecutor>> {
        self.workers.get(id)
    }

    /// Shared problem definition.
    pub fn context(&self) -> &Arc<ProblemContext> {
        &self.context
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for RunController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunController")
            .field("workers", &self.workers.len())
            .field("running", &self.running_workers())
            .field("future", &self.future)
            .finish()
    }
}
