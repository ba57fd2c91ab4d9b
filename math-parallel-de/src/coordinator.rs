//! Per-generation rendezvous, run synchronously on the leader thread.
//!
//! The leader reaches the coordinator after its own pass, waits for every
//! follower to report, then either aborts the run (some worker failed),
//! finishes it (the termination predicate fired) or swaps the buffers and
//! releases everyone into the next generation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{info, trace, warn};
use ndarray::ArrayView1;

use crate::context::ProblemContext;
use crate::error::{AggregateFailure, BoxError, DEError, Result, SharedError, panic_message};
use crate::population::{GenerationResult, GenerationView};
use crate::run_future::RunFuture;
use crate::spin::spin_until;
use crate::traits::{PopulationObserver, TerminationPredicate};
use crate::worker::{PassCompletionHandler, PassDecision, WorkerState};

/// Reduces the partial results of one generation and decides what comes next.
pub struct GenerationBarrierCoordinator {
    context: Arc<ProblemContext>,
    followers: Vec<Arc<WorkerState>>,
    termination: Box<dyn TerminationPredicate>,
    observer: Option<Box<dyn PopulationObserver>>,
    generation: usize,
    future: RunFuture,
    pending: Option<Result<GenerationResult>>,
}

impl GenerationBarrierCoordinator {
    pub(crate) fn new(
        context: Arc<ProblemContext>,
        followers: Vec<Arc<WorkerState>>,
        termination: Box<dyn TerminationPredicate>,
        observer: Option<Box<dyn PopulationObserver>>,
        future: RunFuture,
    ) -> Self {
        Self {
            context,
            followers,
            termination,
            observer,
            generation: 0,
            future,
            pending: None,
        }
    }

    /// Number of generations completed so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Stops every follower, parks `outcome` for publication once the leader has
    /// left its loop, and tells the leader to terminate.
    fn finish(&mut self, outcome: Result<GenerationResult>) -> PassDecision {
        for follower in &self.followers {
            follower.stop_and_wait();
        }
        self.pending = Some(outcome);
        PassDecision::Terminate
    }

    fn collect_failures(&self, leader: &WorkerState) -> (Vec<DEError>, bool) {
        let mut failures = Vec::new();
        let mut cancelled = false;
        for state in self.followers.iter().map(|state| &**state).chain(Some(leader)) {
            if let Some(failure) = state.failure() {
                failures.push(failure);
            } else if !state.is_completed() {
                cancelled = true;
            }
        }
        (failures, cancelled)
    }

    /// Lowest fitness wins; the leader's candidate is considered first and
    /// ties keep the earlier candidate.
    fn reduce_best(&self, leader: &WorkerState, fitness: ArrayView1<'_, f64>) -> usize {
        let mut best: Option<usize> = None;
        let candidates = Some(leader)
            .into_iter()
            .chain(self.followers.iter().map(|state| &**state))
            .filter_map(WorkerState::best_index);
        for i in candidates {
            if best.is_none_or(|b| fitness[i] < fitness[b]) {
                best = Some(i);
            }
        }
        best.unwrap_or(0)
    }

    fn observe(&mut self, view: &GenerationView<'_>) -> Result<()> {
        let Some(observer) = self.observer.as_mut() else {
            return Ok(());
        };
        let generation = view.generation;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.handle(view)));
        let source: SharedError = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => Arc::from(e),
            Err(payload) => Arc::from(BoxError::from(panic_message(payload.as_ref()))),
        };
        Err(DEError::Observer { generation, source })
    }

    fn should_terminate(&mut self, view: &GenerationView<'_>) -> Result<bool> {
        let termination = &mut self.termination;
        panic::catch_unwind(AssertUnwindSafe(|| termination.should_terminate(view))).map_err(
            |payload| DEError::Termination {
                generation: view.generation,
                message: panic_message(payload.as_ref()),
            },
        )
    }
}

impl PassCompletionHandler for GenerationBarrierCoordinator {
    fn on_pass_complete(&mut self, leader: &WorkerState) -> PassDecision {
        for follower in &self.followers {
            spin_until(|| {
                follower.is_completed() || follower.has_failed() || !follower.is_running()
            });
        }

        let (failures, cancelled) = self.collect_failures(leader);
        if !failures.is_empty() {
            return self.finish(Err(AggregateFailure::new(failures).into()));
        }
        if cancelled {
            return self.finish(Err(DEError::Cancelled));
        }

        let buffers = Arc::clone(&self.context.buffers);
        buffers.swap();
        self.generation += 1;

        // SAFETY: every worker is parked on its permission flag until the
        // grant below, so nobody writes either arena while the view lives.
        let (genomes, fitness) = unsafe { buffers.current_view() };
        let best_index = self.reduce_best(leader, fitness);
        let view = GenerationView {
            generation: self.generation,
            best_index,
            genomes,
            fitness,
        };
        trace!(
            "generation {}: best fitness {:.6e} at {}",
            view.generation,
            view.best_fitness(),
            best_index
        );

        let terminate = self
            .observe(&view)
            .and_then(|()| self.should_terminate(&view));
        match terminate {
            Err(err) => self.finish(Err(AggregateFailure::new(vec![err]).into())),
            Ok(true) => {
                info!(
                    "terminated after {} generations, best fitness {:.6e}",
                    view.generation,
                    view.best_fitness()
                );
                let result = view.to_owned();
                self.finish(Ok(result))
            }
            Ok(false) => {
                for follower in &self.followers {
                    follower.grant_permission();
                }
                leader.grant_permission();
                PassDecision::Continue
            }
        }
    }

    fn on_leader_exit(&mut self) {
        if let Some(outcome) = self.pending.take() {
            if let Err(err) = &outcome {
                warn!("run ended with failure: {}", err);
            }
            self.future.resolve(outcome);
        }
    }
}
