//! One worker's share of a generation: mutate, evaluate, select, track best.

use std::sync::Arc;

use ndarray::Array1;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::context::ProblemContext;
use crate::error::{BoxError, DEError, Result};
use crate::partition::partition;

/// Work a [`WorkerThread`](crate::worker::WorkerThread) performs once per permission.
pub trait PassExecutor: Send + Sync + 'static {
    /// Per-thread mutable state, created when the thread starts.
    type Scratch: Send;

    /// Builds the scratch state for `worker_id`.
    fn scratch(&self, worker_id: usize) -> Self::Scratch;

    /// Processes the partition of `worker_id` and returns the index of the best
    /// individual it wrote, or `None` for an empty partition.
    fn execute(&self, worker_id: usize, scratch: &mut Self::Scratch) -> Result<Option<usize>>;
}

/// Candidate vector and random stream owned by one worker thread.
#[derive(Debug)]
pub struct PassScratch {
    rng: StdRng,
    candidate: Array1<f64>,
}

/// Runs the DE step for the round-robin partition of a worker.
#[derive(Debug, Clone)]
pub struct GenerationStepExecutor {
    context: Arc<ProblemContext>,
}

impl GenerationStepExecutor {
    /// Executor over `context`.
    pub fn new(context: Arc<ProblemContext>) -> Self {
        Self { context }
    }

    /// Shared problem definition.
    pub fn context(&self) -> &Arc<ProblemContext> {
        &self.context
    }
}

impl PassExecutor for GenerationStepExecutor {
    type Scratch = PassScratch;

    fn scratch(&self, worker_id: usize) -> PassScratch {
        let rng = match self.context.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker_id as u64)),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        PassScratch {
            rng,
            candidate: Array1::zeros(self.context.genome_size),
        }
    }

    fn execute(&self, worker_id: usize, scratch: &mut PassScratch) -> Result<Option<usize>> {
        let ctx = &*self.context;
        let failed = |index: usize| {
            move |source: BoxError| DEError::Evaluation {
                worker_id,
                index,
                source: Arc::from(source),
            }
        };

        // SAFETY: buffers are swapped only by the coordinator while every worker
        // is parked waiting for permission, never during a pass.
        let (genomes, fitness) = unsafe { ctx.buffers.current_view() };

        let mut best: Option<(usize, f64)> = None;
        for i in partition(worker_id, ctx.workers, ctx.population_size) {
            ctx.mutation
                .mutate(i, genomes, &mut scratch.candidate, &mut scratch.rng)
                .map_err(failed(i))?;
            let candidate_fitness = ctx
                .objective
                .evaluate(&scratch.candidate)
                .map_err(failed(i))?;

            // SAFETY: `i` belongs to this worker's partition, partitions are
            // disjoint, and the slot handle is consumed before the next index.
            let slot = unsafe { ctx.buffers.trial_slot(i) };
            ctx.selection
                .select(i, candidate_fitness, &scratch.candidate, fitness, genomes, slot)
                .map_err(failed(i))?;

            // SAFETY: as above; the slot handle was moved into `select`.
            let written = unsafe { ctx.buffers.trial_fitness(i) };
            if best.is_none_or(|(_, f)| written < f) {
                best = Some((i, written));
            }
        }
        Ok(best.map(|(i, _)| i))
    }
}
