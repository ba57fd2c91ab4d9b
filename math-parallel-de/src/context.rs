use std::fmt;
use std::sync::Arc;

use ndarray::Array1;

use crate::population::PopulationBuffers;
use crate::traits::{MutationOperator, ObjectiveFunction, SelectionOperator};

/// Problem definition shared by every worker of a run.
///
/// Immutable once built; the population buffers behind it follow the
/// current/trial protocol documented on [`PopulationBuffers`].
pub struct ProblemContext {
    pub(crate) population_size: usize,
    pub(crate) genome_size: usize,
    pub(crate) workers: usize,
    pub(crate) lower: Array1<f64>,
    pub(crate) upper: Array1<f64>,
    pub(crate) seed: Option<u64>,
    pub(crate) objective: Arc<dyn ObjectiveFunction>,
    pub(crate) mutation: Arc<dyn MutationOperator>,
    pub(crate) selection: Arc<dyn SelectionOperator>,
    pub(crate) buffers: Arc<PopulationBuffers>,
}

impl ProblemContext {
    /// Number of individuals.
    pub fn population_size(&self) -> usize {
        self.population_size
    }

    /// Number of genes per individual.
    pub fn genome_size(&self) -> usize {
        self.genome_size
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Lower gene bounds.
    pub fn lower(&self) -> &Array1<f64> {
        &self.lower
    }

    /// Upper gene bounds.
    pub fn upper(&self) -> &Array1<f64> {
        &self.upper
    }

    /// Seed the run was built with, if any.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// The two population arenas.
    pub fn buffers(&self) -> &PopulationBuffers {
        &self.buffers
    }
}

impl fmt::Debug for ProblemContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProblemContext")
            .field("population_size", &self.population_size)
            .field("genome_size", &self.genome_size)
            .field("workers", &self.workers)
            .field("seed", &self.seed)
            .field("buffers", &self.buffers)
            .finish_non_exhaustive()
    }
}
