//! Collaborator contracts consumed by the generation engine
//!
//! - [`ObjectiveFunction`]: scores a genome, called concurrently from every worker
//! - [`MutationOperator`]: builds a candidate from the current population
//! - [`SelectionOperator`]: decides what lands in the trial slot
//! - [`TerminationPredicate`]: decides, once per generation, whether to stop
//! - [`PopulationObserver`]: receives every completed generation
//! - [`PopulationSampler`]: draws the initial population
//!
//! Plain closures implement each trait, so most callers never name them.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;

use crate::error::BoxError;
use crate::population::{GenerationView, TrialSlot};

/// Objective to minimize.
///
/// Workers call `evaluate` concurrently with distinct genomes.
pub trait ObjectiveFunction: Send + Sync {
    /// Fitness of `genome`; lower is better.
    fn evaluate(&self, genome: &Array1<f64>) -> Result<f64, BoxError>;
}

impl<F> ObjectiveFunction for F
where
    F: Fn(&Array1<f64>) -> f64 + Send + Sync,
{
    fn evaluate(&self, genome: &Array1<f64>) -> Result<f64, BoxError> {
        Ok(self(genome))
    }
}

/// Adapter for objectives that can fail.
///
/// ```rust
/// use math_audio_parallel_de::{FallibleObjective, ObjectiveFunction};
/// use ndarray::{array, Array1};
///
/// let objective = FallibleObjective(|x: &Array1<f64>| {
///     if x[0].is_nan() {
///         return Err("NaN gene".into());
///     }
///     Ok(x[0] * x[0])
/// });
/// assert_eq!(objective.evaluate(&array![3.0]).unwrap(), 9.0);
/// ```
#[derive(Debug, Clone)]
pub struct FallibleObjective<F>(pub F);

impl<F> ObjectiveFunction for FallibleObjective<F>
where
    F: Fn(&Array1<f64>) -> Result<f64, BoxError> + Send + Sync,
{
    fn evaluate(&self, genome: &Array1<f64>) -> Result<f64, BoxError> {
        (self.0)(genome)
    }
}

/// Produces a candidate for individual `index`.
///
/// Must only write `candidate`; `population` is the read-only current
/// generation. Shared by all workers, so any state must be immutable.
pub trait MutationOperator: Send + Sync {
    /// Writes the candidate for `index` into `candidate`.
    fn mutate(
        &self,
        index: usize,
        population: ArrayView2<'_, f64>,
        candidate: &mut Array1<f64>,
        rng: &mut StdRng,
    ) -> Result<(), BoxError>;

    /// Smallest population this operator can draw its donors from.
    fn minimum_population(&self) -> usize {
        4
    }
}

impl<F> MutationOperator for F
where
    F: Fn(usize, ArrayView2<'_, f64>, &mut Array1<f64>, &mut StdRng) -> Result<(), BoxError>
        + Send
        + Sync,
{
    fn mutate(
        &self,
        index: usize,
        population: ArrayView2<'_, f64>,
        candidate: &mut Array1<f64>,
        rng: &mut StdRng,
    ) -> Result<(), BoxError> {
        self(index, population, candidate, rng)
    }
}

/// Writes the survivor of individual `index` into its trial slot.
pub trait SelectionOperator: Send + Sync {
    /// Compares the candidate against the current individual `index` and writes
    /// exactly one of them into `slot`.
    fn select(
        &self,
        index: usize,
        candidate_fitness: f64,
        candidate: &Array1<f64>,
        current_fitness: ArrayView1<'_, f64>,
        current: ArrayView2<'_, f64>,
        slot: TrialSlot<'_>,
    ) -> Result<(), BoxError>;
}

/// Decides after each generation whether the run is over.
///
/// Called on the leader thread only, so it may keep mutable state.
pub trait TerminationPredicate: Send {
    /// Returns `true` to end the run with `view` as the final generation.
    fn should_terminate(&mut self, view: &GenerationView<'_>) -> bool;
}

impl<F> TerminationPredicate for F
where
    F: FnMut(&GenerationView<'_>) -> bool + Send,
{
    fn should_terminate(&mut self, view: &GenerationView<'_>) -> bool {
        self(view)
    }
}

/// Receives every completed generation before the termination check.
pub trait PopulationObserver: Send {
    /// Inspects the generation. An error aborts the run.
    fn handle(&mut self, view: &GenerationView<'_>) -> Result<(), BoxError>;
}

impl<F> PopulationObserver for F
where
    F: FnMut(&GenerationView<'_>) -> Result<(), BoxError> + Send,
{
    fn handle(&mut self, view: &GenerationView<'_>) -> Result<(), BoxError> {
        self(view)
    }
}

/// Draws the initial population.
pub trait PopulationSampler {
    /// Returns a `population_size x lower.len()` matrix inside the bounds.
    fn sample(
        &mut self,
        population_size: usize,
        lower: &Array1<f64>,
        upper: &Array1<f64>,
        rng: &mut StdRng,
    ) -> Array2<f64>;
}

impl<F> PopulationSampler for F
where
    F: FnMut(&mut StdRng) -> Array2<f64>,
{
    fn sample(
        &mut self,
        _population_size: usize,
        _lower: &Array1<f64>,
        _upper: &Array1<f64>,
        rng: &mut StdRng,
    ) -> Array2<f64> {
        self(rng)
    }
}
