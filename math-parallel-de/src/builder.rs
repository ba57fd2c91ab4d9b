//! Fluent configuration of a parallel DE run.

use std::sync::Arc;
use std::thread;

use log::debug;
use ndarray::Array1;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::context::ProblemContext;
use crate::controller::RunController;
use crate::error::{DEError, Result};
use crate::mutation::DifferentialMutation;
use crate::parallel_eval::evaluate_population;
use crate::population::PopulationBuffers;
use crate::sampling::{LatinHypercubeSampler, UniformSampler};
use crate::selection::GreedySelection;
use crate::termination::{GenerationLimit, StagnationStreak};
use crate::traits::{
    MutationOperator, ObjectiveFunction, PopulationObserver, PopulationSampler,
    SelectionOperator, TerminationPredicate,
};

/// Default mutation factor F.
pub const DEFAULT_MUTATION_FORCE: f64 = 0.5;
/// Default crossover probability CR.
pub const DEFAULT_CROSSOVER_PROBABILITY: f64 = 0.9;
/// Default population size per gene, when none is set.
pub const DEFAULT_POPSIZE_PER_GENE: usize = 15;

/// Smallest population the engine accepts.
pub const MIN_POPULATION: usize = 4;

enum MutationChoice {
    Default { force: f64, crossover_probability: f64 },
    Custom(Arc<dyn MutationOperator>),
}

/// Builder for a [`RunController`].
///
/// Objective, bounds and a termination predicate are required; everything else
/// has a default (uniform sampling, rand/1/bin mutation with F = 0.5 and
/// CR = 0.9, greedy selection, one worker).
///
/// # Example
///
/// ```rust
/// use math_audio_parallel_de::DifferentialEvolutionBuilder;
/// use ndarray::{array, Array1};
///
/// let controller = DifferentialEvolutionBuilder::new()
///     .objective(|x: &Array1<f64>| x.iter().map(|v| v * v).sum::<f64>())
///     .bounds(array![-5.0, -5.0], array![5.0, 5.0])
///     .population_size(40)
///     .workers(2)
///     .max_generations(200)
///     .seed(42)
///     .build()
///     .expect("valid configuration");
///
/// let result = controller.run().expect("workers start").wait().expect("run succeeds");
/// assert!(result.best_fitness() < 1e-4);
/// ```
pub struct DifferentialEvolutionBuilder {
    objective: Option<Arc<dyn ObjectiveFunction>>,
    bounds: Option<(Array1<f64>, Array1<f64>)>,
    population_size: Option<usize>,
    sampler: Box<dyn PopulationSampler>,
    mutation: MutationChoice,
    selection: Arc<dyn SelectionOperator>,
    termination: Option<Box<dyn TerminationPredicate>>,
    observer: Option<Box<dyn PopulationObserver>>,
    workers: usize,
    seed: Option<u64>,
}

impl Default for DifferentialEvolutionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DifferentialEvolutionBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            objective: None,
            bounds: None,
            population_size: None,
            sampler: Box::new(UniformSampler),
            mutation: MutationChoice::Default {
                force: DEFAULT_MUTATION_FORCE,
                crossover_probability: DEFAULT_CROSSOVER_PROBABILITY,
            },
            selection: Arc::new(GreedySelection::default()),
            termination: None,
            observer: None,
            workers: 1,
            seed: None,
        }
    }

    /// Sets the objective to minimize.
    pub fn objective<O: ObjectiveFunction + 'static>(mut self, objective: O) -> Self {
        self.objective = Some(Arc::new(objective));
        self
    }

    /// Sets the per-gene bounds; the genome size is `lower.len()`.
    pub fn bounds(mut self, lower: Array1<f64>, upper: Array1<f64>) -> Self {
        self.bounds = Some((lower, upper));
        self
    }

    /// Sets the population size (default: 15 per gene).
    pub fn population_size(mut self, population_size: usize) -> Self {
        self.population_size = Some(population_size);
        self
    }

    /// Sets the initial population sampler.
    pub fn sampler<S: PopulationSampler + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Draws the initial population uniformly inside the bounds.
    pub fn uniform_sampling(self) -> Self {
        self.sampler(UniformSampler)
    }

    /// Draws the initial population with Latin Hypercube Sampling.
    pub fn latin_hypercube_sampling(self) -> Self {
        self.sampler(LatinHypercubeSampler)
    }

    /// Sets a custom mutation operator.
    pub fn mutation<M: MutationOperator + 'static>(mut self, mutation: M) -> Self {
        self.mutation = MutationChoice::Custom(Arc::new(mutation));
        self
    }

    /// Uses rand/1/bin with the given mutation factor and crossover probability.
    pub fn default_mutation(mut self, force: f64, crossover_probability: f64) -> Self {
        self.mutation = MutationChoice::Default {
            force,
            crossover_probability,
        };
        self
    }

    /// Sets a custom selection operator.
    pub fn selection<S: SelectionOperator + 'static>(mut self, selection: S) -> Self {
        self.selection = Arc::new(selection);
        self
    }

    /// Uses greedy selection where the existing individual wins ties.
    pub fn default_selection(self) -> Self {
        self.selection(GreedySelection::default())
    }

    /// Sets the termination predicate.
    pub fn termination<T: TerminationPredicate + 'static>(mut self, termination: T) -> Self {
        self.termination = Some(Box::new(termination));
        self
    }

    /// Terminates after `max` generations.
    pub fn max_generations(self, max: usize) -> Self {
        self.termination(GenerationLimit(max))
    }

    /// Terminates once the best fitness moved by at most `threshold` for
    /// `streak` consecutive generations.
    pub fn stagnation(self, streak: usize, threshold: f64) -> Self {
        self.termination(StagnationStreak::new(streak, threshold))
    }

    /// Sets the number of worker threads.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// One worker per available CPU.
    pub fn all_workers(self) -> Self {
        let workers = thread::available_parallelism().map_or(1, |n| n.get());
        self.workers(workers)
    }

    /// Sets an observer called after every generation.
    pub fn observer<O: PopulationObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Sets the random seed for reproducibility.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates the configuration, samples and scores the initial population,
    /// and returns an idle controller.
    ///
    /// # Errors
    ///
    /// Any configuration error, or `InitialEvaluation` if the objective fails
    /// on the initial population.
    pub fn build(self) -> Result<RunController> {
        let objective = self.objective.ok_or(DEError::MissingComponent {
            component: "objective",
        })?;
        let (lower, upper) = self.bounds.ok_or(DEError::MissingComponent {
            component: "bounds",
        })?;
        validate_bounds(&lower, &upper)?;
        let termination = self.termination.ok_or(DEError::MissingComponent {
            component: "termination",
        })?;

        let genome_size = lower.len();
        let population_size = self
            .population_size
            .unwrap_or((DEFAULT_POPSIZE_PER_GENE * genome_size).max(MIN_POPULATION));
        if population_size < MIN_POPULATION {
            return Err(DEError::PopulationTooSmall {
                pop_size: population_size,
                minimum: MIN_POPULATION,
            });
        }
        if self.workers == 0 {
            return Err(DEError::InvalidWorkerCount {
                workers: self.workers,
            });
        }

        let mutation: Arc<dyn MutationOperator> = match self.mutation {
            MutationChoice::Default {
                force,
                crossover_probability,
            } => Arc::new(DifferentialMutation::new(
                lower.clone(),
                upper.clone(),
                force,
                crossover_probability,
            )?),
            MutationChoice::Custom(mutation) => mutation,
        };
        let minimum = mutation.minimum_population();
        if population_size < minimum {
            return Err(DEError::PopulationTooSmall {
                pop_size: population_size,
                minimum,
            });
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let mut sampler = self.sampler;
        let genomes = sampler.sample(population_size, &lower, &upper, &mut rng);
        if genomes.dim() != (population_size, genome_size) {
            return Err(DEError::InitialPopulationShape {
                expected: (population_size, genome_size),
                got: genomes.dim(),
            });
        }
        let fitness = evaluate_population(&genomes, objective.as_ref(), self.workers > 1)?;

        debug!(
            "built run: population {}, genome size {}, {} workers, seed {:?}",
            population_size, genome_size, self.workers, self.seed
        );
        let context = Arc::new(ProblemContext {
            population_size,
            genome_size,
            workers: self.workers,
            lower,
            upper,
            seed: self.seed,
            objective,
            mutation,
            selection: self.selection,
            buffers: Arc::new(PopulationBuffers::from_initial(&genomes, &fitness)),
        });
        Ok(RunController::new(context, termination, self.observer))
    }
}

/// Checks that bounds are non-empty, equally long and ordered.
pub(crate) fn validate_bounds(lower: &Array1<f64>, upper: &Array1<f64>) -> Result<()> {
    if lower.len() != upper.len() {
        return Err(DEError::BoundsMismatch {
            lower_len: lower.len(),
            upper_len: upper.len(),
        });
    }
    if lower.is_empty() {
        return Err(DEError::EmptyBounds);
    }
    for i in 0..lower.len() {
        if !(lower[i] <= upper[i]) {
            return Err(DEError::InvalidBounds {
                index: i,
                lower: lower[i],
                upper: upper[i],
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    fn sphere(x: &Array1<f64>) -> f64 {
        x.iter().map(|v| v * v).sum()
    }

    fn base() -> DifferentialEvolutionBuilder {
        DifferentialEvolutionBuilder::new()
            .objective(sphere)
            .bounds(array![-1.0, -1.0], array![1.0, 1.0])
            .max_generations(5)
    }

    #[test]
    fn test_missing_components() {
        let err = DifferentialEvolutionBuilder::new().build().unwrap_err();
        assert!(matches!(
            err,
            DEError::MissingComponent {
                component: "objective"
            }
        ));
        let err = DifferentialEvolutionBuilder::new()
            .objective(sphere)
            .bounds(array![0.0], array![1.0])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DEError::MissingComponent {
                component: "termination"
            }
        ));
    }

    #[test]
    fn test_bounds_validation() {
        let err = base()
            .bounds(array![0.0, 0.0], array![1.0])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DEError::BoundsMismatch {
                lower_len: 2,
                upper_len: 1
            }
        ));
        let err = base()
            .bounds(array![0.0, 2.0], array![1.0, 1.0])
            .build()
            .unwrap_err();
        assert!(matches!(err, DEError::InvalidBounds { index: 1, .. }));
        let err = base()
            .bounds(Array1::zeros(0), Array1::zeros(0))
            .build()
            .unwrap_err();
        assert!(err.is_bounds_error());
    }

    #[test]
    fn test_parameter_validation() {
        assert!(matches!(
            base().population_size(3).build().unwrap_err(),
            DEError::PopulationTooSmall {
                pop_size: 3,
                minimum: 4
            }
        ));
        assert!(matches!(
            base().workers(0).build().unwrap_err(),
            DEError::InvalidWorkerCount { workers: 0 }
        ));
        assert!(matches!(
            base().default_mutation(2.5, 0.5).build().unwrap_err(),
            DEError::InvalidMutationFactor { .. }
        ));
        assert!(matches!(
            base().default_mutation(0.5, -0.1).build().unwrap_err(),
            DEError::InvalidCrossoverRate { .. }
        ));
    }

    #[test]
    fn test_operator_population_minimum_is_checked() {
        let rand2 = || {
            DifferentialMutation::new(array![-1.0, -1.0], array![1.0, 1.0], 0.5, 0.9)
                .expect("valid parameters")
                .with_scheme(crate::mutation::DonorScheme::Rand2)
        };
        let err = base()
            .population_size(5)
            .mutation(rand2())
            .build()
            .unwrap_err();
        assert!(err.is_config_error());
        assert!(matches!(
            err,
            DEError::PopulationTooSmall {
                pop_size: 5,
                minimum: 6
            }
        ));
        assert!(base().population_size(6).mutation(rand2()).build().is_ok());
    }

    #[test]
    fn test_sampler_shape_is_checked() {
        let err = base()
            .population_size(10)
            .sampler(|_rng: &mut StdRng| Array2::<f64>::zeros((9, 2)))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DEError::InitialPopulationShape {
                expected: (10, 2),
                got: (9, 2)
            }
        ));
    }

    #[test]
    fn test_build_is_idle() {
        let controller = base().workers(3).population_size(12).build().expect("valid");
        assert_eq!(controller.worker_count(), 3);
        assert_eq!(controller.leader_id(), 2);
        assert_eq!(controller.running_workers(), 0);
        assert_eq!(controller.context().population_size(), 12);
        assert!(!controller.future().is_resolved());
    }

    #[test]
    fn test_default_population_scales_with_genes() {
        let controller = base().build().expect("valid");
        assert_eq!(controller.context().population_size(), 30);
    }
}
