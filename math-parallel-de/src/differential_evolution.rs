use ndarray::Array1;

use crate::builder::{
    DEFAULT_CROSSOVER_PROBABILITY, DEFAULT_MUTATION_FORCE, DifferentialEvolutionBuilder,
};
use crate::error::Result;
use crate::population::GenerationResult;

/// Plain configuration for [`differential_evolution`].
#[derive(Debug, Clone)]
pub struct DEConfig {
    /// Maximum number of generations.
    pub maxiter: usize,
    /// Population size; `None` means 15 per gene.
    pub popsize: Option<usize>,
    /// Mutation factor F in (0, 2].
    pub mutation: f64,
    /// Crossover probability CR in [0, 1].
    pub recombination: f64,
    /// Number of worker threads.
    pub workers: usize,
    /// Optional random seed for reproducibility.
    pub seed: Option<u64>,
    /// Use Latin Hypercube Sampling instead of uniform sampling.
    pub latin_hypercube: bool,
}

impl Default for DEConfig {
    fn default() -> Self {
        Self {
            maxiter: 1000,
            popsize: None,
            mutation: DEFAULT_MUTATION_FORCE,
            recombination: DEFAULT_CROSSOVER_PROBABILITY,
            workers: 1,
            seed: None,
            latin_hypercube: false,
        }
    }
}

/// Runs Differential Evolution on `func` and blocks until it terminates.
///
/// A convenience entry point: builds a controller from `config`, runs it to
/// `config.maxiter` generations and shuts it down.
///
/// # Arguments
///
/// * `func` - The objective function to minimize, mapping `&Array1<f64>` to `f64`
/// * `bounds` - Vector of (lower, upper) bound pairs for each dimension
/// * `config` - Run configuration
///
/// # Errors
///
/// Any configuration error, or the aggregated failure of the run.
///
/// # Example
///
/// ```rust
/// use math_audio_parallel_de::{differential_evolution, DEConfig};
///
/// let config = DEConfig { maxiter: 150, seed: Some(7), workers: 2, ..DEConfig::default() };
/// let result = differential_evolution(
///     |x| x[0].powi(2) + x[1].powi(2),
///     &[(-5.0, 5.0), (-5.0, 5.0)],
///     config,
/// )
/// .expect("optimization failed");
///
/// assert!(result.best_fitness() < 0.01);
/// ```
pub fn differential_evolution<F>(
    func: F,
    bounds: &[(f64, f64)],
    config: DEConfig,
) -> Result<GenerationResult>
where
    F: Fn(&Array1<f64>) -> f64 + Send + Sync + 'static,
{
    let lower: Array1<f64> = bounds.iter().map(|&(lo, _)| lo).collect();
    let upper: Array1<f64> = bounds.iter().map(|&(_, hi)| hi).collect();

    let mut builder = DifferentialEvolutionBuilder::new()
        .objective(func)
        .bounds(lower, upper)
        .default_mutation(config.mutation, config.recombination)
        .max_generations(config.maxiter)
        .workers(config.workers);
    if let Some(popsize) = config.popsize {
        builder = builder.population_size(popsize);
    }
    if let Some(seed) = config.seed {
        builder = builder.seed(seed);
    }
    if config.latin_hypercube {
        builder = builder.latin_hypercube_sampling();
    }

    let controller = builder.build()?;
    let outcome = controller.run()?.wait();
    controller.shutdown();
    outcome
}
