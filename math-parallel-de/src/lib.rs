//! Parallel Differential Evolution engine.
//!
//! A population-based stochastic optimizer whose generations are split across a
//! fixed set of dedicated worker threads. Each generation every worker mutates,
//! evaluates and selects the individuals of its round-robin partition into a
//! trial buffer; the leader worker then waits for the others, swaps the current
//! and trial buffers, reduces the best individual and decides whether to run
//! another generation.
//!
//! # Features
//!
//! - Fixed worker count, static round-robin partitions, spin-wait barriers
//! - Double-buffered population, swapped by tag flip
//! - All-or-nothing failure handling: every captured failure of a generation
//!   is delivered as one aggregated error
//! - rand/1 and rand/2 mutation, binomial and exponential crossover
//! - Uniform and Latin Hypercube initialization
//! - Generation-limit and stagnation termination, closures for everything else
//!
//! # Example
//!
//! ```rust
//! use math_audio_parallel_de::DifferentialEvolutionBuilder;
//! use ndarray::{array, Array1};
//!
//! // Minimize the sphere function: f(x) = sum(x_i^2)
//! let controller = DifferentialEvolutionBuilder::new()
//!     .objective(|x: &Array1<f64>| x.iter().map(|&xi| xi * xi).sum::<f64>())
//!     .bounds(array![-5.0, -5.0], array![5.0, 5.0])
//!     .population_size(30)
//!     .workers(2)
//!     .max_generations(150)
//!     .seed(42)
//!     .build()
//!     .expect("invalid config");
//!
//! let result = controller
//!     .run()
//!     .expect("workers should start")
//!     .wait()
//!     .expect("optimization should succeed");
//!
//! assert!(result.best_fitness() < 1e-4);
//! ```
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod error;
pub use error::{AggregateFailure, BoxError, DEError, Result, SharedError};

/// Fluent configuration and validation of a run.
pub mod builder;
/// Problem definition shared by all workers.
pub mod context;
/// Leader-run generation barrier: reduction, swap, termination.
pub mod coordinator;
/// Owner of the worker threads and the run future.
pub mod controller;
/// Differential mutation and crossover operators.
pub mod mutation;
/// Round-robin partitioning of the population.
pub mod partition;
/// Double-buffered population storage and generation snapshots.
pub mod population;
/// One-shot future carrying the outcome of a run.
pub mod run_future;
/// Initial population samplers.
pub mod sampling;
/// Greedy selection.
pub mod selection;
/// Per-worker generation step.
pub mod step_executor;
/// Termination predicates.
pub mod termination;
/// Collaborator traits.
pub mod traits;
/// Worker threads and the pass loop.
pub mod worker;

/// Convenience entry point with a plain configuration struct.
pub mod differential_evolution;

mod distinct_indices;
mod parallel_eval;
mod spin;

/// Cross-module behaviour tests.
#[cfg(test)]
mod de_tests;

pub use builder::DifferentialEvolutionBuilder;
pub use context::ProblemContext;
pub use controller::RunController;
pub use coordinator::GenerationBarrierCoordinator;
pub use differential_evolution::{DEConfig, differential_evolution};
pub use mutation::{BoundHandling, Crossover, DifferentialMutation, DonorScheme, Mutation};
pub use partition::partition;
pub use population::{GenerationResult, GenerationView, Individual, PopulationBuffers, TrialSlot};
pub use run_future::RunFuture;
pub use sampling::{LatinHypercubeSampler, UniformSampler};
pub use selection::{GreedySelection, TieBreak};
pub use step_executor::{GenerationStepExecutor, PassExecutor, PassScratch};
pub use termination::{GenerationLimit, StagnationStreak};
pub use traits::{
    FallibleObjective, MutationOperator, ObjectiveFunction, PopulationObserver,
    PopulationSampler, SelectionOperator, TerminationPredicate,
};
pub use worker::{
    PassCompletionHandler, PassDecision, WorkerState, WorkerThread, live_worker_count,
};
