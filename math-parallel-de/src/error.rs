//! Error types for the parallel Differential Evolution engine.
//!
//! Errors fall into three families: configuration errors raised by the builder
//! before any thread exists, lifecycle errors raised synchronously by worker
//! start/stop calls, and evaluation failures captured on a worker thread and
//! delivered through the run future as one [`AggregateFailure`].

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Error type returned by pluggable collaborators (objective, operators, observer).
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Shared form of a collaborator error, so that captured failures can be cloned
/// to every holder of the run future.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// Errors that can occur while configuring or running the optimizer.
#[derive(Debug, Clone, Error)]
pub enum DEError {
    /// Lower and upper bounds have different lengths.
    #[error("bounds mismatch: lower has {lower_len} elements, upper has {upper_len}")]
    BoundsMismatch {
        /// Length of the lower bounds array
        lower_len: usize,
        /// Length of the upper bounds array
        upper_len: usize,
    },

    /// A lower bound exceeds its corresponding upper bound.
    #[error("invalid bounds at index {index}: lower ({lower}) > upper ({upper})")]
    InvalidBounds {
        /// Index of the invalid bound pair
        index: usize,
        /// The lower bound value
        lower: f64,
        /// The upper bound value
        upper: f64,
    },

    /// Bounds were given with zero genes.
    #[error("bounds must describe at least one gene")]
    EmptyBounds,

    /// Population size is below what the engine or the mutation operator needs.
    #[error("population size ({pop_size}) must be >= {minimum}")]
    PopulationTooSmall {
        /// The invalid population size
        pop_size: usize,
        /// Smallest accepted population size
        minimum: usize,
    },

    /// Mutation factor is out of valid range (0, 2].
    #[error("invalid mutation factor: {factor} (must be in (0, 2])")]
    InvalidMutationFactor {
        /// The invalid mutation factor
        factor: f64,
    },

    /// Crossover rate is out of valid range [0, 1].
    #[error("invalid crossover rate: {rate} (must be in [0, 1])")]
    InvalidCrossoverRate {
        /// The invalid crossover rate
        rate: f64,
    },

    /// Worker count must be at least one.
    #[error("invalid worker count: {workers} (must be >= 1)")]
    InvalidWorkerCount {
        /// The invalid worker count
        workers: usize,
    },

    /// A required builder component was never supplied.
    #[error("missing required component: {component}")]
    MissingComponent {
        /// Name of the missing component
        component: &'static str,
    },

    /// The initial population sampler produced a matrix of the wrong shape.
    #[error("initial population has shape {got:?}, expected {expected:?}")]
    InitialPopulationShape {
        /// Expected (population size, genome size)
        expected: (usize, usize),
        /// Shape actually produced
        got: (usize, usize),
    },

    /// `start` was called on a worker that is already running.
    #[error("worker {worker_id} is already running")]
    AlreadyRunning {
        /// Id of the worker
        worker_id: usize,
    },

    /// `stop` was called on a worker that is not running.
    #[error("worker {worker_id} is not running")]
    NotRunning {
        /// Id of the worker
        worker_id: usize,
    },

    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn thread for worker {worker_id}: {reason}")]
    ThreadSpawn {
        /// Id of the worker
        worker_id: usize,
        /// Message reported by the OS
        reason: String,
    },

    /// A collaborator returned an error while a worker processed an individual.
    #[error("worker {worker_id} failed on individual {index}: {source}")]
    Evaluation {
        /// Id of the failing worker
        worker_id: usize,
        /// Population index being processed
        index: usize,
        /// Error returned by the collaborator
        source: SharedError,
    },

    /// The objective failed while the initial population was scored.
    #[error("initial evaluation of individual {index} failed: {source}")]
    InitialEvaluation {
        /// Population index being scored
        index: usize,
        /// Error returned by the objective
        source: SharedError,
    },

    /// A collaborator panicked on a worker thread.
    #[error("worker {worker_id} panicked: {message}")]
    WorkerPanicked {
        /// Id of the failing worker
        worker_id: usize,
        /// Panic payload rendered as text
        message: String,
    },

    /// The population observer failed.
    #[error("population observer failed at generation {generation}: {source}")]
    Observer {
        /// Generation being reported
        generation: usize,
        /// Error returned (or panic raised) by the observer
        source: SharedError,
    },

    /// The termination predicate panicked.
    #[error("termination predicate panicked at generation {generation}: {message}")]
    Termination {
        /// Generation being checked
        generation: usize,
        /// Panic payload rendered as text
        message: String,
    },

    /// Every failure captured during one generation.
    #[error(transparent)]
    Aggregate(#[from] AggregateFailure),

    /// The run was shut down before it reached a terminal generation.
    #[error("run cancelled before termination")]
    Cancelled,
}

/// A specialized `Result` type for DE operations.
pub type Result<T> = std::result::Result<T, DEError>;

impl DEError {
    /// Returns `true` if this is a bounds-related error.
    ///
    /// This includes `BoundsMismatch`, `InvalidBounds` and `EmptyBounds`.
    pub fn is_bounds_error(&self) -> bool {
        matches!(
            self,
            DEError::BoundsMismatch { .. } | DEError::InvalidBounds { .. } | DEError::EmptyBounds
        )
    }

    /// Returns `true` if this error was raised while validating configuration.
    pub fn is_config_error(&self) -> bool {
        self.is_bounds_error()
            || matches!(
                self,
                DEError::PopulationTooSmall { .. }
                    | DEError::InvalidMutationFactor { .. }
                    | DEError::InvalidCrossoverRate { .. }
                    | DEError::InvalidWorkerCount { .. }
                    | DEError::MissingComponent { .. }
                    | DEError::InitialPopulationShape { .. }
            )
    }

    /// Returns `true` if a worker was started or stopped in the wrong state.
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            DEError::AlreadyRunning { .. }
                | DEError::NotRunning { .. }
                | DEError::ThreadSpawn { .. }
        )
    }

    /// Returns `true` if a collaborator failed during a pass.
    ///
    /// Aggregates count as evaluation failures.
    pub fn is_evaluation_failure(&self) -> bool {
        matches!(
            self,
            DEError::Evaluation { .. }
                | DEError::InitialEvaluation { .. }
                | DEError::WorkerPanicked { .. }
                | DEError::Observer { .. }
                | DEError::Termination { .. }
                | DEError::Aggregate(_)
        )
    }

    /// The error a collaborator returned, when this failure wraps one.
    ///
    /// Unlike [`source`](StdError::source), the returned reference is the
    /// collaborator's own error, so it can be downcast to its concrete type.
    pub fn collaborator_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            DEError::Evaluation { source, .. }
            | DEError::InitialEvaluation { source, .. }
            | DEError::Observer { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// Worker id attached to a per-worker failure, if any.
    pub fn worker_id(&self) -> Option<usize> {
        match self {
            DEError::AlreadyRunning { worker_id }
            | DEError::NotRunning { worker_id }
            | DEError::ThreadSpawn { worker_id, .. }
            | DEError::Evaluation { worker_id, .. }
            | DEError::WorkerPanicked { worker_id, .. } => Some(*worker_id),
            _ => None,
        }
    }
}

/// All failures captured by the workers of one generation, merged into one error.
#[derive(Debug, Clone)]
pub struct AggregateFailure {
    failures: Vec<DEError>,
}

impl AggregateFailure {
    /// Wraps the captured failures, in the order they were collected.
    pub fn new(failures: Vec<DEError>) -> Self {
        Self { failures }
    }

    /// The inner failures: followers by worker id, then the leader, then a
    /// failure raised by the coordinator itself.
    pub fn failures(&self) -> &[DEError] {
        &self.failures
    }

    /// Number of inner failures.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether no failure was recorded.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} worker failure(s)", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, failure)?;
        }
        Ok(())
    }
}

impl StdError for AggregateFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.failures
            .first()
            .map(|failure| failure as &(dyn StdError + 'static))
    }
}

/// Renders a panic payload caught with `catch_unwind`.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
