//! Default mutation operator: classic DE donor construction followed by crossover
//! with the parent and a bound repair step.

use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use rand::Rng;
use rand::rngs::StdRng;

use crate::distinct_indices::distinct_indices;
use crate::error::{BoxError, DEError, Result};
use crate::traits::MutationOperator;

/// How the donor vector is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DonorScheme {
    /// `a + F * (b - c)`
    #[default]
    Rand1,
    /// `a + F * (b + c - d - e)`
    Rand2,
}

/// Crossover type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Crossover {
    /// Binomial (uniform) crossover
    #[default]
    Binomial,
    /// Exponential crossover
    Exponential,
}

/// Mutation setting: either a fixed factor or a uniform range (dithering).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mutation {
    /// Fixed mutation factor F in (0, 2].
    Factor(f64),
    /// Dithering range [min, max) with 0 <= min < max <= 2, resampled per individual.
    Range {
        /// Minimum mutation factor.
        min: f64,
        /// Maximum mutation factor.
        max: f64,
    },
}

impl Default for Mutation {
    fn default() -> Self {
        Mutation::Factor(0.5)
    }
}

impl Mutation {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Mutation::Factor(f) => f,
            Mutation::Range { min, max } => rng.random_range(min..max),
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            Mutation::Factor(f) if !(f > 0.0 && f <= 2.0) => {
                Err(DEError::InvalidMutationFactor { factor: f })
            }
            Mutation::Range { min, max } if !(min >= 0.0 && min < max) => {
                Err(DEError::InvalidMutationFactor { factor: min })
            }
            Mutation::Range { max, .. } if max > 2.0 => {
                Err(DEError::InvalidMutationFactor { factor: max })
            }
            _ => Ok(()),
        }
    }
}

/// What happens to a donor gene that leaves its bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoundHandling {
    /// Redraw the gene uniformly inside its bounds.
    #[default]
    Resample,
    /// Clamp the gene onto the violated bound.
    Clip,
}

/// rand/1 or rand/2 mutation with binomial or exponential crossover.
///
/// # Example
///
/// ```rust
/// use math_audio_parallel_de::{Crossover, DifferentialMutation, DonorScheme};
/// use ndarray::array;
///
/// let mutation = DifferentialMutation::new(array![-1.0, -1.0], array![1.0, 1.0], 0.7, 0.9)
///     .expect("valid parameters")
///     .with_scheme(DonorScheme::Rand2)
///     .with_crossover(Crossover::Exponential);
/// assert_eq!(mutation.scheme(), DonorScheme::Rand2);
/// ```
#[derive(Debug, Clone)]
pub struct DifferentialMutation {
    lower: Array1<f64>,
    upper: Array1<f64>,
    mutation: Mutation,
    crossover_probability: f64,
    scheme: DonorScheme,
    crossover: Crossover,
    bound_handling: BoundHandling,
}

impl DifferentialMutation {
    /// rand/1/bin with mutation factor `force` and crossover rate `crossover_probability`.
    ///
    /// # Errors
    ///
    /// `InvalidMutationFactor` unless `force` is in (0, 2], `InvalidCrossoverRate`
    /// unless `crossover_probability` is in [0, 1], and the bounds errors of the builder.
    pub fn new(
        lower: Array1<f64>,
        upper: Array1<f64>,
        force: f64,
        crossover_probability: f64,
    ) -> Result<Self> {
        crate::builder::validate_bounds(&lower, &upper)?;
        let mutation = Mutation::Factor(force);
        mutation.validate()?;
        if !(0.0..=1.0).contains(&crossover_probability) {
            return Err(DEError::InvalidCrossoverRate {
                rate: crossover_probability,
            });
        }
        Ok(Self {
            lower,
            upper,
            mutation,
            crossover_probability,
            scheme: DonorScheme::default(),
            crossover: Crossover::default(),
            bound_handling: BoundHandling::default(),
        })
    }

    /// Replaces the mutation factor setting.
    ///
    /// # Errors
    ///
    /// `InvalidMutationFactor` if the factor or range is outside (0, 2].
    pub fn with_mutation(mut self, mutation: Mutation) -> Result<Self> {
        mutation.validate()?;
        self.mutation = mutation;
        Ok(self)
    }

    /// Sets the donor scheme. rand/2 needs a population of at least 6, which
    /// the builder checks.
    pub fn with_scheme(mut self, scheme: DonorScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Sets the crossover type.
    pub fn with_crossover(mut self, crossover: Crossover) -> Self {
        self.crossover = crossover;
        self
    }

    /// Sets the bound repair policy.
    pub fn with_bound_handling(mut self, bound_handling: BoundHandling) -> Self {
        self.bound_handling = bound_handling;
        self
    }

    /// Donor scheme in use.
    pub fn scheme(&self) -> DonorScheme {
        self.scheme
    }

    /// Crossover rate in use.
    pub fn crossover_probability(&self) -> f64 {
        self.crossover_probability
    }

}

impl MutationOperator for DifferentialMutation {
    /// 4 for rand/1 (target plus three donors), 6 for rand/2.
    fn minimum_population(&self) -> usize {
        match self.scheme {
            DonorScheme::Rand1 => 4,
            DonorScheme::Rand2 => 6,
        }
    }

    fn mutate(
        &self,
        index: usize,
        population: ArrayView2<'_, f64>,
        candidate: &mut Array1<f64>,
        rng: &mut StdRng,
    ) -> std::result::Result<(), BoxError> {
        let npop = population.nrows();
        if npop < self.minimum_population() {
            return Err(format!(
                "{:?} needs at least {} individuals, population has {}",
                self.scheme,
                self.minimum_population(),
                npop
            )
            .into());
        }

        let f = self.mutation.sample(rng);
        match self.scheme {
            DonorScheme::Rand1 => {
                let [r0, r1, r2] = distinct_indices(index, npop, rng);
                Zip::from(&mut *candidate)
                    .and(population.row(r0))
                    .and(population.row(r1))
                    .and(population.row(r2))
                    .for_each(|t, &x0, &x1, &x2| *t = x0 + f * (x1 - x2));
            }
            DonorScheme::Rand2 => {
                let [r0, r1, r2, r3, r4] = distinct_indices(index, npop, rng);
                Zip::from(&mut *candidate)
                    .and(population.row(r0))
                    .and(population.row(r1))
                    .and(population.row(r2))
                    .and(population.row(r3))
                    .and(population.row(r4))
                    .for_each(|t, &x0, &x1, &x2, &x3, &x4| {
                        *t = x0 + f * (x1 + x2 - x3 - x4)
                    });
            }
        }

        let parent = population.row(index);
        match self.crossover {
            Crossover::Binomial => {
                binomial_crossover(candidate, parent, self.crossover_probability, rng)
            }
            Crossover::Exponential => {
                exponential_crossover(candidate, parent, self.crossover_probability, rng)
            }
        }

        for j in 0..candidate.len() {
            let (lo, hi) = (self.lower[j], self.upper[j]);
            let x = candidate[j];
            if x < lo || x > hi || x.is_nan() {
                candidate[j] = match self.bound_handling {
                    BoundHandling::Resample => lo + rng.random::<f64>() * (hi - lo),
                    BoundHandling::Clip if x < lo => lo,
                    BoundHandling::Clip if x > hi => hi,
                    BoundHandling::Clip => parent[j],
                };
            }
        }
        Ok(())
    }
}

/// Keeps donor genes with probability `cr` (always at least one), the parent's otherwise.
fn binomial_crossover<R: Rng + ?Sized>(
    candidate: &mut Array1<f64>,
    parent: ArrayView1<'_, f64>,
    cr: f64,
    rng: &mut R,
) {
    let n = candidate.len();
    let jrand = rng.random_range(0..n);
    for j in 0..n {
        if j != jrand && rng.random::<f64>() >= cr {
            candidate[j] = parent[j];
        }
    }
}

/// Keeps a contiguous (wrapping) run of donor genes, the parent's elsewhere.
fn exponential_crossover<R: Rng + ?Sized>(
    candidate: &mut Array1<f64>,
    parent: ArrayView1<'_, f64>,
    cr: f64,
    rng: &mut R,
) {
    let n = candidate.len();
    let start = rng.random_range(0..n);
    let mut run = 1usize;
    // ensure at least one parameter from the donor
    while run < n && rng.random::<f64>() < cr {
        run += 1;
    }
    for offset in run..n {
        let j = (start + offset) % n;
        candidate[j] = parent[j];
    }
}
