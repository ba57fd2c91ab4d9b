//! Initial population samplers.

use ndarray::{Array1, Array2};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::traits::PopulationSampler;

/// Every gene drawn uniformly inside its bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformSampler;

impl PopulationSampler for UniformSampler {
    fn sample(
        &mut self,
        population_size: usize,
        lower: &Array1<f64>,
        upper: &Array1<f64>,
        rng: &mut StdRng,
    ) -> Array2<f64> {
        let n = lower.len();
        let mut pop = Array2::<f64>::zeros((population_size, n));
        for i in 0..population_size {
            for j in 0..n {
                let u: f64 = rng.random::<f64>();
                pop[(i, j)] = lower[j] + u * (upper[j] - lower[j]);
            }
        }
        pop
    }
}

/// Latin Hypercube Sampling: each gene's range is cut into `population_size`
/// strata and every stratum receives exactly one individual.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatinHypercubeSampler;

impl PopulationSampler for LatinHypercubeSampler {
    fn sample(
        &mut self,
        population_size: usize,
        lower: &Array1<f64>,
        upper: &Array1<f64>,
        rng: &mut StdRng,
    ) -> Array2<f64> {
        let n = lower.len();
        let mut samples = Array2::<f64>::zeros((population_size, n));
        let mut strata = Vec::with_capacity(population_size);
        for j in 0..n {
            strata.clear();
            for k in 0..population_size {
                let u: f64 = rng.random::<f64>();
                strata.push(((k as f64) + u) / (population_size as f64));
            }
            strata.shuffle(rng);
            for (i, &s) in strata.iter().enumerate() {
                samples[(i, j)] = lower[j] + s * (upper[j] - lower[j]);
            }
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn test_uniform_within_bounds() {
        let lower = array![-5.0, 0.0];
        let upper = array![5.0, 0.0];
        let mut rng = StdRng::seed_from_u64(1);
        let pop = UniformSampler.sample(50, &lower, &upper, &mut rng);
        assert_eq!(pop.dim(), (50, 2));
        for row in pop.rows() {
            assert!(row[0] >= -5.0 && row[0] < 5.0);
            assert_eq!(row[1], 0.0);
        }
    }

    #[test]
    fn test_latin_hypercube_hits_every_stratum() {
        let lower = array![0.0, -1.0];
        let upper = array![1.0, 1.0];
        let npop = 20;
        let mut rng = StdRng::seed_from_u64(9);
        let pop = LatinHypercubeSampler.sample(npop, &lower, &upper, &mut rng);
        for j in 0..2 {
            let mut hits = vec![0usize; npop];
            for i in 0..npop {
                let unit = (pop[(i, j)] - lower[j]) / (upper[j] - lower[j]);
                let stratum = ((unit * npop as f64) as usize).min(npop - 1);
                hits[stratum] += 1;
            }
            assert!(hits.iter().all(|&h| h == 1), "gene {j}: {hits:?}");
        }
    }
}
