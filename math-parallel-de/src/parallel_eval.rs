use std::sync::Arc;

use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::error::{DEError, Result};
use crate::traits::ObjectiveFunction;

/// Scores every row of `population`, on the rayon pool when `parallel` is set.
///
/// Runs once, before any worker thread exists. The first failing index (in
/// population order) is reported.
pub(crate) fn evaluate_population(
    population: &Array2<f64>,
    objective: &dyn ObjectiveFunction,
    parallel: bool,
) -> Result<Array1<f64>> {
    let npop = population.nrows();
    let score = |i: usize| {
        let individual = population.row(i).to_owned();
        objective
            .evaluate(&individual)
            .map_err(|source| DEError::InitialEvaluation {
                index: i,
                source: Arc::from(source),
            })
    };

    let scores = if !parallel || npop < 4 {
        (0..npop).map(score).collect::<Result<Vec<f64>>>()?
    } else {
        (0..npop)
            .into_par_iter()
            .map(score)
            .collect::<Vec<Result<f64>>>()
            .into_iter()
            .collect::<Result<Vec<f64>>>()?
    };
    Ok(Array1::from_vec(scores))
}
