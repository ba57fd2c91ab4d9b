use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::error::BoxError;
use crate::population::TrialSlot;
use crate::traits::SelectionOperator;

/// Which individual survives when candidate and parent have equal fitness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// The parent stays.
    #[default]
    FavorExisting,
    /// The candidate replaces the parent.
    FavorCandidate,
}

/// One-to-one greedy selection: the fitter of candidate and parent survives.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySelection {
    tie_break: TieBreak,
}

impl GreedySelection {
    /// Greedy selection with the given tie-break rule.
    pub fn new(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }

    /// Tie-break rule in use.
    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    fn candidate_wins(&self, candidate_fitness: f64, current_fitness: f64) -> bool {
        match self.tie_break {
            TieBreak::FavorExisting => candidate_fitness < current_fitness,
            TieBreak::FavorCandidate => candidate_fitness <= current_fitness,
        }
    }
}

impl SelectionOperator for GreedySelection {
    fn select(
        &self,
        index: usize,
        candidate_fitness: f64,
        candidate: &Array1<f64>,
        current_fitness: ArrayView1<'_, f64>,
        current: ArrayView2<'_, f64>,
        mut slot: TrialSlot<'_>,
    ) -> Result<(), BoxError> {
        if self.candidate_wins(candidate_fitness, current_fitness[index]) {
            slot.write(candidate_fitness, candidate.view());
        } else {
            slot.write(current_fitness[index], current.row(index));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    fn run(selection: GreedySelection, candidate_fitness: f64) -> (f64, Array1<f64>) {
        let current = array![[1.0, 1.0], [2.0, 2.0]];
        let current_fitness = array![5.0, 3.0];
        let candidate = array![9.0, 9.0];
        let mut out_fitness = 0.0;
        let mut out_genome = Array2::<f64>::zeros((1, 2));
        let slot = TrialSlot {
            fitness: &mut out_fitness,
            genome: out_genome.row_mut(0),
        };
        selection
            .select(
                1,
                candidate_fitness,
                &candidate,
                current_fitness.view(),
                current.view(),
                slot,
            )
            .expect("selection never fails");
        (out_fitness, out_genome.row(0).to_owned())
    }

    #[test]
    fn test_better_candidate_replaces_parent() {
        let (fitness, genome) = run(GreedySelection::default(), 1.0);
        assert_eq!(fitness, 1.0);
        assert_eq!(genome, array![9.0, 9.0]);
    }

    #[test]
    fn test_worse_candidate_is_discarded() {
        let (fitness, genome) = run(GreedySelection::default(), 4.0);
        assert_eq!(fitness, 3.0);
        assert_eq!(genome, array![2.0, 2.0]);
    }

    #[test]
    fn test_existing_wins_ties_by_default() {
        let (fitness, genome) = run(GreedySelection::default(), 3.0);
        assert_eq!(fitness, 3.0);
        assert_eq!(genome, array![2.0, 2.0]);
    }

    #[test]
    fn test_candidate_wins_ties_when_asked() {
        let (fitness, genome) = run(GreedySelection::new(TieBreak::FavorCandidate), 3.0);
        assert_eq!(fitness, 3.0);
        assert_eq!(genome, array![9.0, 9.0]);
    }
}
