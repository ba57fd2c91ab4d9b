//! Built-in termination predicates.

use crate::population::GenerationView;
use crate::traits::TerminationPredicate;

/// Stops once `max` generations have completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationLimit(pub usize);

impl TerminationPredicate for GenerationLimit {
    fn should_terminate(&mut self, view: &GenerationView<'_>) -> bool {
        view.generation >= self.0
    }
}

/// Stops when the best fitness has not moved by more than `threshold` for
/// `max_streak` consecutive generations.
#[derive(Debug, Clone)]
pub struct StagnationStreak {
    max_streak: usize,
    threshold: f64,
    last_best: f64,
    streak: usize,
}

impl StagnationStreak {
    /// New predicate with an empty streak.
    pub fn new(max_streak: usize, threshold: f64) -> Self {
        Self {
            max_streak,
            threshold,
            last_best: f64::MIN,
            streak: 0,
        }
    }

    /// Length of the current run of stagnating generations.
    pub fn streak(&self) -> usize {
        self.streak
    }
}

impl TerminationPredicate for StagnationStreak {
    fn should_terminate(&mut self, view: &GenerationView<'_>) -> bool {
        let best = view.best_fitness();
        if (best - self.last_best).abs() > self.threshold {
            self.last_best = best;
            self.streak = 0;
        } else {
            self.streak += 1;
        }
        self.streak >= self.max_streak
    }
}
