use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use ndarray::{Array1, Array2, ArrayView2, array};
use rand::rngs::StdRng;

use crate::error::{BoxError, DEError};
use crate::population::GenerationView;
use crate::selection::{GreedySelection, TieBreak};
use crate::{DifferentialEvolutionBuilder, GenerationResult};

fn sphere(x: &Array1<f64>) -> f64 {
    x.iter().map(|&xi| xi * xi).sum()
}

fn sphere_builder(workers: usize) -> DifferentialEvolutionBuilder {
    DifferentialEvolutionBuilder::new()
        .objective(sphere)
        .bounds(array![-5.0, -5.0, -5.0], array![5.0, 5.0, 5.0])
        .population_size(24)
        .workers(workers)
        .seed(11)
}

fn run_to_end(builder: DifferentialEvolutionBuilder) -> crate::Result<GenerationResult> {
    let controller = builder.build()?;
    let outcome = controller.run()?.wait();
    assert_eq!(controller.running_workers(), 0);
    outcome
}

#[cfg(test)]
mod generation_tests {
    use super::*;

    #[test]
    fn test_best_fitness_never_increases() {
        let history = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&history);
        let result = run_to_end(
            sphere_builder(3)
                .max_generations(60)
                .observer(move |view: &GenerationView<'_>| -> Result<(), BoxError> {
                    recorder
                        .lock()
                        .expect("history lock")
                        .push((view.generation, view.best_fitness()));
                    Ok(())
                }),
        )
        .expect("run succeeds");

        let history = history.lock().expect("history lock");
        assert_eq!(history.len(), 60);
        for (k, &(generation, _)) in history.iter().enumerate() {
            assert_eq!(generation, k + 1);
        }
        for pair in history.windows(2) {
            assert!(
                pair[1].1 <= pair[0].1,
                "best fitness went up: {:?} -> {:?}",
                pair[0],
                pair[1]
            );
        }
        assert_eq!(result.generation, 60);
        assert_eq!(result.best_fitness(), history[59].1);
    }

    #[test]
    fn test_reduced_best_is_population_minimum() {
        let checked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&checked);
        run_to_end(
            sphere_builder(4)
                .max_generations(25)
                .observer(move |view: &GenerationView<'_>| -> Result<(), BoxError> {
                    let min = view.fitness.iter().cloned().fold(f64::INFINITY, f64::min);
                    if view.best_fitness() != min {
                        return Err(format!(
                            "generation {}: best {} but minimum {}",
                            view.generation,
                            view.best_fitness(),
                            min
                        )
                        .into());
                    }
                    counter.fetch_add(1, Ordering::AcqRel);
                    Ok(())
                }),
        )
        .expect("reduction always finds the minimum");
        assert_eq!(checked.load(Ordering::Acquire), 25);
    }

    fn flat_run(tie_break: TieBreak) -> (Array2<f64>, GenerationResult) {
        let grid = Array2::from_shape_fn((12, 2), |(i, j)| i as f64 * 0.1 - j as f64 * 0.2);
        let initial = grid.clone();
        let result = run_to_end(
            DifferentialEvolutionBuilder::new()
                .objective(|_x: &Array1<f64>| 1.0)
                .bounds(array![-3.0, -3.0], array![3.0, 3.0])
                .population_size(12)
                .sampler(move |_rng: &mut StdRng| grid.clone())
                .selection(GreedySelection::new(tie_break))
                .workers(3)
                .max_generations(5)
                .seed(8),
        )
        .expect("run succeeds");
        (initial, result)
    }

    #[test]
    fn test_equal_fitness_keeps_existing_individuals() {
        let (initial, result) = flat_run(TieBreak::FavorExisting);
        assert_eq!(result.population, initial);
        assert!(result.population_fitness.iter().all(|&f| f == 1.0));
    }

    #[test]
    fn test_equal_fitness_can_favor_candidates() {
        let (initial, result) = flat_run(TieBreak::FavorCandidate);
        assert_ne!(result.population, initial);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let a = run_to_end(sphere_builder(3).max_generations(40)).expect("run succeeds");
        let b = run_to_end(sphere_builder(3).max_generations(40)).expect("run succeeds");
        assert_eq!(a.population, b.population);
        assert_eq!(a.population_fitness, b.population_fitness);
        assert_eq!(a.best_index, b.best_index);
    }

    #[test]
    fn test_more_workers_than_individuals() {
        let result = run_to_end(
            DifferentialEvolutionBuilder::new()
                .objective(sphere)
                .bounds(array![-1.0], array![1.0])
                .population_size(4)
                .workers(7)
                .max_generations(10)
                .seed(5),
        )
        .expect("empty partitions are harmless");
        assert_eq!(result.generation, 10);
        assert_eq!(result.population.nrows(), 4);
    }

    #[test]
    fn test_closure_termination_sees_each_generation() {
        let result = run_to_end(
            sphere_builder(2).termination(|view: &GenerationView<'_>| view.best_fitness() < 1e-3),
        )
        .expect("run succeeds");
        assert!(result.best_fitness() < 1e-3);
        assert!(result.generation >= 1);
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    fn never(_view: &GenerationView<'_>) -> bool {
        false
    }

    #[test]
    fn test_run_is_idempotent_after_completion() {
        let generations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&generations);
        let controller = sphere_builder(2)
            .max_generations(15)
            .observer(move |_view: &GenerationView<'_>| -> Result<(), BoxError> {
                counter.fetch_add(1, Ordering::AcqRel);
                Ok(())
            })
            .build()
            .expect("valid configuration");

        let first = controller.run().expect("start").wait().expect("run succeeds");
        let second = controller
            .run()
            .expect("resolved run returns its future")
            .wait()
            .expect("same outcome");
        assert_eq!(first.generation, second.generation);
        assert_eq!(first.population, second.population);
        assert_eq!(generations.load(Ordering::Acquire), 15);
        assert_eq!(controller.running_workers(), 0);
    }

    #[test]
    fn test_second_run_while_running_is_rejected() {
        let controller = sphere_builder(2)
            .termination(never)
            .build()
            .expect("valid configuration");
        let future = controller.run().expect("start");
        assert!(crate::live_worker_count() >= 2);
        assert!(matches!(
            controller.run(),
            Err(DEError::AlreadyRunning { .. })
        ));
        controller.shutdown();
        assert!(matches!(future.wait(), Err(DEError::Cancelled)));
        assert_eq!(controller.running_workers(), 0);
    }

    #[test]
    fn test_shutdown_cancels_single_worker_run() {
        let controller = sphere_builder(1)
            .termination(never)
            .build()
            .expect("valid configuration");
        let future = controller.run().expect("start");
        assert!(future.wait_timeout(Duration::from_millis(20)).is_none());
        controller.shutdown();
        controller.shutdown();
        assert!(matches!(future.try_get(), Some(Err(DEError::Cancelled))));
    }

    #[test]
    fn test_drop_joins_workers() {
        let controller = sphere_builder(3)
            .termination(never)
            .build()
            .expect("valid configuration");
        let future = controller.run().expect("start");
        drop(controller);
        assert!(matches!(future.wait(), Err(DEError::Cancelled)));
    }

    #[test]
    fn test_worker_lifecycle_through_controller() {
        let controller = sphere_builder(2)
            .termination(never)
            .build()
            .expect("valid configuration");
        let leader = controller
            .worker(controller.leader_id())
            .expect("leader exists");
        assert!(leader.is_leader());
        assert!(matches!(
            leader.stop(),
            Err(DEError::NotRunning { worker_id: 1 })
        ));
        controller.run().expect("start");
        assert!(matches!(
            leader.start(),
            Err(DEError::AlreadyRunning { worker_id: 1 })
        ));
        controller.shutdown();
    }

    #[test]
    fn test_racing_runs_leave_the_started_run_alone() {
        for _ in 0..50 {
            let controller = sphere_builder(4)
                .termination(never)
                .build()
                .expect("valid configuration");
            let barrier = Barrier::new(2);
            let outcomes: Vec<_> = thread::scope(|s| {
                let handles: Vec<_> = (0..2)
                    .map(|_| {
                        s.spawn(|| {
                            barrier.wait();
                            controller.run()
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().expect("run thread panicked"))
                    .collect()
            });

            assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
            assert!(
                outcomes
                    .iter()
                    .any(|o| matches!(o, Err(DEError::AlreadyRunning { .. })))
            );
            assert_eq!(controller.running_workers(), 4);
            assert!(
                controller
                    .future()
                    .wait_timeout(Duration::from_millis(5))
                    .is_none()
            );
            controller.shutdown();
            assert!(matches!(
                controller.future().try_get(),
                Some(Err(DEError::Cancelled))
            ));
        }
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[test]
    fn test_leader_failure_is_aggregated() {
        const WORKERS: usize = 3;
        fn leader_owned_fails(
            index: usize,
            population: ArrayView2<'_, f64>,
            candidate: &mut Array1<f64>,
            _rng: &mut StdRng,
        ) -> Result<(), BoxError> {
            if index % WORKERS == WORKERS - 1 {
                return Err(format!("leader-owned index {index}").into());
            }
            candidate.assign(&population.row(index));
            Ok(())
        }
        let workers = WORKERS;
        let err = run_to_end(
            sphere_builder(workers)
                .max_generations(10)
                .mutation(leader_owned_fails),
        )
        .unwrap_err();
        match err {
            DEError::Aggregate(aggregate) => {
                assert_eq!(aggregate.len(), 1);
                assert_eq!(aggregate.failures()[0].worker_id(), Some(workers - 1));
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[test]
    fn test_failures_are_ordered_followers_then_leader() {
        const WORKERS: usize = 3;
        fn all_but_middle_fail(
            index: usize,
            population: ArrayView2<'_, f64>,
            candidate: &mut Array1<f64>,
            _rng: &mut StdRng,
        ) -> Result<(), BoxError> {
            if index % WORKERS != 1 {
                return Err(format!("index {index} rejected").into());
            }
            candidate.assign(&population.row(index));
            Ok(())
        }
        let err = run_to_end(
            sphere_builder(WORKERS)
                .max_generations(10)
                .mutation(all_but_middle_fail),
        )
        .unwrap_err();
        let DEError::Aggregate(aggregate) = err else {
            panic!("expected aggregate, got {err:?}");
        };
        let ids: Vec<_> = aggregate.failures().iter().map(DEError::worker_id).collect();
        assert_eq!(ids, vec![Some(0), Some(WORKERS - 1)]);
    }

    #[test]
    fn test_termination_panic_is_aggregated() {
        let err = run_to_end(sphere_builder(2).termination(|view: &GenerationView<'_>| {
            if view.generation == 3 {
                panic!("predicate blew up");
            }
            false
        }))
        .unwrap_err();
        match err {
            DEError::Aggregate(aggregate) => {
                assert_eq!(aggregate.len(), 1);
                assert!(matches!(
                    &aggregate.failures()[0],
                    DEError::Termination { generation: 3, message } if message.contains("blew up")
                ));
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[test]
    fn test_objective_panic_is_captured() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let err = run_to_end(
            sphere_builder(2)
                .max_generations(50)
                .objective(move |x: &Array1<f64>| {
                    // 24 initial evaluations, then a few generations
                    if counter.fetch_add(1, Ordering::AcqRel) == 80 {
                        panic!("objective exploded");
                    }
                    sphere(x)
                }),
        )
        .unwrap_err();
        match err {
            DEError::Aggregate(aggregate) => {
                assert_eq!(aggregate.len(), 1);
                assert!(matches!(
                    &aggregate.failures()[0],
                    DEError::WorkerPanicked { message, .. } if message.contains("exploded")
                ));
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
    }
}
