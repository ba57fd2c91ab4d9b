//! End-to-end convergence runs on classic test functions.

use approx::assert_abs_diff_eq;
use math_audio_parallel_de::{DifferentialEvolutionBuilder, GenerationView};
use ndarray::{Array1, array};

fn rosenbrock(x: &Array1<f64>) -> f64 {
    let (a, b) = (1.0, 100.0);
    (a - x[0]).powi(2) + b * (x[1] - x[0] * x[0]).powi(2)
}

#[test]
fn test_linear_sum_reaches_lower_corner() {
    let _ = env_logger::builder().is_test(true).try_init();

    let controller = DifferentialEvolutionBuilder::new()
        .objective(|x: &Array1<f64>| x.sum())
        .bounds(array![-10.0, -10.0], array![10.0, 10.0])
        .population_size(200)
        .default_mutation(0.5, 0.9)
        .workers(1)
        .max_generations(1000)
        .seed(1)
        .build()
        .expect("valid configuration");

    let result = controller
        .run()
        .expect("workers start")
        .wait()
        .expect("run succeeds");

    println!(
        "sum: f={:.6e} x={:?} after {} generations",
        result.best_fitness(),
        result.best_genome(),
        result.generation
    );
    assert_eq!(result.generation, 1000);
    assert_abs_diff_eq!(result.best_fitness(), -20.0, epsilon = 1e-3);
}

#[test]
fn test_rosenbrock_with_all_workers_and_stagnation() {
    let _ = env_logger::builder().is_test(true).try_init();

    let controller = DifferentialEvolutionBuilder::new()
        .objective(rosenbrock)
        .bounds(array![-5.0, -5.0], array![5.0, 5.0])
        .population_size(300)
        .all_workers()
        .stagnation(1000, 1e-6)
        .seed(7)
        .build()
        .expect("valid configuration");
    assert!(controller.worker_count() >= 1);

    let result = controller
        .run()
        .expect("workers start")
        .wait()
        .expect("run succeeds");

    println!(
        "rosenbrock: f={:.6e} x={:?} after {} generations on {} workers",
        result.best_fitness(),
        result.best_genome(),
        result.generation,
        controller.worker_count()
    );
    assert!(result.generation >= 1000);
    assert_abs_diff_eq!(result.best_fitness(), 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(result.best_genome()[0], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(result.best_genome()[1], 1.0, epsilon = 1e-6);
    assert_eq!(controller.running_workers(), 0);
}

#[test]
fn test_parallel_and_serial_agree_on_optimum() {
    let run = |workers: usize| {
        let controller = DifferentialEvolutionBuilder::new()
            .objective(|x: &Array1<f64>| (x[0] - 1.5).powi(2) + (x[1] + 0.5).powi(2))
            .bounds(array![-4.0, -4.0], array![4.0, 4.0])
            .population_size(40)
            .workers(workers)
            .termination(|view: &GenerationView<'_>| {
                view.best_fitness() < 1e-10 || view.generation >= 2000
            })
            .seed(3)
            .build()
            .expect("valid configuration");
        controller
            .run()
            .expect("workers start")
            .wait()
            .expect("run succeeds")
    };

    for workers in [1, 2, 5] {
        let result = run(workers);
        assert!(result.best_fitness() < 1e-10, "{workers} workers");
        assert_abs_diff_eq!(result.best_genome()[0], 1.5, epsilon = 1e-4);
        assert_abs_diff_eq!(result.best_genome()[1], -0.5, epsilon = 1e-4);
    }
}
