use math_audio_parallel_de::{DifferentialEvolutionBuilder, GenerationResult};
use ndarray::Array1;
use std::time::Instant;

fn run(workers: usize, objective: fn(&Array1<f64>) -> f64, dimension: usize) -> GenerationResult {
    let controller = DifferentialEvolutionBuilder::new()
        .objective(objective)
        .bounds(
            Array1::from_elem(dimension, -5.12),
            Array1::from_elem(dimension, 5.12),
        )
        .population_size(150)
        .workers(workers)
        .max_generations(100)
        .seed(42)
        .build()
        .expect("invalid configuration");
    controller
        .run()
        .expect("workers failed to start")
        .wait()
        .expect("optimization failed")
}

// Rastrigin with artificial compute to make evaluations expensive
fn expensive_rastrigin(x: &Array1<f64>) -> f64 {
    let mut sum = 0.0;
    for _ in 0..1000 {
        for &xi in x.iter() {
            sum += xi.sin().cos().exp().ln_1p();
        }
    }
    let a = 10.0;
    let n = x.len() as f64;
    let result = a * n
        + x.iter()
            .map(|&xi| xi * xi - a * (2.0 * std::f64::consts::PI * xi).cos())
            .sum::<f64>();
    result + sum * 1e-10
}

fn main() {
    env_logger::init();

    let dimension = 10;
    let available = std::thread::available_parallelism().map_or(1, |n| n.get());

    for workers in [1, available] {
        let start = Instant::now();
        let result = run(workers, expensive_rastrigin, dimension);
        let elapsed = start.elapsed();
        println!("{workers} worker(s):");
        println!("  Best f: {:.6e}", result.best_fitness());
        println!("  Generations: {}", result.generation);
        println!("  Time: {:.3} seconds", elapsed.as_secs_f64());
    }
}
