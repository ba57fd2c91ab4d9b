use math_audio_parallel_de::{
    BoundHandling, Crossover, DifferentialEvolutionBuilder, DifferentialMutation, Mutation,
};
use ndarray::{Array1, array};

fn main() {
    env_logger::init();

    // Ackley function (2D)
    let ackley = |x: &Array1<f64>| {
        let x0 = x[0];
        let x1 = x[1];
        let s = 0.5 * (x0 * x0 + x1 * x1);
        let c = 0.5
            * ((2.0 * std::f64::consts::PI * x0).cos() + (2.0 * std::f64::consts::PI * x1).cos());
        -20.0 * (-0.2 * s.sqrt()).exp() - c.exp() + 20.0 + std::f64::consts::E
    };

    let lower = array![-5.0, -5.0];
    let upper = array![5.0, 5.0];

    let mutation = DifferentialMutation::new(lower.clone(), upper.clone(), 0.7, 0.9)
        .and_then(|m| m.with_mutation(Mutation::Range { min: 0.5, max: 1.0 }))
        .expect("valid mutation parameters")
        .with_crossover(Crossover::Exponential)
        .with_bound_handling(BoundHandling::Clip);

    let controller = DifferentialEvolutionBuilder::new()
        .objective(ackley)
        .bounds(lower, upper)
        .population_size(40)
        .mutation(mutation)
        .latin_hypercube_sampling()
        .max_generations(300)
        .observer(|view: &math_audio_parallel_de::GenerationView<'_>| {
            if view.generation % 25 == 0 {
                eprintln!(
                    "gen {:4}  best_f={:.6e}",
                    view.generation,
                    view.best_fitness()
                );
            }
            Ok::<(), math_audio_parallel_de::BoxError>(())
        })
        .seed(42)
        .build()
        .expect("invalid configuration");

    let result = controller
        .run()
        .expect("workers failed to start")
        .wait()
        .expect("optimization failed");

    println!(
        "generations={}\nbest f={:.6e}\nbest x={:?}",
        result.generation,
        result.best_fitness(),
        result.best_genome()
    );
}
