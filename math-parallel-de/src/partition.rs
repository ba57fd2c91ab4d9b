/// Population indices owned by `worker_id`: `worker_id, worker_id + workers, ...`
/// below `population_size`.
///
/// Empty when `worker_id >= population_size`.
pub fn partition(
    worker_id: usize,
    workers: usize,
    population_size: usize,
) -> impl Iterator<Item = usize> {
    debug_assert!(workers > 0);
    (worker_id..population_size).step_by(workers.max(1))
}
