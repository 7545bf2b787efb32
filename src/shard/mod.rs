//! Deterministic work partitioning across machines and workers.
//!
//! Every participant computes the same seeded permutation of the dataset,
//! then takes its own strided slice. No coordination service is involved:
//! identical inputs yield identical plans on every machine, and the strides
//! of distinct workers never overlap.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// The seeded permutation of `0..dataset_len` shared by all participants.
pub fn shuffled_indices(dataset_len: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..dataset_len).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    indices
}

/// Computes the dataset indices owned by one worker.
///
/// The worker's global position is `rank * num_workers + worker_index` and
/// the stride is `world_size * num_workers`; together the workers cover the
/// permutation exactly once.
pub fn plan_shard(
    dataset_len: usize,
    seed: u64,
    rank: usize,
    world_size: usize,
    worker_index: usize,
    num_workers: usize,
) -> Vec<usize> {
    assert!(world_size > 0, "world_size must be positive");
    assert!(num_workers > 0, "num_workers must be positive");
    assert!(rank < world_size, "rank out of range");
    assert!(worker_index < num_workers, "worker_index out of range");

    let global = rank * num_workers + worker_index;
    let stride = world_size * num_workers;

    shuffled_indices(dataset_len, seed)
        .into_iter()
        .skip(global)
        .step_by(stride)
        .collect()
}
