//! One-call entry points for the common cases.

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::Result;
use crate::recomb_map::RecombinationMap;
use crate::sim::{SimulationConfig, Simulator, SimulatorBuilder};
use crate::ts::TreeSequence;

/// Simulate one replicate of `n` samples from a single population of
/// constant size over a uniform recombination map.
pub fn simulate(
    sample_size: usize,
    population_size: f64,
    sequence_length: f64,
    recombination_rate: f64,
    seed: u64,
) -> Result<TreeSequence> {
    let map = RecombinationMap::uniform(sequence_length, recombination_rate)?;
    SimulatorBuilder::new(map)
        .sample_size(sample_size)
        .default_population_size(population_size)
        .random_seed(seed)
        .build()?
        .run()
}

/// Run `config.num_replicates` independent replicates in parallel.
///
/// Replicate `i` runs on its own engine seeded with `random_seed + i`, so
/// results do not depend on scheduling and are reproducible replicate by
/// replicate.
pub fn simulate_replicates(config: &SimulationConfig) -> Result<Vec<TreeSequence>> {
    (0..config.num_replicates)
        .into_par_iter()
        .map(|replicate| {
            let mut config = config.clone();
            config.random_seed = config.random_seed.wrapping_add(replicate as u64);
            Simulator::new(config)?.run()
        })
        .collect()
}
