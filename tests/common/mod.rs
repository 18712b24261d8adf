#![allow(dead_code)] // each test binary uses a subset of these helpers

use libarcs::{RecombinationMap, Simulator, SimulatorBuilder, TreeSequence};

/// Build a single-population simulator over a uniform recombination map.
pub fn single_population(
    sample_size: usize,
    population_size: f64,
    sequence_length: f64,
    recombination_rate: f64,
    seed: u64,
) -> Simulator {
    SimulatorBuilder::new(RecombinationMap::uniform(sequence_length, recombination_rate).unwrap())
        .sample_size(sample_size)
        .default_population_size(population_size)
        .random_seed(seed)
        .build()
        .unwrap()
}

/// Height (root time) of the single tree of a non-recombining run.
pub fn tree_height(ts: &TreeSequence) -> f64 {
    let mut height = 0.0;
    ts.for_each_tree(|tree| {
        height = ts.node_time(tree.root_of(libarcs::NodeId::from_usize(0)));
    });
    height
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn harmonic_number(n: usize) -> f64 {
    (1..=n).map(|k| 1.0 / k as f64).sum()
}

/// Pearson correlation coefficient of two equally long samples.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    assert_eq!(xs.len(), ys.len());
    let mx = mean(xs);
    let my = mean(ys);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        cov += (x - mx) * (y - my);
        vx += (x - mx) * (x - mx);
        vy += (y - my) * (y - my);
    }
    cov / (vx.sqrt() * vy.sqrt())
}
