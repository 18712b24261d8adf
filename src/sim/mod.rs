//! The coalescent simulation engine and its configuration surface.
//!
//! A [`Simulator`] is built from a [`SimulationConfig`] (usually through the
//! [`SimulatorBuilder`]), owns all mutable state of one replicate and runs
//! single-threaded to completion. Configuration problems are all reported by
//! [`SimulatorBuilder::build`] / [`Simulator::new`] before any simulation
//! work starts.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::demography::{DemographicEvent, MigrationMatrix, PopulationConfiguration};
use crate::error::{Error, Result};
use crate::recomb_map::RecombinationMap;

mod avl;
mod engine;
mod segment;

pub use engine::{RunStatistics, Simulator};

/// Stable identifier of an extant lineage. Doubles as the lineage's index in
/// the recombination-weight Fenwick tree, which is 1-based; id 0 is never
/// issued. Ids are recycled through a LIFO freelist when lineages die, so
/// allocation is deterministic.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub(crate) struct LineageId(pub(crate) u32);

impl Display for LineageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Complete configuration of one simulation run.
///
/// Cloneable so that replicate drivers can stamp out independent engines;
/// replicate `i` conventionally runs with `random_seed + i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub populations: Vec<PopulationConfiguration>,
    /// Backward-time migration rates; `None` means no migration.
    pub migration_matrix: Option<MigrationMatrix>,
    /// Scheduled demographic events, sorted by time.
    pub demographic_events: Vec<DemographicEvent>,
    pub recombination_map: RecombinationMap,
    /// Fallback size for populations whose `initial_size` is omitted.
    pub default_population_size: f64,
    pub random_seed: u64,
    pub num_replicates: usize,
    /// Upper bound on main-loop iterations; guards models that cannot
    /// coalesce (isolated demes without migration).
    pub step_budget: Option<u64>,
    /// Upper bound on concurrently live segments, `None` = unbounded.
    pub max_segments: Option<usize>,
}

/// Builder for [`Simulator`] instances. Sufficient to express the usual
/// ms-style surface: population counts, sizes and growth rates, a migration
/// matrix, scheduled events, a recombination map and replicate counts.
pub struct SimulatorBuilder {
    config: SimulationConfig,
}

impl SimulatorBuilder {
    pub fn new(recombination_map: RecombinationMap) -> Self {
        Self {
            config: SimulationConfig {
                populations: Vec::new(),
                migration_matrix: None,
                demographic_events: Vec::new(),
                recombination_map,
                default_population_size: 1.0,
                random_seed: 1,
                num_replicates: 1,
                step_budget: None,
                max_segments: None,
            },
        }
    }

    /// Shorthand for a single panmictic population of `n` samples.
    pub fn sample_size(mut self, n: usize) -> Self {
        self.config.populations = vec![PopulationConfiguration::new(n)];
        self
    }

    pub fn add_population(mut self, population: PopulationConfiguration) -> Self {
        self.config.populations.push(population);
        self
    }

    pub fn migration_matrix(mut self, matrix: MigrationMatrix) -> Self {
        self.config.migration_matrix = Some(matrix);
        self
    }

    pub fn demographic_events(mut self, events: Vec<DemographicEvent>) -> Self {
        self.config.demographic_events = events;
        self
    }

    /// Default population size (the `Ne` scaler) applied where a population
    /// omits its `initial_size`.
    pub fn default_population_size(mut self, size: f64) -> Self {
        self.config.default_population_size = size;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    pub fn num_replicates(mut self, replicates: usize) -> Self {
        self.config.num_replicates = replicates;
        self
    }

    pub fn step_budget(mut self, budget: u64) -> Self {
        self.config.step_budget = Some(budget);
        self
    }

    pub fn max_segments(mut self, max: usize) -> Self {
        self.config.max_segments = Some(max);
        self
    }

    /// Finish the configuration without building an engine.
    pub fn finalize(self) -> SimulationConfig {
        self.config
    }

    /// Validate the configuration and build an engine for it.
    pub fn build(self) -> Result<Simulator> {
        Simulator::new(self.config)
    }
}

pub(crate) fn validate_config(config: &SimulationConfig) -> Result<()> {
    if config.populations.is_empty() {
        return Err(Error::config("at least one population is required"));
    }
    let total_samples: usize = config.populations.iter().map(|p| p.sample_size).sum();
    if total_samples < 2 {
        return Err(Error::config(format!(
            "need at least two sampled chromosomes, got {}",
            total_samples
        )));
    }
    if !(config.default_population_size > 0.0) || !config.default_population_size.is_finite() {
        return Err(Error::config("default population size must be positive and finite"));
    }
    for (index, population) in config.populations.iter().enumerate() {
        if let Some(size) = population.initial_size {
            if !(size > 0.0) || !size.is_finite() {
                return Err(Error::config(format!(
                    "population {} has a non-positive initial size",
                    index
                )));
            }
        }
        if !population.growth_rate.is_finite() {
            return Err(Error::config(format!(
                "population {} has a non-finite growth rate",
                index
            )));
        }
    }
    if let Some(matrix) = &config.migration_matrix {
        if matrix.num_populations() != config.populations.len() {
            return Err(Error::config(format!(
                "migration matrix covers {} populations, configuration has {}",
                matrix.num_populations(),
                config.populations.len()
            )));
        }
    }
    for event in &config.demographic_events {
        event.validate(config.populations.len())?;
    }
    for window in config.demographic_events.windows(2) {
        if window[1].time() < window[0].time() {
            return Err(Error::config("demographic events must be sorted by time"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> RecombinationMap {
        RecombinationMap::uniform(1.0, 0.0).unwrap()
    }

    #[test]
    fn test_rejects_too_few_samples() {
        let result = SimulatorBuilder::new(map()).sample_size(1).build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_rejects_unsorted_events() {
        let result = SimulatorBuilder::new(map())
            .sample_size(2)
            .demographic_events(vec![
                DemographicEvent::MigrationRateChange {
                    time: 10.0,
                    rate: 1.0,
                    matrix_index: None,
                },
                DemographicEvent::MigrationRateChange {
                    time: 5.0,
                    rate: 0.0,
                    matrix_index: None,
                },
            ])
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_rejects_mismatched_matrix() {
        let result = SimulatorBuilder::new(map())
            .sample_size(2)
            .migration_matrix(MigrationMatrix::zero(3))
            .build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_builds_valid_config() {
        assert!(SimulatorBuilder::new(map())
            .sample_size(2)
            .default_population_size(100.0)
            .random_seed(42)
            .build()
            .is_ok());
    }
}
