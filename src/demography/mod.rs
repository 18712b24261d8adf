//! Structured, time-varying demography: population parameters, the
//! migration matrix and the schedule of demographic events that mutate them
//! during a run.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

mod debugger;

pub use debugger::{DemographyDebugger, Epoch};

/// User-facing configuration of one population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfiguration {
    /// Number of genome copies at time 0, in the same units the coalescence
    /// hazard `k(k-1)/(2N)` is computed in. `None` falls back to the
    /// simulation-wide default size.
    pub initial_size: Option<f64>,
    /// Exponential growth rate per generation (backwards in time the
    /// population shrinks under positive growth).
    pub growth_rate: f64,
    /// Number of sampled chromosomes drawn from this population at time 0.
    pub sample_size: usize,
}

impl PopulationConfiguration {
    pub fn new(sample_size: usize) -> Self {
        Self {
            initial_size: None,
            growth_rate: 0.0,
            sample_size,
        }
    }

    pub fn with_size(sample_size: usize, initial_size: f64) -> Self {
        Self {
            initial_size: Some(initial_size),
            growth_rate: 0.0,
            sample_size,
        }
    }

    pub fn with_growth(sample_size: usize, initial_size: f64, growth_rate: f64) -> Self {
        Self {
            initial_size: Some(initial_size),
            growth_rate,
            sample_size,
        }
    }
}

/// Mutable per-population state tracked by the engine.
///
/// The effective size decays exponentially from the size that was current at
/// the last parameter change.
#[derive(Debug, Clone)]
pub(crate) struct PopulationState {
    pub(crate) initial_size: f64,
    pub(crate) growth_rate: f64,
    pub(crate) time_of_last_change: f64,
}

impl PopulationState {
    pub(crate) fn new(initial_size: f64, growth_rate: f64) -> Self {
        Self {
            initial_size,
            growth_rate,
            time_of_last_change: 0.0,
        }
    }

    /// Effective size at time `t >= time_of_last_change`.
    pub(crate) fn size_at(&self, t: f64) -> f64 {
        if self.growth_rate == 0.0 {
            self.initial_size
        } else {
            self.initial_size * (-self.growth_rate * (t - self.time_of_last_change)).exp()
        }
    }

    /// Rebase the state at `time`, optionally overriding size and growth.
    pub(crate) fn change_parameters(
        &mut self,
        time: f64,
        initial_size: Option<f64>,
        growth_rate: Option<f64>,
    ) {
        let current = self.size_at(time);
        self.initial_size = initial_size.unwrap_or(current);
        if let Some(growth) = growth_rate {
            self.growth_rate = growth;
        }
        self.time_of_last_change = time;
    }
}

/// Backward-time migration rates between populations. `M[i][j]` is the
/// per-lineage per-generation rate at which a lineage currently in `i` moves
/// to `j`; the diagonal is structurally zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationMatrix {
    num_populations: usize,
    rates: Vec<f64>,
}

impl MigrationMatrix {
    /// The zero matrix over `num_populations` populations.
    pub fn zero(num_populations: usize) -> Self {
        Self {
            num_populations,
            rates: vec![0.0; num_populations * num_populations],
        }
    }

    /// Build from a dense row-major matrix. The diagonal must be zero and
    /// every entry non-negative and finite.
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self> {
        let d = rows.len();
        let mut rates = Vec::with_capacity(d * d);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != d {
                return Err(Error::config(format!(
                    "migration matrix row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    d
                )));
            }
            for (j, &rate) in row.iter().enumerate() {
                if i == j && rate != 0.0 {
                    return Err(Error::config("migration matrix diagonal must be zero"));
                }
                if !(rate >= 0.0) || !rate.is_finite() {
                    return Err(Error::config(format!(
                        "migration rate [{}][{}] must be non-negative and finite",
                        i, j
                    )));
                }
                rates.push(rate);
            }
        }
        Ok(Self {
            num_populations: d,
            rates,
        })
    }

    /// Symmetric island model: every off-diagonal entry equals `rate`.
    pub fn island(num_populations: usize, rate: f64) -> Result<Self> {
        let rows = (0..num_populations)
            .map(|i| {
                (0..num_populations)
                    .map(|j| if i == j { 0.0 } else { rate })
                    .collect()
            })
            .collect();
        Self::new(rows)
    }

    pub fn num_populations(&self) -> usize {
        self.num_populations
    }

    pub fn rate(&self, source: usize, dest: usize) -> f64 {
        self.rates[source * self.num_populations + dest]
    }

    pub(crate) fn set_rate(&mut self, source: usize, dest: usize, rate: f64) {
        debug_assert!(source != dest);
        self.rates[source * self.num_populations + dest] = rate;
    }

    pub(crate) fn set_all(&mut self, rate: f64) {
        for i in 0..self.num_populations {
            for j in 0..self.num_populations {
                if i != j {
                    self.rates[i * self.num_populations + j] = rate;
                }
            }
        }
    }

    /// Total outgoing per-lineage rate from `source`.
    pub(crate) fn row_sum(&self, source: usize) -> f64 {
        let base = source * self.num_populations;
        self.rates[base..base + self.num_populations].iter().sum()
    }
}

/// A scheduled change to the demography, executed when simulation time
/// reaches `time`. Events scheduled at identical times execute in the order
/// they were submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DemographicEvent {
    /// Change the size and/or growth rate of one population (or all of them
    /// when `population` is `None`). Omitted fields keep their current
    /// value; the size is rebased at the event time either way.
    PopulationParametersChange {
        time: f64,
        population: Option<usize>,
        initial_size: Option<f64>,
        growth_rate: Option<f64>,
    },
    /// Set one migration matrix entry, or every off-diagonal entry when
    /// `matrix_index` is `None`.
    MigrationRateChange {
        time: f64,
        rate: f64,
        matrix_index: Option<(usize, usize)>,
    },
    /// Move each lineage currently in `source` to `destination`
    /// independently with probability `proportion`.
    MassMigration {
        time: f64,
        source: usize,
        destination: usize,
        proportion: f64,
    },
}

impl DemographicEvent {
    pub fn time(&self) -> f64 {
        match self {
            Self::PopulationParametersChange { time, .. } => *time,
            Self::MigrationRateChange { time, .. } => *time,
            Self::MassMigration { time, .. } => *time,
        }
    }

    /// Validate the event against the population count. Part of the
    /// pre-simulation configuration checks.
    pub(crate) fn validate(&self, num_populations: usize) -> Result<()> {
        if !self.time().is_finite() || self.time() < 0.0 {
            return Err(Error::config("event times must be finite and non-negative"));
        }
        match self {
            Self::PopulationParametersChange {
                population,
                initial_size,
                growth_rate,
                ..
            } => {
                if let Some(p) = population {
                    if *p >= num_populations {
                        return Err(Error::config(format!("unknown population {}", p)));
                    }
                }
                if initial_size.is_none() && growth_rate.is_none() {
                    return Err(Error::config(
                        "population parameters change must set a size or a growth rate",
                    ));
                }
                if let Some(size) = initial_size {
                    if !(*size > 0.0) || !size.is_finite() {
                        return Err(Error::config("population size must be positive and finite"));
                    }
                }
                Ok(())
            }
            Self::MigrationRateChange {
                rate, matrix_index, ..
            } => {
                if !(*rate >= 0.0) || !rate.is_finite() {
                    return Err(Error::config("migration rate must be non-negative and finite"));
                }
                if let Some((i, j)) = matrix_index {
                    if i == j {
                        return Err(Error::config(
                            "migration rate change cannot target the matrix diagonal",
                        ));
                    }
                    if *i >= num_populations || *j >= num_populations {
                        return Err(Error::config(format!("unknown matrix index ({}, {})", i, j)));
                    }
                }
                Ok(())
            }
            Self::MassMigration {
                source,
                destination,
                proportion,
                ..
            } => {
                if *source >= num_populations || *destination >= num_populations {
                    return Err(Error::config("mass migration references an unknown population"));
                }
                if source == destination {
                    return Err(Error::config("mass migration source and destination must differ"));
                }
                if !(0.0..=1.0).contains(proportion) {
                    return Err(Error::config("mass migration proportion must be in [0, 1]"));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_size_decay() {
        let state = PopulationState::new(1000.0, 0.01);
        assert_eq!(state.size_at(0.0), 1000.0);
        let shrunk = state.size_at(100.0);
        assert!((shrunk - 1000.0 * (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_parameter_change_rebases_size() {
        let mut state = PopulationState::new(1000.0, 0.01);
        let current = state.size_at(50.0);
        state.change_parameters(50.0, None, Some(0.0));
        assert_eq!(state.time_of_last_change, 50.0);
        assert_eq!(state.size_at(80.0), current);
    }

    #[test]
    fn test_migration_matrix_validation() {
        assert!(MigrationMatrix::new(vec![vec![1.0, 0.5], vec![0.5, 0.0]]).is_err());
        assert!(MigrationMatrix::new(vec![vec![0.0, -0.5], vec![0.5, 0.0]]).is_err());
        assert!(MigrationMatrix::new(vec![vec![0.0, 0.5]]).is_err());
        let m = MigrationMatrix::new(vec![vec![0.0, 0.25], vec![0.75, 0.0]]).unwrap();
        assert_eq!(m.rate(0, 1), 0.25);
        assert_eq!(m.row_sum(1), 0.75);
    }

    #[test]
    fn test_event_validation() {
        let ppc = DemographicEvent::PopulationParametersChange {
            time: 10.0,
            population: Some(3),
            initial_size: Some(1.0),
            growth_rate: None,
        };
        assert!(ppc.validate(2).is_err());
        let mm = DemographicEvent::MassMigration {
            time: 5.0,
            source: 0,
            destination: 1,
            proportion: 1.5,
        };
        assert!(mm.validate(2).is_err());
        let mrc = DemographicEvent::MigrationRateChange {
            time: 1.0,
            rate: 0.5,
            matrix_index: Some((1, 1)),
        };
        assert!(mrc.validate(2).is_err());
    }
}
