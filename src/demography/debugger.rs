//! Inspection of a demographic model without running a simulation.
//!
//! The debugger slices the event schedule into epochs (one per distinct
//! event time) and reports the effective population sizes at the epoch
//! boundaries, which is usually enough to spot an off-by-a-generation
//! mistake in a model before burning replicates on it.

use std::fmt::{Display, Formatter};

use crate::demography::{DemographicEvent, MigrationMatrix, PopulationConfiguration, PopulationState};
use crate::error::Result;

/// One epoch of constant demographic parameters.
#[derive(Debug, Clone)]
pub struct Epoch {
    /// Inclusive start time in generations.
    pub start_time: f64,
    /// Exclusive end time; `f64::INFINITY` for the terminal epoch.
    pub end_time: f64,
    /// Effective size of each population at the epoch start.
    pub sizes_at_start: Vec<f64>,
    /// Growth rate of each population during the epoch.
    pub growth_rates: Vec<f64>,
}

/// Epoch-by-epoch view of a demographic model.
pub struct DemographyDebugger {
    epochs: Vec<Epoch>,
}

impl DemographyDebugger {
    pub fn new(
        populations: &[PopulationConfiguration],
        default_size: f64,
        migration_matrix: &MigrationMatrix,
        events: &[DemographicEvent],
    ) -> Result<Self> {
        let mut states: Vec<PopulationState> = populations
            .iter()
            .map(|p| PopulationState::new(p.initial_size.unwrap_or(default_size), p.growth_rate))
            .collect();
        let mut matrix = migration_matrix.clone();
        for event in events {
            event.validate(populations.len())?;
        }

        let mut epochs = Vec::new();
        let mut start_time = 0.0;
        let mut i = 0;
        while i <= events.len() {
            // all events sharing one time form a single epoch boundary
            let end_time = if i == events.len() {
                f64::INFINITY
            } else {
                events[i].time()
            };
            epochs.push(Epoch {
                start_time,
                end_time,
                sizes_at_start: states.iter().map(|s| s.size_at(start_time)).collect(),
                growth_rates: states.iter().map(|s| s.growth_rate).collect(),
            });
            if i == events.len() {
                break;
            }
            start_time = end_time;
            while i < events.len() && events[i].time() == start_time {
                Self::apply(&mut states, &mut matrix, &events[i]);
                i += 1;
            }
        }
        Ok(Self { epochs })
    }

    fn apply(states: &mut [PopulationState], matrix: &mut MigrationMatrix, event: &DemographicEvent) {
        match event {
            DemographicEvent::PopulationParametersChange {
                time,
                population,
                initial_size,
                growth_rate,
            } => match population {
                Some(p) => states[*p].change_parameters(*time, *initial_size, *growth_rate),
                None => {
                    for state in states.iter_mut() {
                        state.change_parameters(*time, *initial_size, *growth_rate);
                    }
                }
            },
            DemographicEvent::MigrationRateChange {
                rate, matrix_index, ..
            } => match matrix_index {
                Some((i, j)) => matrix.set_rate(*i, *j, *rate),
                None => matrix.set_all(*rate),
            },
            // lineage movement has no effect on parameters
            DemographicEvent::MassMigration { .. } => {}
        }
    }

    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    /// The distinct epoch boundary times, i.e. the distinct scheduled event
    /// times in ascending order.
    pub fn epoch_boundaries(&self) -> Vec<f64> {
        self.epochs
            .iter()
            .skip(1)
            .map(|epoch| epoch.start_time)
            .collect()
    }
}

impl Display for DemographyDebugger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for epoch in &self.epochs {
            writeln!(f, "epoch [{} .. {})", epoch.start_time, epoch.end_time)?;
            for (p, (size, growth)) in epoch
                .sizes_at_start
                .iter()
                .zip(epoch.growth_rates.iter())
                .enumerate()
            {
                writeln!(f, "  population {}: size {:.6} growth {:.6}", p, size, growth)?;
            }
        }
        Ok(())
    }
}
