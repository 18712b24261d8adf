//! Piecewise-constant recombination maps.
//!
//! A map translates between physical coordinates on `[0, L)` and cumulative
//! genetic distance. The engine samples breakpoints in genetic space, where
//! the crossover process is homogeneous, and converts them back to physical
//! positions through the inverse lookup here.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Map from physical position to cumulative genetic distance, with inverse.
///
/// Intervals are defined by `positions[i]..positions[i+1]` with a constant
/// per-base crossover rate `rates[i]` inside each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecombinationMap {
    positions: Vec<f64>,
    rates: Vec<f64>,
    cumulative: Vec<f64>,
}

impl RecombinationMap {
    /// Build a map from interval boundaries and per-interval rates.
    ///
    /// `positions` must start at 0, be strictly increasing and end at the
    /// sequence length; `rates` must hold one non-negative finite rate per
    /// interval.
    pub fn new(positions: Vec<f64>, rates: Vec<f64>) -> Result<Self> {
        if positions.len() < 2 {
            return Err(Error::config("recombination map must cover at least one interval"));
        }
        if rates.len() != positions.len() - 1 {
            return Err(Error::config(format!(
                "recombination map has {} boundaries but {} rates",
                positions.len(),
                rates.len()
            )));
        }
        if positions[0] != 0.0 {
            return Err(Error::config("recombination map must start at position 0"));
        }
        for w in positions.windows(2) {
            if !(w[1] > w[0]) || !w[1].is_finite() {
                return Err(Error::config("recombination map positions must be strictly increasing"));
            }
        }
        for &r in &rates {
            if !(r >= 0.0) || !r.is_finite() {
                return Err(Error::config("recombination rates must be non-negative and finite"));
            }
        }
        let mut cumulative = Vec::with_capacity(positions.len());
        cumulative.push(0.0);
        for i in 0..rates.len() {
            let span = positions[i + 1] - positions[i];
            cumulative.push(cumulative[i] + span * rates[i]);
        }
        Ok(Self {
            positions,
            rates,
            cumulative,
        })
    }

    /// A map with a single interval `[0, length)` of constant rate.
    pub fn uniform(length: f64, rate: f64) -> Result<Self> {
        if !(length > 0.0) || !length.is_finite() {
            return Err(Error::config("sequence length must be positive and finite"));
        }
        Self::new(vec![0.0, length], vec![rate])
    }

    /// Physical length `L` of the mapped interval.
    pub fn sequence_length(&self) -> f64 {
        *self.positions.last().unwrap()
    }

    /// Total genetic length of the map.
    pub fn total_genetic_length(&self) -> f64 {
        *self.cumulative.last().unwrap()
    }

    /// Cumulative genetic distance at physical position `x`. Monotone
    /// non-decreasing in `x`.
    pub fn physical_to_genetic(&self, x: f64) -> f64 {
        debug_assert!(x >= 0.0 && x <= self.sequence_length());
        // first boundary > x; the containing interval starts one earlier
        let i = self.positions.partition_point(|&b| b <= x);
        let bin = i.saturating_sub(1).min(self.rates.len() - 1);
        self.cumulative[bin] + (x - self.positions[bin]) * self.rates[bin]
    }

    /// Inverse lookup: the physical position whose cumulative genetic
    /// distance is `g`. The cumulative vector may contain ties where the
    /// rate is zero; those resolve to the leftmost containing interval, so
    /// a draw on a flat stretch lands at its left end.
    pub fn genetic_to_physical(&self, g: f64) -> f64 {
        debug_assert!(g >= 0.0 && g <= self.total_genetic_length());
        let i = self.cumulative.partition_point(|&b| b < g);
        let bin = i.saturating_sub(1).min(self.rates.len() - 1);
        if self.rates[bin] == 0.0 {
            return self.positions[bin];
        }
        self.positions[bin] + (g - self.cumulative[bin]) / self.rates[bin]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_map_matches_closed_form() {
        let rho = 2.5e-8;
        let map = RecombinationMap::uniform(1e6, rho).unwrap();
        for x in [0.0, 1.0, 12345.678, 999999.0, 1e6] {
            assert!((map.physical_to_genetic(x) - rho * x).abs() <= 1e-18 * (1.0 + rho * x));
        }
        for g in [0.0, 1e-6, 0.02, map.total_genetic_length()] {
            assert!((map.genetic_to_physical(g) - g / rho).abs() <= 1e-6);
        }
    }

    #[test]
    fn test_round_trip_within_bins() {
        let map = RecombinationMap::new(
            vec![0.0, 100.0, 200.0, 1000.0],
            vec![1e-8, 5e-8, 1e-9],
        )
        .unwrap();
        let total = map.total_genetic_length();
        assert!((total - (100.0 * 1e-8 + 100.0 * 5e-8 + 800.0 * 1e-9)).abs() < 1e-15);
        for i in 0..=50 {
            let g = total * i as f64 / 50.0;
            let x = map.genetic_to_physical(g);
            assert!((map.physical_to_genetic(x) - g).abs() <= 1e-12);
        }
    }

    #[test]
    fn test_zero_rate_interval() {
        let map = RecombinationMap::new(vec![0.0, 10.0, 20.0, 30.0], vec![1e-2, 0.0, 1e-2]).unwrap();
        // cumulative distance is flat across the dead interval
        assert_eq!(map.physical_to_genetic(10.0), map.physical_to_genetic(20.0));
        // the inverse returns the left end of the flat stretch
        let g = map.physical_to_genetic(10.0);
        assert_eq!(map.genetic_to_physical(g), 10.0);
    }

    #[test]
    fn test_rejects_malformed_maps() {
        assert!(RecombinationMap::new(vec![0.0], vec![]).is_err());
        assert!(RecombinationMap::new(vec![1.0, 2.0], vec![1e-8]).is_err());
        assert!(RecombinationMap::new(vec![0.0, 5.0, 5.0], vec![1e-8, 1e-8]).is_err());
        assert!(RecombinationMap::new(vec![0.0, 5.0], vec![-1e-8]).is_err());
        assert!(RecombinationMap::uniform(0.0, 1e-8).is_err());
    }
}
