//! Infinite-sites mutation generation on finished tree sequences.
//!
//! The engine itself never produces mutations; this generator decorates a
//! completed [`TreeSequence`] afterwards. Every branch-interval attachment
//! appears in exactly one coalescence record, so mutations are thrown onto
//! records directly: a Poisson number per child branch with mean
//! `rate * interval span * branch length`, at uniform (and hence almost
//! surely unique) real-valued positions.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};

use crate::error::{Error, Result};
use crate::ts::{NodeId, TreeSequence};

/// A single infinite-sites mutation: a unique real-valued position and the
/// node below which it falls.
#[derive(Debug, Clone, PartialEq)]
pub struct InfiniteSitesMutation {
    pub position: f64,
    pub node: NodeId,
}

/// Generator of infinite-sites mutations with a fixed per-base
/// per-generation rate.
pub struct MutationGenerator {
    rate: f64,
    rng: SmallRng,
}

impl MutationGenerator {
    pub fn new(rate: f64, seed: u64) -> Result<Self> {
        if !(rate >= 0.0) || !rate.is_finite() {
            return Err(Error::config("mutation rate must be non-negative and finite"));
        }
        Ok(Self {
            rate,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    /// Sprinkle mutations over every branch of `tree_sequence`, returned
    /// sorted by position.
    pub fn generate(&mut self, tree_sequence: &TreeSequence) -> Result<Vec<InfiniteSitesMutation>> {
        let mut mutations = Vec::new();
        if self.rate == 0.0 {
            return Ok(mutations);
        }
        for record in tree_sequence.records() {
            let span = record.right - record.left;
            for &child in &record.children {
                let branch_length = record.time - tree_sequence.node_time(child);
                debug_assert!(branch_length > 0.0);
                let mean = self.rate * span * branch_length;
                if mean <= 0.0 {
                    continue;
                }
                let count = Poisson::new(mean)
                    .map_err(|_| Error::internal("invalid Poisson mean"))?
                    .sample(&mut self.rng) as u64;
                for _ in 0..count {
                    let position = record.left + self.rng.random::<f64>() * span;
                    mutations.push(InfiniteSitesMutation {
                        position,
                        node: child,
                    });
                }
            }
        }
        mutations.sort_by(|a, b| a.position.total_cmp(&b.position));
        Ok(mutations)
    }
}
