//! Tree sequences: the ordered collection of coalescence records produced by
//! the simulation engine, indexed for efficient tree-by-tree iteration along
//! the genome.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

mod record;
mod trees;

pub use record::CoalescenceRecord;
pub use trees::{Tree, TreeSequence};

/// A node in the emerging genealogy. Leaves are `0..n-1` (one per sampled
/// chromosome); internal nodes are assigned in strictly increasing order as
/// coalescences happen, starting at `n`. The newtype keeps node ids from
/// being mixed up with population or lineage indices.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn from_usize(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the underlying value of the node id.
    pub fn unwrap(&self) -> u32 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}
