use serde::{Deserialize, Serialize};

use crate::ts::NodeId;

/// One coalescence observed by the engine: on the half-open genomic interval
/// `[left, right)`, `parent` is the immediate ancestor of every node in
/// `children`.
///
/// Children are sorted ascending and the parent's time is strictly greater
/// than every child's. Records emitted by one coalescence event share their
/// parent id when the same pair coalesces over multiple disjoint intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoalescenceRecord {
    pub left: f64,
    pub right: f64,
    pub parent: NodeId,
    pub children: Vec<NodeId>,
    /// Time of the coalescence in generations.
    pub time: f64,
    /// Population the parent was assigned to.
    pub population: usize,
}

impl CoalescenceRecord {
    pub(crate) fn new(
        left: f64,
        right: f64,
        parent: NodeId,
        mut children: Vec<NodeId>,
        time: f64,
        population: usize,
    ) -> Self {
        debug_assert!(left < right);
        debug_assert!(children.len() >= 2);
        children.sort_unstable();
        Self {
            left,
            right,
            parent,
            children,
            time,
            population,
        }
    }
}
