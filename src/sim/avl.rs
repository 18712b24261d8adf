//! The per-population lineage index: an order-statistic AVL tree keyed by
//! `(head.left, lineage id)`.
//!
//! Every extant lineage of a population has one entry here. The engine needs
//! three things from the index: membership updates in O(log n), the current
//! size (which drives the coalescence hazard), and uniform selection by rank
//! (which makes lineage draws deterministic given the PRNG state). Subtree
//! sizes are maintained on every node to support the rank selection.

use std::cmp::Ordering;

use crate::error::Result;
use crate::pool::{BlockId, ObjectPool};
use crate::sim::LineageId;

#[derive(Debug, Clone, Default)]
struct AvlNode {
    key: f64,
    lineage: LineageId,
    left: Option<BlockId>,
    right: Option<BlockId>,
    height: i32,
    size: u32,
}

pub(crate) struct LineageIndex {
    nodes: ObjectPool<AvlNode>,
    root: Option<BlockId>,
}

impl LineageIndex {
    pub(crate) fn new() -> Self {
        Self {
            nodes: ObjectPool::new(None),
            root: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.subtree_size(self.root) as usize
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Insert a lineage under its `(key, id)` entry.
    pub(crate) fn insert(&mut self, key: f64, lineage: LineageId) -> Result<()> {
        let id = self.nodes.alloc()?;
        let node = &mut self.nodes[id];
        node.key = key;
        node.lineage = lineage;
        node.height = 1;
        node.size = 1;
        self.root = Some(self.insert_at(self.root, id));
        Ok(())
    }

    /// Remove the entry for `lineage` inserted under `key`. Returns whether
    /// the entry was present.
    pub(crate) fn remove(&mut self, key: f64, lineage: LineageId) -> bool {
        let (root, removed) = self.remove_at(self.root, key, lineage);
        self.root = root;
        match removed {
            Some(node) => {
                self.nodes.free(node);
                true
            }
            None => false,
        }
    }

    /// The lineage with the given in-order rank (0-based).
    pub(crate) fn select(&self, rank: usize) -> Option<LineageId> {
        if rank >= self.len() {
            return None;
        }
        let mut rank = rank as u32;
        let mut current = self.root;
        while let Some(id) = current {
            let node = &self.nodes[id];
            let left_size = self.subtree_size(node.left);
            match rank.cmp(&left_size) {
                Ordering::Less => current = node.left,
                Ordering::Equal => return Some(node.lineage),
                Ordering::Greater => {
                    rank -= left_size + 1;
                    current = node.right;
                }
            }
        }
        None
    }

    /// All lineages in key order.
    pub(crate) fn in_order(&self) -> Vec<LineageId> {
        let mut result = Vec::with_capacity(self.len());
        let mut stack = Vec::new();
        let mut current = self.root;
        while current.is_some() || !stack.is_empty() {
            while let Some(id) = current {
                stack.push(id);
                current = self.nodes[id].left;
            }
            let id = stack.pop().unwrap();
            result.push(self.nodes[id].lineage);
            current = self.nodes[id].right;
        }
        result
    }

    fn cmp_entries(key: f64, lineage: LineageId, node_key: f64, node_lineage: LineageId) -> Ordering {
        key.total_cmp(&node_key)
            .then(lineage.0.cmp(&node_lineage.0))
    }

    fn subtree_height(&self, node: Option<BlockId>) -> i32 {
        node.map_or(0, |id| self.nodes[id].height)
    }

    fn subtree_size(&self, node: Option<BlockId>) -> u32 {
        node.map_or(0, |id| self.nodes[id].size)
    }

    fn update(&mut self, id: BlockId) {
        let left = self.nodes[id].left;
        let right = self.nodes[id].right;
        let height = 1 + self.subtree_height(left).max(self.subtree_height(right));
        let size = 1 + self.subtree_size(left) + self.subtree_size(right);
        let node = &mut self.nodes[id];
        node.height = height;
        node.size = size;
    }

    fn balance_factor(&self, id: BlockId) -> i32 {
        self.subtree_height(self.nodes[id].left) - self.subtree_height(self.nodes[id].right)
    }

    fn rotate_right(&mut self, id: BlockId) -> BlockId {
        let pivot = self.nodes[id].left.expect("left rotation pivot");
        self.nodes[id].left = self.nodes[pivot].right;
        self.nodes[pivot].right = Some(id);
        self.update(id);
        self.update(pivot);
        pivot
    }

    fn rotate_left(&mut self, id: BlockId) -> BlockId {
        let pivot = self.nodes[id].right.expect("right rotation pivot");
        self.nodes[id].right = self.nodes[pivot].left;
        self.nodes[pivot].left = Some(id);
        self.update(id);
        self.update(pivot);
        pivot
    }

    fn rebalance(&mut self, id: BlockId) -> BlockId {
        self.update(id);
        let balance = self.balance_factor(id);
        if balance > 1 {
            let left = self.nodes[id].left.unwrap();
            if self.balance_factor(left) < 0 {
                let rotated = self.rotate_left(left);
                self.nodes[id].left = Some(rotated);
            }
            self.rotate_right(id)
        } else if balance < -1 {
            let right = self.nodes[id].right.unwrap();
            if self.balance_factor(right) > 0 {
                let rotated = self.rotate_right(right);
                self.nodes[id].right = Some(rotated);
            }
            self.rotate_left(id)
        } else {
            id
        }
    }

    fn insert_at(&mut self, root: Option<BlockId>, new: BlockId) -> BlockId {
        let Some(id) = root else {
            return new;
        };
        let order = Self::cmp_entries(
            self.nodes[new].key,
            self.nodes[new].lineage,
            self.nodes[id].key,
            self.nodes[id].lineage,
        );
        match order {
            Ordering::Less | Ordering::Equal => {
                let child = self.insert_at(self.nodes[id].left, new);
                self.nodes[id].left = Some(child);
            }
            Ordering::Greater => {
                let child = self.insert_at(self.nodes[id].right, new);
                self.nodes[id].right = Some(child);
            }
        }
        self.rebalance(id)
    }

    fn remove_at(
        &mut self,
        root: Option<BlockId>,
        key: f64,
        lineage: LineageId,
    ) -> (Option<BlockId>, Option<BlockId>) {
        let Some(id) = root else {
            return (None, None);
        };
        let order = Self::cmp_entries(key, lineage, self.nodes[id].key, self.nodes[id].lineage);
        let removed;
        match order {
            Ordering::Less => {
                let (child, r) = self.remove_at(self.nodes[id].left, key, lineage);
                self.nodes[id].left = child;
                removed = r;
            }
            Ordering::Greater => {
                let (child, r) = self.remove_at(self.nodes[id].right, key, lineage);
                self.nodes[id].right = child;
                removed = r;
            }
            Ordering::Equal => {
                let left = self.nodes[id].left;
                let right = self.nodes[id].right;
                return match (left, right) {
                    (None, None) => (None, Some(id)),
                    (Some(child), None) | (None, Some(child)) => (Some(child), Some(id)),
                    (Some(_), Some(right_child)) => {
                        // replace with the in-order successor
                        let (new_right, successor) = self.remove_min(right_child);
                        self.nodes[successor].left = left;
                        self.nodes[successor].right = new_right;
                        (Some(self.rebalance(successor)), Some(id))
                    }
                };
            }
        }
        if removed.is_some() {
            (Some(self.rebalance(id)), removed)
        } else {
            (Some(id), None)
        }
    }

    /// Detach the minimum node of a non-empty subtree, returning the new
    /// subtree root and the detached node.
    fn remove_min(&mut self, id: BlockId) -> (Option<BlockId>, BlockId) {
        match self.nodes[id].left {
            Some(left) => {
                let (child, min) = self.remove_min(left);
                self.nodes[id].left = child;
                (Some(self.rebalance(id)), min)
            }
            None => (self.nodes[id].right, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lineage(id: u32) -> LineageId {
        LineageId(id)
    }

    #[test]
    fn test_insert_select_in_key_order() {
        let mut index = LineageIndex::new();
        index.insert(3.0, lineage(1)).unwrap();
        index.insert(1.0, lineage(2)).unwrap();
        index.insert(2.0, lineage(3)).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.select(0), Some(lineage(2)));
        assert_eq!(index.select(1), Some(lineage(3)));
        assert_eq!(index.select(2), Some(lineage(1)));
        assert_eq!(index.select(3), None);
    }

    #[test]
    fn test_duplicate_keys_ordered_by_lineage() {
        let mut index = LineageIndex::new();
        for id in [5, 2, 9, 1] {
            index.insert(0.0, lineage(id)).unwrap();
        }
        assert_eq!(
            index.in_order(),
            vec![lineage(1), lineage(2), lineage(5), lineage(9)]
        );
        assert!(index.remove(0.0, lineage(5)));
        assert!(!index.remove(0.0, lineage(5)));
        assert_eq!(index.in_order(), vec![lineage(1), lineage(2), lineage(9)]);
    }

    #[test]
    fn test_remove_rebalances() {
        let mut index = LineageIndex::new();
        for id in 0..64 {
            index.insert(id as f64, lineage(id)).unwrap();
        }
        for id in (0..64).step_by(2) {
            assert!(index.remove(id as f64, lineage(id)));
        }
        assert_eq!(index.len(), 32);
        for rank in 0..32 {
            assert_eq!(index.select(rank), Some(lineage(2 * rank as u32 + 1)));
        }
    }

    #[test]
    fn test_interleaved_churn_keeps_ranks_consistent() {
        let mut index = LineageIndex::new();
        let mut expected: Vec<(u64, u32)> = Vec::new();
        let mut state = 0x9e3779b97f4a7c15u64;
        for round in 0..500u32 {
            // cheap deterministic pseudo-random walk
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            if expected.len() > 4 && state % 3 == 0 {
                let pick = (state >> 16) as usize % expected.len();
                let (bits, id) = expected.remove(pick);
                assert!(index.remove(f64::from_bits(bits), lineage(id)));
            } else {
                let key = (state >> 11) as f64 / (1u64 << 53) as f64;
                index.insert(key, lineage(round)).unwrap();
                expected.push((key.to_bits(), round));
            }
            assert_eq!(index.len(), expected.len());
        }
        expected.sort_by(|a, b| {
            f64::from_bits(a.0)
                .total_cmp(&f64::from_bits(b.0))
                .then(a.1.cmp(&b.1))
        });
        let in_order = index.in_order();
        assert_eq!(in_order.len(), expected.len());
        for (rank, (_, id)) in expected.iter().enumerate() {
            assert_eq!(in_order[rank], lineage(*id));
            assert_eq!(index.select(rank), Some(lineage(*id)));
        }
    }
}
