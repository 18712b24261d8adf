//! The tree-sequence builder and its interval-keyed tree iteration.
//!
//! Records arrive from the engine in event order, get sorted by
//! `(time, left)`, and are indexed twice: once by `left` ascending (the
//! order in which records enter the marginal tree when sweeping the genome
//! left to right) and once by `right` ascending (the order in which they
//! leave). Each step of the sweep then touches only the records whose
//! interval boundary lies at the current position, giving O(1) amortised
//! tree updates.

use crate::ts::{CoalescenceRecord, NodeId};

/// A genealogy valid on one genomic interval, represented as a parent array
/// over all node ids of the sequence. Roots (and nodes outside the current
/// interval's genealogy) have no parent. Child lists are maintained
/// alongside the parent array so leaf counts below a node can be computed.
pub struct Tree {
    left: f64,
    right: f64,
    parent: Vec<Option<NodeId>>,
    children: Vec<Vec<NodeId>>,
    num_samples: usize,
}

impl Tree {
    fn new(num_nodes: usize, num_samples: usize) -> Self {
        Self {
            left: 0.0,
            right: 0.0,
            parent: vec![None; num_nodes],
            children: vec![Vec::new(); num_nodes],
            num_samples,
        }
    }

    fn attach(&mut self, child: NodeId, parent: NodeId) {
        self.parent[child.0 as usize] = Some(parent);
        self.children[parent.0 as usize].push(child);
    }

    fn detach(&mut self, child: NodeId, parent: NodeId) {
        self.parent[child.0 as usize] = None;
        self.children[parent.0 as usize].retain(|&c| c != child);
    }

    /// The half-open genomic interval this tree applies to.
    pub fn interval(&self) -> (f64, f64) {
        (self.left, self.right)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.parent[node.0 as usize]
    }

    /// The parent array `pi[0..num_nodes)` with `pi[root] = None`.
    pub fn parent_array(&self) -> &[Option<NodeId>] {
        &self.parent
    }

    /// The children attached to `node` in this tree.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.children[node.0 as usize]
    }

    /// Number of sampled leaves in the subtree below (and including) `node`.
    pub fn num_leaves_below(&self, node: NodeId) -> usize {
        let mut count = 0;
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if (current.0 as usize) < self.num_samples {
                count += 1;
            }
            stack.extend(self.children[current.0 as usize].iter().copied());
        }
        count
    }

    /// The distinct roots above the sampled leaves, in leaf order.
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots = Vec::new();
        for sample in 0..self.num_samples {
            let root = self.root_of(NodeId(sample as u32));
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        roots
    }

    /// Walk to the root above `node`.
    pub fn root_of(&self, node: NodeId) -> NodeId {
        let mut current = node;
        while let Some(up) = self.parent[current.0 as usize] {
            current = up;
        }
        current
    }

    /// Most recent common ancestor of two nodes within this tree.
    pub fn mrca(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let mut seen = vec![false; self.parent.len()];
        let mut current = Some(a);
        while let Some(node) = current {
            seen[node.0 as usize] = true;
            current = self.parent[node.0 as usize];
        }
        let mut current = Some(b);
        while let Some(node) = current {
            if seen[node.0 as usize] {
                return Some(node);
            }
            current = self.parent[node.0 as usize];
        }
        None
    }
}

/// A finished tree sequence: coalescence records sorted by `(time, left)`
/// plus the node table (times and population assignments) accumulated during
/// the run.
pub struct TreeSequence {
    records: Vec<CoalescenceRecord>,
    /// record indices by `left` ascending, then time ascending
    insertion_order: Vec<usize>,
    /// record indices by `right` ascending, then time descending
    removal_order: Vec<usize>,
    node_time: Vec<f64>,
    node_population: Vec<usize>,
    sequence_length: f64,
    sample_size: usize,
}

impl TreeSequence {
    pub(crate) fn new(
        mut records: Vec<CoalescenceRecord>,
        node_time: Vec<f64>,
        node_population: Vec<usize>,
        sequence_length: f64,
        sample_size: usize,
    ) -> Self {
        records.sort_by(|a, b| {
            a.time
                .total_cmp(&b.time)
                .then(a.left.total_cmp(&b.left))
        });
        let mut insertion_order: Vec<usize> = (0..records.len()).collect();
        insertion_order.sort_by(|&a, &b| {
            records[a]
                .left
                .total_cmp(&records[b].left)
                .then(records[a].time.total_cmp(&records[b].time))
        });
        let mut removal_order: Vec<usize> = (0..records.len()).collect();
        removal_order.sort_by(|&a, &b| {
            records[a]
                .right
                .total_cmp(&records[b].right)
                .then(records[b].time.total_cmp(&records[a].time))
        });
        Self {
            records,
            insertion_order,
            removal_order,
            node_time,
            node_population,
            sequence_length,
            sample_size,
        }
    }

    /// The record stream, sorted by `(time, left)`.
    pub fn records(&self) -> &[CoalescenceRecord] {
        &self.records
    }

    pub fn sequence_length(&self) -> f64 {
        self.sequence_length
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn num_nodes(&self) -> usize {
        self.node_time.len()
    }

    /// Time of a node in generations. Leaves are at time 0.
    pub fn node_time(&self, node: NodeId) -> f64 {
        self.node_time[node.0 as usize]
    }

    /// Population a node was assigned to when it was created.
    pub fn node_population(&self, node: NodeId) -> usize {
        self.node_population[node.0 as usize]
    }

    /// The sorted distinct `left` boundaries appearing in any record,
    /// equivalently the recombination positions that survived to affect the
    /// genealogy (plus the leading 0).
    pub fn breakpoints(&self) -> Vec<f64> {
        let mut breakpoints: Vec<f64> = self.records.iter().map(|r| r.left).collect();
        breakpoints.sort_by(|a, b| a.total_cmp(b));
        breakpoints.dedup();
        breakpoints
    }

    /// Number of distinct genomic intervals with their own genealogy.
    pub fn num_trees(&self) -> usize {
        let mut count = 0;
        self.for_each_tree(|_| count += 1);
        count
    }

    /// Enumerate `(interval, tree)` pairs left to right. The same tree
    /// buffer is reused between calls, so the closure only borrows it.
    pub fn for_each_tree<F: FnMut(&Tree)>(&self, mut consumer: F) {
        let m = self.records.len();
        let mut tree = Tree::new(self.num_nodes(), self.sample_size);
        let mut next_in = 0;
        let mut next_out = 0;
        let mut left = 0.0;
        while left < self.sequence_length {
            while next_out < m && self.records[self.removal_order[next_out]].right == left {
                let record = &self.records[self.removal_order[next_out]];
                for &child in &record.children {
                    tree.detach(child, record.parent);
                }
                next_out += 1;
            }
            while next_in < m && self.records[self.insertion_order[next_in]].left == left {
                let record = &self.records[self.insertion_order[next_in]];
                for &child in &record.children {
                    tree.attach(child, record.parent);
                }
                next_in += 1;
            }
            let mut right = self.sequence_length;
            if next_in < m {
                right = right.min(self.records[self.insertion_order[next_in]].left);
            }
            if next_out < m {
                right = right.min(self.records[self.removal_order[next_out]].right);
            }
            tree.left = left;
            tree.right = right;
            consumer(&tree);
            left = right;
        }
    }

    /// Enumerate `(interval, tree)` pairs right to left.
    pub fn for_each_tree_reverse<F: FnMut(&Tree)>(&self, mut consumer: F) {
        let m = self.records.len();
        let mut tree = Tree::new(self.num_nodes(), self.sample_size);
        let mut next_in = m;
        let mut next_out = m;
        let mut right = self.sequence_length;
        while right > 0.0 {
            // detach before attach: adjacent records may share children
            while next_out > 0 && self.records[self.insertion_order[next_out - 1]].left == right {
                let record = &self.records[self.insertion_order[next_out - 1]];
                for &child in &record.children {
                    tree.detach(child, record.parent);
                }
                next_out -= 1;
            }
            while next_in > 0 && self.records[self.removal_order[next_in - 1]].right == right {
                let record = &self.records[self.removal_order[next_in - 1]];
                for &child in &record.children {
                    tree.attach(child, record.parent);
                }
                next_in -= 1;
            }
            let mut left: f64 = 0.0;
            if next_in > 0 {
                left = left.max(self.records[self.removal_order[next_in - 1]].right);
            }
            if next_out > 0 {
                left = left.max(self.records[self.insertion_order[next_out - 1]].left);
            }
            tree.left = left;
            tree.right = right;
            consumer(&tree);
            right = left;
        }
    }
}
