//! Ancestral segments and the pooled store they live in.
//!
//! A segment is one maximal contiguous genomic interval carried by a lineage
//! that is ancestral to at least one sample. Segments of one lineage form a
//! doubly-linked list ordered by `left`; the links are pool indices, so the
//! whole population of segments lives in one allocation and churn during
//! recombination and coalescence never touches the global allocator.

use std::ops::{Index, IndexMut};

use crate::error::Result;
use crate::pool::{BlockId, ObjectPool};
use crate::ts::NodeId;

/// Handle of a segment inside the [`SegmentStore`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct SegmentId(pub(crate) BlockId);

/// One ancestral segment `[left, right)`.
///
/// `node` is the most recent node in the emerging genealogy carrying this
/// material. Within a lineage the segments are non-overlapping and sorted
/// ascending; `prev == None` marks the head.
#[derive(Debug, Clone, Default)]
pub(crate) struct Segment {
    pub(crate) left: f64,
    pub(crate) right: f64,
    pub(crate) node: NodeId,
    pub(crate) population: usize,
    pub(crate) prev: Option<SegmentId>,
    pub(crate) next: Option<SegmentId>,
}

pub(crate) struct SegmentStore {
    pool: ObjectPool<Segment>,
}

impl SegmentStore {
    pub(crate) fn new(max_segments: Option<usize>) -> Self {
        Self {
            pool: ObjectPool::new(max_segments),
        }
    }

    pub(crate) fn with_capacity(capacity: usize, max_segments: Option<usize>) -> Self {
        Self {
            pool: ObjectPool::with_capacity(capacity, max_segments),
        }
    }

    pub(crate) fn alloc(
        &mut self,
        left: f64,
        right: f64,
        node: NodeId,
        population: usize,
    ) -> Result<SegmentId> {
        debug_assert!(left < right);
        let id = self.pool.alloc()?;
        let segment = &mut self.pool[id];
        segment.left = left;
        segment.right = right;
        segment.node = node;
        segment.population = population;
        Ok(SegmentId(id))
    }

    pub(crate) fn free(&mut self, id: SegmentId) {
        self.pool.free(id.0);
    }

    /// Number of live segments.
    pub(crate) fn len(&self) -> usize {
        self.pool.len()
    }

    /// Walk to the last segment of the chain starting at `head`.
    pub(crate) fn tail_of(&self, head: SegmentId) -> SegmentId {
        let mut current = head;
        while let Some(next) = self[current].next {
            current = next;
        }
        current
    }

    /// Number of segments in the chain starting at `head`.
    #[cfg(test)]
    pub(crate) fn chain_len(&self, head: SegmentId) -> usize {
        let mut count = 1;
        let mut current = head;
        while let Some(next) = self[current].next {
            current = next;
            count += 1;
        }
        count
    }
}

impl Index<SegmentId> for SegmentStore {
    type Output = Segment;

    fn index(&self, id: SegmentId) -> &Segment {
        &self.pool[id.0]
    }
}

impl IndexMut<SegmentId> for SegmentStore {
    fn index_mut(&mut self, id: SegmentId) -> &mut Segment {
        &mut self.pool[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_links() {
        let mut store = SegmentStore::new(None);
        let a = store.alloc(0.0, 1.0, NodeId(0), 0).unwrap();
        let b = store.alloc(2.0, 3.0, NodeId(0), 0).unwrap();
        store[a].next = Some(b);
        store[b].prev = Some(a);
        assert_eq!(store.tail_of(a), b);
        assert_eq!(store.chain_len(a), 2);
        assert_eq!(store.len(), 2);
        store.free(b);
        store[a].next = None;
        assert_eq!(store.tail_of(a), a);
        assert_eq!(store.len(), 1);
    }
}
