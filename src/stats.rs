//! Summary statistics over finished tree sequences and their mutations.
//!
//! These are the quantities the classic coalescent expectations are stated
//! in, which makes them the workhorses of statistical validation: genome-
//! averaged TMRCA and total branch length, segregating sites, nucleotide
//! diversity, and the histogram of realised breakpoints.

use crate::mutgen::InfiniteSitesMutation;
use crate::ts::{NodeId, TreeSequence};

/// Genome-averaged time to the most recent common ancestor: the root time
/// of each tree weighted by the fraction of the genome it covers.
pub fn mean_tmrca(tree_sequence: &TreeSequence) -> f64 {
    let mut weighted = 0.0;
    tree_sequence.for_each_tree(|tree| {
        let (left, right) = tree.interval();
        let root = tree.root_of(NodeId::from_usize(0));
        weighted += (right - left) * tree_sequence.node_time(root);
    });
    weighted / tree_sequence.sequence_length()
}

/// Genome-averaged total branch length. Every record contributes one branch
/// per child over its interval, so the sum needs no tree traversal.
pub fn total_branch_length(tree_sequence: &TreeSequence) -> f64 {
    let mut weighted = 0.0;
    for record in tree_sequence.records() {
        let span = record.right - record.left;
        for &child in &record.children {
            weighted += span * (record.time - tree_sequence.node_time(child));
        }
    }
    weighted / tree_sequence.sequence_length()
}

/// Number of segregating sites under the infinite-sites model.
pub fn segregating_sites(mutations: &[InfiniteSitesMutation]) -> usize {
    mutations.len()
}

/// Mean number of pairwise differences (nucleotide diversity). Mutations
/// must be sorted by position, as produced by the mutation generator.
pub fn pairwise_diversity(
    tree_sequence: &TreeSequence,
    mutations: &[InfiniteSitesMutation],
) -> f64 {
    let n = tree_sequence.sample_size() as f64;
    let mut diversity = 0.0;
    let mut next = 0;
    tree_sequence.for_each_tree(|tree| {
        let (_, right) = tree.interval();
        while next < mutations.len() && mutations[next].position < right {
            let below = tree.num_leaves_below(mutations[next].node) as f64;
            diversity += 2.0 * below * (n - below) / (n * (n - 1.0));
            next += 1;
        }
    });
    diversity
}

/// Histogram of realised breakpoints over `num_bins` equal-width bins. The
/// leading 0 boundary is not a breakpoint and is excluded.
pub fn breakpoint_histogram(tree_sequence: &TreeSequence, num_bins: usize) -> Vec<usize> {
    let mut bins = vec![0; num_bins];
    let length = tree_sequence.sequence_length();
    for breakpoint in tree_sequence.breakpoints() {
        if breakpoint > 0.0 {
            let bin = (breakpoint / length * num_bins as f64) as usize;
            bins[bin.min(num_bins - 1)] += 1;
        }
    }
    bins
}
