//! Single-locus behavior: the exact shape of the minimal record stream,
//! determinism, and the Monte-Carlo TMRCA expectations of the unstructured
//! coalescent.

mod common;

use libarcs::NodeId;

#[test]
fn test_two_samples_yield_exactly_one_record() {
    let ts = common::single_population(2, 1.0, 1.0, 0.0, 1).run().unwrap();
    assert_eq!(ts.records().len(), 1);
    let record = &ts.records()[0];
    assert_eq!(record.left, 0.0);
    assert_eq!(record.right, 1.0);
    assert_eq!(record.parent, NodeId::from_usize(2));
    assert_eq!(record.children, vec![NodeId::from_usize(0), NodeId::from_usize(1)]);
    assert!(record.time > 0.0);
}

#[test]
fn test_fixed_seed_reproduces_the_record_stream() {
    let first = common::single_population(7, 5.0, 10.0, 0.2, 4711).run().unwrap();
    let second = common::single_population(7, 5.0, 10.0, 0.2, 4711).run().unwrap();
    assert_eq!(first.records(), second.records());
    assert_eq!(first.breakpoints(), second.breakpoints());
}

#[test]
fn test_leaves_present_at_time_zero_in_every_tree() {
    let ts = common::single_population(6, 2.0, 4.0, 0.5, 9).run().unwrap();
    for sample in 0..6 {
        assert_eq!(ts.node_time(NodeId::from_usize(sample)), 0.0);
    }
    ts.for_each_tree(|tree| {
        let root = tree.root_of(NodeId::from_usize(0));
        for sample in 0..6 {
            // every leaf hangs off the same root in every tree
            assert_eq!(tree.root_of(NodeId::from_usize(sample)), root);
        }
    });
}

#[test]
fn test_times_increase_along_every_leaf_to_root_path() {
    let ts = common::single_population(8, 3.0, 2.0, 1.0, 31).run().unwrap();
    ts.for_each_tree(|tree| {
        for sample in 0..8 {
            let mut node = NodeId::from_usize(sample);
            let mut time = ts.node_time(node);
            while let Some(parent) = tree.parent(node) {
                let parent_time = ts.node_time(parent);
                assert!(parent_time > time);
                node = parent;
                time = parent_time;
            }
        }
    });
}

#[test]
fn test_pair_tmrca_matches_expectation() {
    // mean pair coalescence time is N generations under the hazard 1/N
    let replicates = 3000;
    let population_size = 1.0;
    let mut heights = Vec::with_capacity(replicates);
    for replicate in 0..replicates {
        let ts = common::single_population(2, population_size, 1.0, 0.0, 10_000 + replicate as u64)
            .run()
            .unwrap();
        heights.push(common::tree_height(&ts));
    }
    let observed = common::mean(&heights);
    assert!(
        (observed - population_size).abs() < 0.08,
        "mean pair TMRCA {} too far from {}",
        observed,
        population_size
    );
}

#[test]
fn test_tree_height_matches_expectation_for_larger_samples() {
    // E[height] = 2N(1 - 1/n)
    let replicates = 4000;
    let n = 5;
    let population_size = 1.0;
    let expected = 2.0 * population_size * (1.0 - 1.0 / n as f64);
    let mut heights = Vec::with_capacity(replicates);
    for replicate in 0..replicates {
        let ts = common::single_population(n, population_size, 1.0, 0.0, 50_000 + replicate as u64)
            .run()
            .unwrap();
        heights.push(common::tree_height(&ts));
    }
    let observed = common::mean(&heights);
    assert!(
        (observed - expected).abs() < 0.1,
        "mean tree height {} too far from {}",
        observed,
        expected
    );
}
