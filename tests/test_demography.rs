//! Demographic events: bottlenecks, schedules spanning several populations,
//! and the epoch view of the demography debugger.

mod common;

use libarcs::demography::{
    DemographicEvent, DemographyDebugger, MigrationMatrix, PopulationConfiguration,
};
use libarcs::{Error, RecombinationMap, SimulatorBuilder};

#[test]
fn test_bottleneck_pulls_tmrca_down() {
    // a crash to size 1 at generation 100 forces almost all coalescence
    // right after it, far below the un-bottlenecked expectation of
    // 2N(1 - 1/3) ~ 13333 generations
    let replicates = 300;
    let mut heights = Vec::with_capacity(replicates);
    for replicate in 0..replicates {
        let ts = SimulatorBuilder::new(RecombinationMap::uniform(1.0, 0.0).unwrap())
            .sample_size(3)
            .default_population_size(10_000.0)
            .demographic_events(vec![DemographicEvent::PopulationParametersChange {
                time: 100.0,
                population: None,
                initial_size: Some(1.0),
                growth_rate: None,
            }])
            .random_seed(3000 + replicate as u64)
            .build()
            .unwrap()
            .run()
            .unwrap();
        heights.push(common::tree_height(&ts));
    }
    let observed = common::mean(&heights);
    assert!(
        observed < 1000.0,
        "bottlenecked mean TMRCA {} not markedly below 13333",
        observed
    );
    assert!(observed > 90.0);
}

#[test]
fn test_isolated_demes_cannot_coalesce() {
    let result = SimulatorBuilder::new(RecombinationMap::uniform(1.0, 0.0).unwrap())
        .add_population(PopulationConfiguration::with_size(1, 1.0))
        .add_population(PopulationConfiguration::with_size(1, 1.0))
        .migration_matrix(MigrationMatrix::zero(2))
        .random_seed(1)
        .build()
        .unwrap()
        .run();
    assert!(matches!(result, Err(Error::Numeric { .. })));
}

#[test]
fn test_step_budget_catches_non_coalescing_models() {
    // with recombination the event rate never hits zero, so the step budget
    // has to cut the run off instead
    let result = SimulatorBuilder::new(RecombinationMap::uniform(10.0, 0.5).unwrap())
        .add_population(PopulationConfiguration::with_size(1, 1.0))
        .add_population(PopulationConfiguration::with_size(1, 1.0))
        .step_budget(10_000)
        .random_seed(2)
        .build()
        .unwrap()
        .run();
    assert!(matches!(result, Err(Error::Numeric { .. })));
}

/// A scaled-down three-population divergence history in the shape of the
/// classic out-of-Africa models: two successive population mergers moving
/// backward in time, with size changes at the merge times.
fn out_of_africa_events() -> Vec<DemographicEvent> {
    vec![
        DemographicEvent::MassMigration {
            time: 50.0,
            source: 2,
            destination: 1,
            proportion: 1.0,
        },
        DemographicEvent::PopulationParametersChange {
            time: 50.0,
            population: Some(1),
            initial_size: Some(40.0),
            growth_rate: Some(0.0),
        },
        DemographicEvent::MigrationRateChange {
            time: 50.0,
            rate: 0.0,
            matrix_index: None,
        },
        DemographicEvent::MassMigration {
            time: 120.0,
            source: 1,
            destination: 0,
            proportion: 1.0,
        },
        DemographicEvent::PopulationParametersChange {
            time: 120.0,
            population: Some(0),
            initial_size: Some(70.0),
            growth_rate: None,
        },
    ]
}

fn out_of_africa_populations() -> Vec<PopulationConfiguration> {
    vec![
        PopulationConfiguration::with_size(3, 100.0),
        PopulationConfiguration::with_growth(2, 80.0, 0.002),
        PopulationConfiguration::with_growth(2, 60.0, 0.004),
    ]
}

#[test]
fn test_debugger_epochs_match_scheduled_times() {
    let debugger = DemographyDebugger::new(
        &out_of_africa_populations(),
        100.0,
        &MigrationMatrix::island(3, 0.005).unwrap(),
        &out_of_africa_events(),
    )
    .unwrap();
    assert_eq!(debugger.epoch_boundaries(), vec![50.0, 120.0]);
    let epochs = debugger.epochs();
    assert_eq!(epochs.len(), 3);
    // the size change at the first boundary is visible in the second epoch
    assert_eq!(epochs[1].sizes_at_start[1], 40.0);
    assert_eq!(epochs[1].growth_rates[1], 0.0);
    assert_eq!(epochs[2].sizes_at_start[0], 70.0);
    // rendering shows one block per epoch
    assert_eq!(debugger.to_string().matches("epoch [").count(), 3);
}

#[test]
fn test_three_population_history_runs_to_completion() {
    // demes are isolated until the scheduled mergers, so the final
    // coalescences are guaranteed to happen after the last merger
    let mut simulator = SimulatorBuilder::new(RecombinationMap::uniform(100.0, 0.005).unwrap())
        .add_population(out_of_africa_populations()[0].clone())
        .add_population(out_of_africa_populations()[1].clone())
        .add_population(out_of_africa_populations()[2].clone())
        .migration_matrix(MigrationMatrix::zero(3))
        .demographic_events(out_of_africa_events())
        .random_seed(404)
        .build()
        .unwrap();
    let ts = simulator.run().unwrap();
    assert_eq!(simulator.statistics().num_demographic_events, 5);
    assert!(!ts.records().is_empty());
    // everything left coalesces in the ancestral population
    let last = ts.records().last().unwrap();
    assert_eq!(last.population, 0);
    assert!(last.time > 120.0);
    ts.for_each_tree(|tree| {
        let root = tree.root_of(libarcs::NodeId::from_usize(0));
        for sample in 0..7 {
            assert_eq!(tree.root_of(libarcs::NodeId::from_usize(sample)), root);
        }
    });
}
