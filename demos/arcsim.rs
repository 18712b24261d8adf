//! An ms-flavored command line front-end for the simulation engine.
//!
//! Covers the classic surface: sample size and replicate count, uniform
//! recombination, island-model migration, stepwise size changes (`-eN`
//! style) and growth rate changes (`-eG` style), plus infinite-sites
//! mutations on the finished tree sequences.
//!
//!     arcsim 10 3 --length 1e5 --recombination-rate 1e-8 \
//!         --population-size 1e4 --mutation-rate 1e-8 --seed 42

use anyhow::{bail, Context, Result};
use clap::Parser;

use libarcs::convenience::simulate_replicates;
use libarcs::demography::{DemographicEvent, MigrationMatrix, PopulationConfiguration};
use libarcs::mutgen::MutationGenerator;
use libarcs::{RecombinationMap, SimulatorBuilder};

#[derive(Parser, Debug)]
#[command(name = "arcsim")]
#[command(about = "Coalescent simulation with recombination", long_about = None)]
struct Args {
    /// Total number of sampled chromosomes
    samples: usize,

    /// Number of independent replicates
    #[arg(default_value = "1")]
    replicates: usize,

    /// Sequence length in bases
    #[arg(long, default_value = "1.0")]
    length: f64,

    /// Uniform per-base per-generation recombination rate
    #[arg(long, default_value = "0.0")]
    recombination_rate: f64,

    /// Population size (genome copies)
    #[arg(long, default_value = "1.0")]
    population_size: f64,

    /// Number of island-model demes; samples are spread round-robin
    #[arg(long, default_value = "1")]
    demes: usize,

    /// Per-lineage migration rate to each other deme
    #[arg(long, default_value = "0.0")]
    migration_rate: f64,

    /// Stepwise population size change, formatted TIME,SIZE (repeatable)
    #[arg(long = "size-change", value_name = "TIME,SIZE")]
    size_changes: Vec<String>,

    /// Growth rate change, formatted TIME,RATE (repeatable)
    #[arg(long = "growth-change", value_name = "TIME,RATE")]
    growth_changes: Vec<String>,

    /// Per-base per-generation infinite-sites mutation rate
    #[arg(long, default_value = "0.0")]
    mutation_rate: f64,

    /// PRNG seed
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Print every coalescence record
    #[arg(long)]
    records: bool,
}

fn parse_pair(raw: &str) -> Result<(f64, f64)> {
    let (time, value) = raw
        .split_once(',')
        .with_context(|| format!("expected TIME,VALUE, got '{}'", raw))?;
    Ok((time.trim().parse()?, value.trim().parse()?))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    let args = Args::parse();
    if args.demes == 0 {
        bail!("need at least one deme");
    }

    let mut events = Vec::new();
    for raw in &args.size_changes {
        let (time, size) = parse_pair(raw)?;
        events.push(DemographicEvent::PopulationParametersChange {
            time,
            population: None,
            initial_size: Some(size),
            growth_rate: None,
        });
    }
    for raw in &args.growth_changes {
        let (time, rate) = parse_pair(raw)?;
        events.push(DemographicEvent::PopulationParametersChange {
            time,
            population: None,
            initial_size: None,
            growth_rate: Some(rate),
        });
    }
    events.sort_by(|a, b| a.time().total_cmp(&b.time()));

    let map = RecombinationMap::uniform(args.length, args.recombination_rate)?;
    let mut builder = SimulatorBuilder::new(map)
        .default_population_size(args.population_size)
        .random_seed(args.seed)
        .num_replicates(args.replicates)
        .demographic_events(events);
    for deme in 0..args.demes {
        // round-robin sample placement across demes
        let samples = args.samples / args.demes
            + usize::from(deme < args.samples % args.demes);
        builder = builder.add_population(PopulationConfiguration::new(samples));
    }
    if args.demes > 1 {
        builder = builder.migration_matrix(MigrationMatrix::island(args.demes, args.migration_rate)?);
    }
    let config = builder.finalize();

    let replicates = simulate_replicates(&config)?;
    for (index, ts) in replicates.iter().enumerate() {
        println!("// replicate {}", index);
        println!("trees: {}", ts.num_trees());
        println!("breakpoints: {}", ts.breakpoints().len().saturating_sub(1));
        if args.records {
            for record in ts.records() {
                println!(
                    "{:.6}\t{:.6}\t{}\t{}\t{}\t{:.6}\t{}",
                    record.left,
                    record.right,
                    record.parent,
                    record.children[0],
                    record.children[1],
                    record.time,
                    record.population,
                );
            }
        }
        if args.mutation_rate > 0.0 {
            let mut generator =
                MutationGenerator::new(args.mutation_rate, args.seed.wrapping_add(index as u64))?;
            let mutations = generator.generate(ts)?;
            println!("segsites: {}", mutations.len());
            if args.records {
                for mutation in &mutations {
                    println!("mut\t{:.6}\t{}", mutation.position, mutation.node);
                }
            }
        }
    }
    Ok(())
}
