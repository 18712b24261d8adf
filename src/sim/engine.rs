//! The simulation engine: Hudson's algorithm over ancestral segments.
//!
//! The engine runs a continuous-time competing-hazard loop. Each iteration
//! computes the total event rate of the current configuration (coalescence
//! per population, recombination from the Fenwick total, migration per
//! population), draws an exponential waiting time, lets any scheduled
//! demographic event preempt the candidate time, and otherwise dispatches
//! one event chosen proportionally to the rates. Coalescences stream
//! [`CoalescenceRecord`]s into the tree-sequence builder; the run terminates
//! when every site has reached its most recent common ancestor, at which
//! point no lineage remains.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use serde::Serialize;
use tracing::{debug, trace};

use crate::demography::{DemographicEvent, MigrationMatrix, PopulationState};
use crate::error::{Error, Result};
use crate::fenwick::Fenwick;
use crate::sim::avl::LineageIndex;
use crate::sim::segment::{SegmentId, SegmentStore};
use crate::sim::{validate_config, LineageId, SimulationConfig};
use crate::ts::{CoalescenceRecord, NodeId, TreeSequence};

/// An extant lineage: the head of its segment chain, the population it
/// currently sits in, and the key it was filed under in that population's
/// index (the head's left endpoint at insertion time).
#[derive(Debug, Clone)]
struct Lineage {
    head: SegmentId,
    population: usize,
    key: f64,
}

/// Total order for genomic positions used as keys of the overlap-count map.
/// Positions are finite and non-negative, so `total_cmp` agrees with the
/// usual order.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PosKey(f64);

impl Eq for PosKey {}

impl PartialOrd for PosKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PosKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Counters accumulated over one run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStatistics {
    pub num_common_ancestor_events: u64,
    pub num_recombination_events: u64,
    pub num_migration_events: u64,
    pub num_demographic_events: u64,
    pub num_steps: u64,
    pub peak_lineages: usize,
    /// Simulation time at which the last lineage disappeared.
    pub end_time: f64,
}

enum EventKind {
    Recombination,
    CommonAncestor(usize),
    Migration(usize),
}

/// A single-replicate coalescent simulation. Owns all mutable state; not
/// thread-safe, by design. See [`crate::convenience`] for a replicate driver
/// that parallelises across independent engines.
pub struct Simulator {
    config: SimulationConfig,
    rng: SmallRng,
    time: f64,
    segments: SegmentStore,
    /// Lineage table indexed by [`LineageId`]; slot 0 is never used.
    lineages: Vec<Option<Lineage>>,
    free_lineage_ids: Vec<LineageId>,
    /// Per-lineage recombination weights, indexed by lineage id.
    fenwick: Fenwick,
    populations: Vec<PopulationState>,
    /// One lineage index per population.
    indexes: Vec<LineageIndex>,
    migration: MigrationMatrix,
    pending_events: VecDeque<DemographicEvent>,
    /// Overlap counts: maps a breakpoint to the number of lineages that must
    /// still coalesce on `[breakpoint, successor)`. Intervals at count 2
    /// reach their MRCA with the next coalescence and drop to 0.
    overlap: BTreeMap<PosKey, i64>,
    records: Vec<CoalescenceRecord>,
    node_time: Vec<f64>,
    node_population: Vec<usize>,
    sample_size: usize,
    stats: RunStatistics,
    cancel: Option<Arc<AtomicBool>>,
    finished: bool,
}

impl Simulator {
    /// Validate `config` and set up the initial state: one lineage per
    /// sampled chromosome, each carrying a single segment covering the whole
    /// genome.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        validate_config(&config)?;
        let num_populations = config.populations.len();
        let sample_size: usize = config.populations.iter().map(|p| p.sample_size).sum();
        let sequence_length = config.recombination_map.sequence_length();

        let populations = config
            .populations
            .iter()
            .map(|p| {
                PopulationState::new(
                    p.initial_size.unwrap_or(config.default_population_size),
                    p.growth_rate,
                )
            })
            .collect();
        let migration = config
            .migration_matrix
            .clone()
            .unwrap_or_else(|| MigrationMatrix::zero(num_populations));

        let mut overlap = BTreeMap::new();
        overlap.insert(PosKey(0.0), sample_size as i64);
        overlap.insert(PosKey(sequence_length), -1);

        let mut simulator = Self {
            rng: SmallRng::seed_from_u64(config.random_seed),
            time: 0.0,
            segments: SegmentStore::with_capacity(2 * sample_size, config.max_segments),
            lineages: vec![None],
            free_lineage_ids: Vec::new(),
            fenwick: Fenwick::new(sample_size + 1),
            populations,
            indexes: (0..num_populations).map(|_| LineageIndex::new()).collect(),
            migration,
            pending_events: config.demographic_events.iter().cloned().collect(),
            overlap,
            records: Vec::new(),
            node_time: Vec::new(),
            node_population: Vec::new(),
            sample_size,
            stats: RunStatistics::default(),
            cancel: None,
            finished: false,
            config,
        };
        simulator.insert_samples()?;
        Ok(simulator)
    }

    /// Discard all run state and reinitialise for a fresh replicate driven
    /// by `seed`. The configuration is unchanged, so no re-validation is
    /// needed.
    pub fn reset(&mut self, seed: u64) -> Result<()> {
        self.rng = SmallRng::seed_from_u64(seed);
        self.time = 0.0;
        self.segments =
            SegmentStore::with_capacity(2 * self.sample_size, self.config.max_segments);
        self.lineages = vec![None];
        self.free_lineage_ids.clear();
        self.fenwick = Fenwick::new(self.sample_size + 1);
        self.populations = self
            .config
            .populations
            .iter()
            .map(|p| {
                PopulationState::new(
                    p.initial_size.unwrap_or(self.config.default_population_size),
                    p.growth_rate,
                )
            })
            .collect();
        for index in self.indexes.iter_mut() {
            *index = LineageIndex::new();
        }
        self.migration = self
            .config
            .migration_matrix
            .clone()
            .unwrap_or_else(|| MigrationMatrix::zero(self.config.populations.len()));
        self.pending_events = self.config.demographic_events.iter().cloned().collect();
        self.overlap.clear();
        self.overlap.insert(PosKey(0.0), self.sample_size as i64);
        self.overlap.insert(
            PosKey(self.config.recombination_map.sequence_length()),
            -1,
        );
        self.records.clear();
        self.node_time.clear();
        self.node_population.clear();
        self.stats = RunStatistics::default();
        self.finished = false;
        self.insert_samples()
    }

    fn insert_samples(&mut self) -> Result<()> {
        let sequence_length = self.config.recombination_map.sequence_length();
        for (population, config) in self.config.populations.clone().iter().enumerate() {
            for _ in 0..config.sample_size {
                let node = NodeId(self.node_time.len() as u32);
                self.node_time.push(0.0);
                self.node_population.push(population);
                let head = self
                    .segments
                    .alloc(0.0, sequence_length, node, population)?;
                self.insert_lineage(head, population)?;
            }
        }
        Ok(())
    }

    /// Install a cooperative cancellation flag, checked once per main-loop
    /// iteration.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    /// Current number of extant lineages across all populations.
    pub fn num_lineages(&self) -> usize {
        self.indexes.iter().map(|index| index.len()).sum()
    }

    /// Run the replicate to completion and build its tree sequence.
    pub fn run(&mut self) -> Result<TreeSequence> {
        if self.finished {
            return Err(Error::internal("simulator has already been run"));
        }
        debug!(
            samples = self.sample_size,
            populations = self.populations.len(),
            seed = self.config.random_seed,
            "starting replicate"
        );
        while self.num_lineages() > 0 {
            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(Error::Cancelled);
                }
            }
            self.stats.num_steps += 1;
            if let Some(budget) = self.config.step_budget {
                if self.stats.num_steps > budget {
                    return Err(Error::numeric(
                        self.time,
                        format!(
                            "step budget of {} exhausted with {} lineages remaining",
                            budget,
                            self.num_lineages()
                        ),
                    ));
                }
            }
            self.step()?;
        }
        self.stats.end_time = self.time;
        self.finished = true;
        debug!(
            time = self.time,
            records = self.records.len(),
            steps = self.stats.num_steps,
            "replicate finished"
        );
        Ok(TreeSequence::new(
            self.records.clone(),
            self.node_time.clone(),
            self.node_population.clone(),
            self.config.recombination_map.sequence_length(),
            self.sample_size,
        ))
    }

    fn step(&mut self) -> Result<()> {
        let num_populations = self.populations.len();
        let mut coalescence_rates = vec![0.0; num_populations];
        let mut migration_rates = vec![0.0; num_populations];
        for population in 0..num_populations {
            let k = self.indexes[population].len() as f64;
            if k >= 2.0 {
                let size = self.populations[population].size_at(self.time);
                if !(size > 0.0) || !size.is_finite() {
                    return Err(Error::numeric(
                        self.time,
                        format!(
                            "population {} has effective size {} with {} lineages",
                            population, size, k
                        ),
                    ));
                }
                coalescence_rates[population] = k * (k - 1.0) / (2.0 * size);
            }
            if k >= 1.0 {
                migration_rates[population] = k * self.migration.row_sum(population);
            }
        }
        let recombination_rate = self.fenwick.total().max(0.0);
        let lambda: f64 = recombination_rate
            + coalescence_rates.iter().sum::<f64>()
            + migration_rates.iter().sum::<f64>();
        if !lambda.is_finite() {
            return Err(Error::numeric(self.time, "total event rate is not finite"));
        }
        if lambda <= 0.0 {
            // nothing can happen by chance; a scheduled event may still
            // change that
            return match self.pending_events.pop_front() {
                Some(event) => {
                    self.time = self.time.max(event.time());
                    self.execute_demographic_event(event)
                }
                None => Err(Error::numeric(
                    self.time,
                    format!(
                        "total event rate is zero with {} lineages remaining",
                        self.num_lineages()
                    ),
                )),
            };
        }

        let wait = Exp::new(lambda)
            .map_err(|_| Error::internal("exponential rate must be positive"))?
            .sample(&mut self.rng);
        let candidate = self.time + wait;
        if let Some(event) = self.pending_events.front() {
            if event.time() <= candidate {
                let event = self.pending_events.pop_front().unwrap();
                self.time = self.time.max(event.time());
                return self.execute_demographic_event(event);
            }
        }
        self.time = candidate;
        trace!(time = self.time, lambda, "sampling event");

        match self.choose_event(recombination_rate, &coalescence_rates, &migration_rates, lambda) {
            EventKind::Recombination => self.recombination_event(),
            EventKind::CommonAncestor(population) => self.common_ancestor_event(population),
            EventKind::Migration(population) => self.migration_event(population),
        }
    }

    /// Sample the event kind proportionally to the rates. Floating-point
    /// residue in the final comparison falls through to the last category
    /// with positive rate, so the choice is always well defined.
    fn choose_event(
        &mut self,
        recombination_rate: f64,
        coalescence_rates: &[f64],
        migration_rates: &[f64],
        lambda: f64,
    ) -> EventKind {
        let mut u = self.rng.random::<f64>() * lambda;
        let mut last = None;
        if recombination_rate > 0.0 {
            if u < recombination_rate {
                return EventKind::Recombination;
            }
            last = Some(EventKind::Recombination);
        }
        u -= recombination_rate;
        for (population, &rate) in coalescence_rates.iter().enumerate() {
            if rate > 0.0 {
                if u < rate {
                    return EventKind::CommonAncestor(population);
                }
                last = Some(EventKind::CommonAncestor(population));
            }
            u -= rate;
        }
        for (population, &rate) in migration_rates.iter().enumerate() {
            if rate > 0.0 {
                if u < rate {
                    return EventKind::Migration(population);
                }
                last = Some(EventKind::Migration(population));
            }
            u -= rate;
        }
        last.expect("positive total rate implies a positive category")
    }

    // ------------------------------------------------------------------
    // lineage bookkeeping
    // ------------------------------------------------------------------

    fn alloc_lineage_id(&mut self) -> LineageId {
        if let Some(id) = self.free_lineage_ids.pop() {
            return id;
        }
        let id = LineageId(self.lineages.len() as u32);
        self.lineages.push(None);
        if self.fenwick.size() < id.0 as usize {
            self.fenwick.grow(id.0 as usize);
        }
        id
    }

    /// Genetic length of the recombinable span of a chain.
    fn chain_weight(&self, head: SegmentId) -> f64 {
        let tail = self.segments.tail_of(head);
        let map = &self.config.recombination_map;
        map.physical_to_genetic(self.segments[tail].right)
            - map.physical_to_genetic(self.segments[head].left)
    }

    /// Register a fresh lineage for the chain starting at `head` and file it
    /// in `population`'s index.
    fn insert_lineage(&mut self, head: SegmentId, population: usize) -> Result<LineageId> {
        let id = self.alloc_lineage_id();
        let key = self.segments[head].left;
        let weight = self.chain_weight(head);
        if weight < 0.0 {
            return Err(Error::internal(format!(
                "negative recombination weight {} for lineage {}",
                weight, id
            )));
        }
        self.fenwick.set(id.0 as usize, weight);
        self.indexes[population].insert(key, id)?;
        self.lineages[id.0 as usize] = Some(Lineage {
            head,
            population,
            key,
        });
        let extant = self.num_lineages();
        if extant > self.stats.peak_lineages {
            self.stats.peak_lineages = extant;
        }
        Ok(id)
    }

    /// Unregister a lineage, releasing its id to the freelist. The segment
    /// chain itself is left to the caller.
    fn remove_lineage(&mut self, id: LineageId) -> Result<Lineage> {
        let lineage = self.lineages[id.0 as usize]
            .take()
            .ok_or_else(|| Error::internal(format!("lineage {} is not live", id)))?;
        if !self.indexes[lineage.population].remove(lineage.key, id) {
            return Err(Error::internal(format!(
                "lineage {} missing from population {} index",
                id, lineage.population
            )));
        }
        self.fenwick.set(id.0 as usize, 0.0);
        self.free_lineage_ids.push(id);
        Ok(lineage)
    }

    // ------------------------------------------------------------------
    // recombination
    // ------------------------------------------------------------------

    fn recombination_event(&mut self) -> Result<()> {
        let total = self.fenwick.total();
        let u = self.rng.random::<f64>() * total;
        if !(u > 0.0) {
            return Ok(());
        }
        let id = LineageId(self.fenwick.find(u) as u32);
        let lineage = self.lineages[id.0 as usize]
            .clone()
            .ok_or_else(|| Error::internal(format!("recombination drew dead lineage {}", id)))?;
        let head = lineage.head;
        let head_left = self.segments[head].left;
        let tail = self.segments.tail_of(head);
        let tail_right = self.segments[tail].right;

        // map the residual weight into genetic space, then back to a
        // physical breakpoint within this lineage's span
        let map = &self.config.recombination_map;
        let offset = u - self.fenwick.prefix_sum(id.0 as usize - 1);
        let genetic = (map.physical_to_genetic(head_left) + offset)
            .min(map.total_genetic_length());
        let breakpoint = map.genetic_to_physical(genetic);
        if breakpoint <= head_left || breakpoint >= tail_right {
            // all material would fall on one side: a no-op recombination
            return Ok(());
        }

        // first segment with material right of the breakpoint
        let mut split = head;
        while self.segments[split].right <= breakpoint {
            split = self.segments[split]
                .next
                .ok_or_else(|| Error::internal("breakpoint beyond chain tail"))?;
        }
        let new_head;
        let old_tail;
        if self.segments[split].left >= breakpoint {
            // breakpoint falls in the gap before `split`: clean cut
            let prev = self.segments[split]
                .prev
                .ok_or_else(|| Error::internal("breakpoint before chain head"))?;
            self.segments[prev].next = None;
            self.segments[split].prev = None;
            new_head = split;
            old_tail = prev;
        } else {
            // split the straddling segment
            let right_half = self.segments.alloc(
                breakpoint,
                self.segments[split].right,
                self.segments[split].node,
                self.segments[split].population,
            )?;
            let after = self.segments[split].next;
            self.segments[right_half].next = after;
            if let Some(after) = after {
                self.segments[after].prev = Some(right_half);
            }
            self.segments[split].right = breakpoint;
            self.segments[split].next = None;
            new_head = right_half;
            old_tail = split;
        }

        let map = &self.config.recombination_map;
        let old_weight = map.physical_to_genetic(self.segments[old_tail].right)
            - map.physical_to_genetic(head_left);
        self.fenwick.set(id.0 as usize, old_weight);
        self.insert_lineage(new_head, lineage.population)?;
        self.stats.num_recombination_events += 1;
        trace!(time = self.time, lineage = id.0, breakpoint, "recombination");
        Ok(())
    }

    // ------------------------------------------------------------------
    // coalescence
    // ------------------------------------------------------------------

    fn common_ancestor_event(&mut self, population: usize) -> Result<()> {
        let k = self.indexes[population].len();
        debug_assert!(k >= 2);
        let first = self.rng.random_range(0..k);
        let mut second = self.rng.random_range(0..k - 1);
        if second >= first {
            second += 1;
        }
        let a = self.indexes[population]
            .select(first)
            .ok_or_else(|| Error::internal("rank selection failed"))?;
        let b = self.indexes[population]
            .select(second)
            .ok_or_else(|| Error::internal("rank selection failed"))?;
        let lineage_a = self.remove_lineage(a)?;
        let lineage_b = self.remove_lineage(b)?;
        self.merge_two_lineages(population, lineage_a.head, lineage_b.head)?;
        self.stats.num_common_ancestor_events += 1;
        Ok(())
    }

    /// Merge two segment chains via a sweep on `left`, emitting one
    /// coalescence record per sub-interval on which both chains carry
    /// material. All such records share one freshly allocated parent node.
    /// Sub-intervals whose overlap count reaches zero have found their MRCA
    /// and are dropped from further tracking.
    fn merge_two_lineages(
        &mut self,
        population: usize,
        x_head: SegmentId,
        y_head: SegmentId,
    ) -> Result<()> {
        let mut x = Some(x_head);
        let mut y = Some(y_head);
        let mut merged_head: Option<SegmentId> = None;
        let mut merged_tail: Option<SegmentId> = None;
        let mut parent = NodeId(0);
        let mut coalescence = false;

        while x.is_some() || y.is_some() {
            let mut alpha: Option<SegmentId> = None;
            if x.is_none() || y.is_none() {
                // one side is exhausted; the rest of the other passes
                // through as a whole chain
                alpha = x.take().or_else(|| y.take());
            } else {
                let mut x_id = x.unwrap();
                let mut y_id = y.unwrap();
                if self.segments[y_id].left < self.segments[x_id].left {
                    std::mem::swap(&mut x_id, &mut y_id);
                    x = Some(x_id);
                    y = Some(y_id);
                }
                let x_left = self.segments[x_id].left;
                let x_right = self.segments[x_id].right;
                let y_left = self.segments[y_id].left;
                if x_right <= y_left {
                    // disjoint: x passes through untouched
                    let next = self.segments[x_id].next;
                    self.segments[x_id].next = None;
                    if let Some(next) = next {
                        self.segments[next].prev = None;
                    }
                    x = next;
                    alpha = Some(x_id);
                } else if x_left != y_left {
                    // x overhangs on the left: split off the overhang as a
                    // pass-through segment
                    let overhang = self.segments.alloc(
                        x_left,
                        y_left,
                        self.segments[x_id].node,
                        population,
                    )?;
                    self.segments[x_id].left = y_left;
                    alpha = Some(overhang);
                } else {
                    // both carry material starting at x_left: coalesce
                    if !coalescence {
                        coalescence = true;
                        parent = NodeId(self.node_time.len() as u32);
                        self.node_time.push(self.time);
                        self.node_population.push(population);
                    }
                    let left = x_left;
                    let right_max = x_right.min(self.segments[y_id].right);
                    self.ensure_overlap_key(left)?;
                    self.ensure_overlap_key(right_max)?;
                    let right;
                    if self.overlap_count(left)? == 2 {
                        // only these two remained here: the interval has
                        // reached its MRCA and leaves the simulation
                        *self.overlap.get_mut(&PosKey(left)).unwrap() = 0;
                        right = self.overlap_successor(left)?;
                    } else {
                        let mut cursor = left;
                        while cursor < right_max && self.overlap_count(cursor)? != 2 {
                            let count = self.overlap.get_mut(&PosKey(cursor)).unwrap();
                            *count -= 1;
                            if *count < 2 {
                                return Err(Error::internal(format!(
                                    "overlap count dropped below 2 at position {}",
                                    cursor
                                )));
                            }
                            cursor = self.overlap_successor(cursor)?;
                        }
                        right = cursor;
                        alpha = Some(self.segments.alloc(left, right, parent, population)?);
                    }
                    let children = vec![self.segments[x_id].node, self.segments[y_id].node];
                    self.records.push(CoalescenceRecord::new(
                        left,
                        right,
                        parent,
                        children,
                        self.time,
                        population,
                    ));
                    x = self.trim_after_coalescence(x_id, right)?;
                    y = self.trim_after_coalescence(y_id, right)?;
                }
            }
            if let Some(alpha) = alpha {
                match merged_tail {
                    Some(tail)
                        if self.segments[tail].right == self.segments[alpha].left
                            && self.segments[tail].node == self.segments[alpha].node =>
                    {
                        // defragment: absorb alpha into the tail
                        self.segments[tail].right = self.segments[alpha].right;
                        let after = self.segments[alpha].next;
                        self.segments[tail].next = after;
                        if let Some(after) = after {
                            self.segments[after].prev = Some(tail);
                        }
                        self.segments.free(alpha);
                        merged_tail = Some(self.segments.tail_of(tail));
                    }
                    Some(tail) => {
                        self.segments[tail].next = Some(alpha);
                        self.segments[alpha].prev = Some(tail);
                        merged_tail = Some(self.segments.tail_of(alpha));
                    }
                    None => {
                        self.segments[alpha].prev = None;
                        merged_head = Some(alpha);
                        merged_tail = Some(self.segments.tail_of(alpha));
                    }
                }
            }
        }

        if let Some(head) = merged_head {
            self.insert_lineage(head, population)?;
        }
        Ok(())
    }

    /// Advance a chain past a coalesced sub-interval ending at `right`.
    fn trim_after_coalescence(
        &mut self,
        id: SegmentId,
        right: f64,
    ) -> Result<Option<SegmentId>> {
        if self.segments[id].right == right {
            let next = self.segments[id].next;
            if let Some(next) = next {
                self.segments[next].prev = None;
            }
            self.segments.free(id);
            Ok(next)
        } else {
            if self.segments[id].right < right {
                return Err(Error::internal("coalesced past the end of a segment"));
            }
            self.segments[id].left = right;
            Ok(Some(id))
        }
    }

    fn overlap_count(&self, position: f64) -> Result<i64> {
        self.overlap
            .get(&PosKey(position))
            .copied()
            .ok_or_else(|| Error::internal(format!("no overlap count at position {}", position)))
    }

    /// Make sure `position` is a key of the overlap map, copying the count
    /// of the interval it falls into.
    fn ensure_overlap_key(&mut self, position: f64) -> Result<()> {
        let key = PosKey(position);
        if self.overlap.contains_key(&key) {
            return Ok(());
        }
        let (_, &count) = self
            .overlap
            .range(..key)
            .next_back()
            .ok_or_else(|| Error::internal(format!("position {} below overlap map", position)))?;
        self.overlap.insert(key, count);
        Ok(())
    }

    fn overlap_successor(&self, position: f64) -> Result<f64> {
        self.overlap
            .range((Bound::Excluded(PosKey(position)), Bound::Unbounded))
            .next()
            .map(|(key, _)| key.0)
            .ok_or_else(|| Error::internal(format!("position {} above overlap map", position)))
    }

    // ------------------------------------------------------------------
    // migration
    // ------------------------------------------------------------------

    fn migration_event(&mut self, source: usize) -> Result<()> {
        let row_total = self.migration.row_sum(source);
        let mut u = self.rng.random::<f64>() * row_total;
        let num_populations = self.populations.len();
        let mut destination = None;
        for candidate in 0..num_populations {
            if candidate == source {
                continue;
            }
            let rate = self.migration.rate(source, candidate);
            if rate > 0.0 {
                destination = Some(candidate);
                if u < rate {
                    break;
                }
            }
            u -= rate;
        }
        let destination = destination
            .ok_or_else(|| Error::internal("migration event without positive destination rate"))?;
        let k = self.indexes[source].len();
        let rank = self.rng.random_range(0..k);
        let id = self.indexes[source]
            .select(rank)
            .ok_or_else(|| Error::internal("rank selection failed"))?;
        self.move_lineage(id, destination)?;
        self.stats.num_migration_events += 1;
        trace!(time = self.time, lineage = id.0, source, destination, "migration");
        Ok(())
    }

    /// Move one lineage to `destination`, relabelling its segments.
    fn move_lineage(&mut self, id: LineageId, destination: usize) -> Result<()> {
        let lineage = self.lineages[id.0 as usize]
            .as_ref()
            .ok_or_else(|| Error::internal(format!("lineage {} is not live", id)))?
            .clone();
        if !self.indexes[lineage.population].remove(lineage.key, id) {
            return Err(Error::internal(format!(
                "lineage {} missing from population {} index",
                id, lineage.population
            )));
        }
        let mut segment = Some(lineage.head);
        while let Some(current) = segment {
            self.segments[current].population = destination;
            segment = self.segments[current].next;
        }
        self.indexes[destination].insert(lineage.key, id)?;
        self.lineages[id.0 as usize] = Some(Lineage {
            head: lineage.head,
            population: destination,
            key: lineage.key,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // demographic events
    // ------------------------------------------------------------------

    fn execute_demographic_event(&mut self, event: DemographicEvent) -> Result<()> {
        debug!(time = self.time, event = ?event, "demographic event");
        self.stats.num_demographic_events += 1;
        match event {
            DemographicEvent::PopulationParametersChange {
                time,
                population,
                initial_size,
                growth_rate,
            } => {
                match population {
                    Some(population) => self.populations[population]
                        .change_parameters(time, initial_size, growth_rate),
                    None => {
                        for state in self.populations.iter_mut() {
                            state.change_parameters(time, initial_size, growth_rate);
                        }
                    }
                }
                Ok(())
            }
            DemographicEvent::MigrationRateChange {
                rate, matrix_index, ..
            } => {
                match matrix_index {
                    Some((source, destination)) => {
                        self.migration.set_rate(source, destination, rate)
                    }
                    None => self.migration.set_all(rate),
                }
                Ok(())
            }
            DemographicEvent::MassMigration {
                source,
                destination,
                proportion,
                ..
            } => {
                // independent draws over the source lineages, visited in
                // index order for reproducibility
                let candidates = self.indexes[source].in_order();
                for id in candidates {
                    if self.rng.random::<f64>() < proportion {
                        self.move_lineage(id, destination)?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demography::PopulationConfiguration;
    use crate::recomb_map::RecombinationMap;
    use crate::sim::SimulatorBuilder;

    fn single_population(n: usize, size: f64, rate: f64, seed: u64) -> Simulator {
        SimulatorBuilder::new(RecombinationMap::uniform(1.0, rate).unwrap())
            .sample_size(n)
            .default_population_size(size)
            .random_seed(seed)
            .build()
            .unwrap()
    }

    #[test]
    fn test_two_samples_single_locus() {
        let mut simulator = single_population(2, 1.0, 0.0, 13);
        let ts = simulator.run().unwrap();
        assert_eq!(ts.records().len(), 1);
        let record = &ts.records()[0];
        assert_eq!(record.left, 0.0);
        assert_eq!(record.right, 1.0);
        assert_eq!(record.parent, NodeId(2));
        assert_eq!(record.children, vec![NodeId(0), NodeId(1)]);
        assert!(record.time > 0.0);
        assert_eq!(simulator.statistics().num_common_ancestor_events, 1);
        assert_eq!(simulator.statistics().num_recombination_events, 0);
    }

    #[test]
    fn test_all_segments_released_at_the_end() {
        let mut simulator = single_population(8, 2.0, 0.8, 99);
        simulator.run().unwrap();
        assert_eq!(simulator.segments.len(), 0);
        assert_eq!(simulator.num_lineages(), 0);
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let run = |seed| {
            let mut simulator = single_population(5, 3.0, 1.5, seed);
            simulator.run().unwrap().records().to_vec()
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }

    #[test]
    fn test_records_tile_genome_under_recombination() {
        let mut simulator = single_population(6, 2.0, 2.0, 1234);
        let ts = simulator.run().unwrap();
        assert!(simulator.statistics().num_recombination_events > 0);
        for record in ts.records() {
            assert!(0.0 <= record.left && record.left < record.right && record.right <= 1.0);
            assert!(record.time > 0.0);
        }
        // every site must reach an MRCA: trees have a single root spanning
        // all samples
        ts.for_each_tree(|tree| {
            let root = tree.root_of(NodeId(0));
            for sample in 0..6 {
                assert_eq!(tree.root_of(NodeId(sample)), root);
            }
        });
    }

    #[test]
    fn test_isolated_demes_error_out() {
        let mut simulator = SimulatorBuilder::new(RecombinationMap::uniform(1.0, 0.0).unwrap())
            .add_population(PopulationConfiguration::with_size(1, 1.0))
            .add_population(PopulationConfiguration::with_size(1, 1.0))
            .random_seed(3)
            .build()
            .unwrap();
        assert!(matches!(simulator.run(), Err(Error::Numeric { .. })));
    }

    #[test]
    fn test_mass_migration_rescues_isolated_demes() {
        let mut simulator = SimulatorBuilder::new(RecombinationMap::uniform(1.0, 0.0).unwrap())
            .add_population(PopulationConfiguration::with_size(1, 1.0))
            .add_population(PopulationConfiguration::with_size(1, 1.0))
            .demographic_events(vec![DemographicEvent::MassMigration {
                time: 5.0,
                source: 1,
                destination: 0,
                proportion: 1.0,
            }])
            .random_seed(3)
            .build()
            .unwrap();
        let ts = simulator.run().unwrap();
        assert_eq!(ts.records().len(), 1);
        assert!(ts.records()[0].time >= 5.0);
        assert_eq!(ts.records()[0].population, 0);
    }

    #[test]
    fn test_reset_reproduces_a_replicate() {
        let mut simulator = single_population(5, 2.0, 1.0, 17);
        let first = simulator.run().unwrap();
        simulator.reset(17).unwrap();
        let replay = simulator.run().unwrap();
        assert_eq!(first.records(), replay.records());
        simulator.reset(18).unwrap();
        let other = simulator.run().unwrap();
        assert_ne!(first.records(), other.records());
    }

    #[test]
    fn test_cancellation() {
        let mut simulator = single_population(40, 1000.0, 10.0, 5);
        let flag = Arc::new(AtomicBool::new(true));
        simulator.set_cancel_flag(flag);
        assert!(matches!(simulator.run(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_step_budget_exhaustion() {
        let mut simulator = SimulatorBuilder::new(RecombinationMap::uniform(1.0, 0.0).unwrap())
            .sample_size(20)
            .default_population_size(1000.0)
            .step_budget(3)
            .random_seed(11)
            .build()
            .unwrap();
        assert!(matches!(simulator.run(), Err(Error::Numeric { .. })));
    }
}
