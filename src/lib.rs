//! libarcs simulates the coalescent with recombination under structured,
//! time-varying demography.
//!
//! Given a sample of chromosomes drawn from one or more populations, the
//! engine reconstructs backward in time the genealogical ancestry of every
//! site along a genomic interval and emits a compact tree sequence: the
//! ordered list of genealogies applying to successive sub-intervals of the
//! genome. An infinite-sites mutation generator can decorate finished tree
//! sequences afterwards.
//!
//! The quickest way in is [`convenience::simulate`]; full control over
//! demography, migration and recombination maps goes through
//! [`sim::SimulatorBuilder`].

pub mod convenience;
pub mod demography;
pub mod error;
mod fenwick;
pub mod mutgen;
mod pool;
pub mod recomb_map;
pub mod sim;
pub mod stats;
pub mod ts;

pub use error::{Error, Result};
pub use recomb_map::RecombinationMap;
pub use sim::{SimulationConfig, Simulator, SimulatorBuilder};
pub use ts::{CoalescenceRecord, NodeId, TreeSequence};
