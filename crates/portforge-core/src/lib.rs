//! Port-mapping inference from black-box throughput measurements.
//!
//! A candidate mapping assigns every instruction a multiset of uops, each
//! uop being a bitmask over the execution ports it may run on. The
//! throughput model predicts an experiment's cycles per iteration from a
//! mapping, and an evolutionary search drives a population of candidate
//! mappings toward the measured values.

pub mod arch;
pub mod channel;
pub mod config;
pub mod error;
pub mod eval;
pub mod experiment;
pub mod fitness;
pub mod mapping;
pub mod parse;
pub mod population;
pub mod rng;
pub mod runner;
pub mod util;

pub use arch::{Architecture, Instruction};
pub use config::Config;
pub use error::{PfResult, PortForgeError};
pub use eval::EvalInfo;
pub use experiment::Experiment;
pub use fitness::Fitness;
pub use mapping::Mapping;
pub use population::{Individual, Origin, Population};
pub use rng::RngPool;
pub use runner::{Runner, RunnerOptions};
