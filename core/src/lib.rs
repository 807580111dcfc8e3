//! Synthetic AML dataset generation: per-customer lifecycle timelines,
//! SCD2 status and address histories, baseline transactions, and labelled
//! anomaly injection.

pub mod address;
pub mod anomaly;
pub mod config;
pub mod engine;
pub mod error;
pub mod horizon;
pub mod ids;
pub mod linker;
pub mod names;
pub mod output;
pub mod partition;
pub mod registry;
pub mod rng;
pub mod status;
pub mod store;
pub mod timeline;
pub mod transactions;
pub mod updates;
pub mod types;

pub use config::SynthConfig;
pub use engine::{Dataset, RunSummary, SynthEngine};
pub use error::{ConfigError, SynthError, SynthResult};
