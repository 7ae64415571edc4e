//! Mining orchestration for pagemine.
//!
//! A [`MiningOrchestrator`] owns named instances (`Ready → Running →
//! Completed | Failed`). A running instance mines its URLs one by one through
//! the crawl policy engine and browser pool, extracts page structure,
//! attributes and custom outputs, and appends every result to its topic's
//! [`DataBundle`].

pub mod bundle;
pub mod error;
pub mod events;
pub mod extractors;
mod instance;
pub mod orchestrator;
mod queue;
pub mod store;
pub mod types;

pub use {
    bundle::DataBundle,
    error::{MinerError, Result},
    events::MinerEvent,
    extractors::CustomExtractorFn,
    orchestrator::MiningOrchestrator,
    store::{MemoryResultStore, NoopResultStore, ResultStore},
    types::{ExtractionResult, InstanceId, InstanceStats, InstanceStatus, ResultStatus},
};
