//! pubsub-bench-core: orchestration core for publish/subscribe benchmarks
//!
//! This crate provides everything needed to run a latency experiment over a
//! set of instrumented nodes, independently of the transport moving the
//! messages:
//!
//! - Capability traits (`Node`, `Endpoint`) implemented by transports
//! - The `System` orchestrator: registration, discovery wait, timed run
//! - Single- and multi-threaded executors
//! - Per-endpoint trackers and mergeable latency statistics
//! - Fixed-width reports, events log and resource usage log
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod executor;
pub mod metrics;
pub mod report;
pub mod resources;
pub mod system;
pub mod tracker;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use config::{AssignmentPolicy, ConfigError, ExecutorModel, SystemConfig, SystemInfo};
pub use discovery::{
    DiscoveryConfig, DiscoveryPhase, DiscoveryReport, DiscoveryState, DiscoveryTimeoutPolicy,
    PhaseOutcome,
};
pub use error::*;
pub use events::{Event, EventCode, EventsLogger};
pub use executor::{Executor, ExecutorKey, ExecutorStats};
pub use metrics::*;
pub use report::{LatencyReport, NodeRow, PersistedTotals, TotalRow};
pub use resources::{ResourceUsageLogger, Resources};
pub use system::{RunPhase, RunSummary, System, SystemBuilder};
pub use tracker::{SampleClass, Tracker, TrackerOptions, TrackerStats};
pub use traits::*;
