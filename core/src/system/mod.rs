//! System orchestrator for experiment lifecycle management
//!
//! The System coordinates a complete benchmark run:
//! - Registering nodes and assigning them to executors
//! - Waiting (bounded) for participant and endpoint discovery
//! - Driving every executor for a fixed wall-clock duration
//! - Collecting tracker statistics into per-node and total reports
//!
//! # Example
//!
//! ```ignore
//! use pubsub_bench_core::{ExecutorModel, System};
//!
//! let mut system = System::new(ExecutorModel::SingleThreaded);
//! system.add_nodes(nodes)?;
//! system.enable_events_logger("events.txt")?;
//!
//! system.spin(Duration::from_secs(10), true, true)?;
//! system.print_latency_all_stats();
//! system.save_latency_total_stats("total.txt")?;
//! ```

mod aggregator;
mod builder;
mod reporting;
mod runner;

pub use aggregator::{
    aggregate_executor_stats, build_latency_report, merge_trackers, AggregatedStats,
    ExecutorSummary, RunSummary,
};
pub use builder::SystemBuilder;
pub use runner::{RunPhase, System};
