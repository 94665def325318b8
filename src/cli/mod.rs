//! CLI argument parsing and command dispatch

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub use commands::dispatch;

#[derive(Parser)]
#[command(name = "pubsub-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Executor scheduling model
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutorArg {
    /// One thread per executor
    Single,
    /// A thread pool per executor
    Multi,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a benchmark over a topology file
    Run {
        /// Path to the JSON topology
        #[arg(short, long)]
        topology: PathBuf,

        /// Experiment duration in seconds
        #[arg(short = 't', long, default_value_t = 5)]
        duration: u64,

        /// Executor model
        #[arg(short, long, value_enum, default_value_t = ExecutorArg::Single)]
        executor: ExecutorArg,

        /// Worker threads for the multi-threaded model (0 = all cores)
        #[arg(long, default_value_t = 0)]
        threads: usize,

        /// Put nodes without an executor id on one shared executor
        #[arg(long)]
        shared: bool,

        /// Directory receiving the reports
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Record discrete events to events.txt
        #[arg(long)]
        events: bool,

        /// Sample process resource usage to resources.txt
        #[arg(long)]
        resources: bool,

        /// Resource sampling period in milliseconds
        #[arg(long, default_value_t = 1000)]
        resource_period_ms: u64,

        /// Start measuring without waiting for discovery
        #[arg(long)]
        no_discovery: bool,

        /// Maximum wait per discovery phase in seconds
        #[arg(long, default_value_t = 30)]
        max_discovery_secs: u64,

        /// Fail instead of proceeding when discovery times out
        #[arg(long)]
        abort_on_discovery_timeout: bool,

        /// Simulated participant discovery delay in milliseconds
        #[arg(long, default_value_t = 0)]
        pdp_delay_ms: u64,

        /// Simulated endpoint discovery delay in milliseconds
        #[arg(long, default_value_t = 0)]
        edp_delay_ms: u64,

        /// Do not name executor threads
        #[arg(long)]
        no_thread_names: bool,
    },
    /// Compare total-stats files from previous runs
    Compare {
        /// Files written by `run` (latency_total.txt)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Validate a topology file
    Validate {
        /// Path to the JSON topology
        #[arg(short, long)]
        topology: PathBuf,
    },
}
