//! System configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryConfig;

/// Scheduling model of an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "model")]
pub enum ExecutorModel {
    /// One thread services every assigned endpoint; callbacks never overlap
    SingleThreaded,
    /// A fixed pool of threads; `0` uses the available parallelism
    MultiThreaded {
        /// Worker threads in the pool
        threads: usize,
    },
}

impl ExecutorModel {
    /// Number of worker threads this model will use
    pub fn worker_threads(&self) -> usize {
        match self {
            ExecutorModel::SingleThreaded => 1,
            ExecutorModel::MultiThreaded { threads: 0 } => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            ExecutorModel::MultiThreaded { threads } => *threads,
        }
    }
}

impl Default for ExecutorModel {
    fn default() -> Self {
        ExecutorModel::SingleThreaded
    }
}

impl std::fmt::Display for ExecutorModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorModel::SingleThreaded => write!(f, "single_threaded"),
            ExecutorModel::MultiThreaded { threads } => write!(f, "multi_threaded({threads})"),
        }
    }
}

/// Where nodes without an explicit executor id are placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentPolicy {
    /// Every such node gets its own executor
    #[default]
    Dedicated,
    /// Every such node shares the default executor
    Shared,
}

/// Metadata used to label results when comparing runs
///
/// Has no influence on how the experiment runs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Number of publishers in the topology
    pub pubs: usize,
    /// Number of subscribers in the topology
    pub subs: usize,
    /// Nominal publishing frequency in Hz
    pub frequency: f32,
    /// Nominal message size in bytes
    pub msg_size: usize,
}

impl SystemInfo {
    /// Create new system info
    pub fn new(pubs: usize, subs: usize, frequency: f32, msg_size: usize) -> Self {
        Self {
            pubs,
            subs,
            frequency,
            msg_size,
        }
    }
}

/// System configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Scheduling model used for every executor
    pub executor: ExecutorModel,

    /// Placement of nodes that do not request an executor
    pub assignment: AssignmentPolicy,

    /// Discovery wait settings
    pub discovery: DiscoveryConfig,

    /// Sampling period of the resource usage logger
    pub resource_period: Duration,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorModel::default(),
            assignment: AssignmentPolicy::default(),
            discovery: DiscoveryConfig::default(),
            resource_period: Duration::from_millis(1000),
        }
    }
}

impl SystemConfig {
    /// Create a config using the given executor model
    pub fn new(executor: ExecutorModel) -> Self {
        Self {
            executor,
            ..Default::default()
        }
    }

    /// Set the assignment policy
    pub fn with_assignment(mut self, assignment: AssignmentPolicy) -> Self {
        self.assignment = assignment;
        self
    }

    /// Set the discovery settings
    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    /// Set the resource sampling period
    pub fn with_resource_period(mut self, period: Duration) -> Self {
        self.resource_period = period;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let ExecutorModel::MultiThreaded { threads } = self.executor {
            if threads > 1024 {
                return Err(ConfigError::InvalidThreads(threads));
            }
        }

        if self.discovery.poll_period.is_zero() {
            return Err(ConfigError::InvalidPollPeriod);
        }

        if self.resource_period.is_zero() {
            return Err(ConfigError::InvalidResourcePeriod);
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Thread pool size is unreasonable
    #[error("invalid thread count: {0}")]
    InvalidThreads(usize),

    /// Discovery poll period is zero
    #[error("discovery poll period must be greater than zero")]
    InvalidPollPeriod,

    /// Resource sampling period is zero
    #[error("resource sampling period must be greater than zero")]
    InvalidResourcePeriod,
}
