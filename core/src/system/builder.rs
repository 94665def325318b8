//! Builder pattern for System construction

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AssignmentPolicy, ExecutorModel, SystemConfig, SystemInfo};
use crate::discovery::DiscoveryConfig;
use crate::error::BenchResult;
use crate::traits::Node;

use super::runner::System;

/// Builder for creating a System with its nodes and loggers
///
/// # Example
///
/// ```ignore
/// let mut system = SystemBuilder::new()
///     .executor(ExecutorModel::SingleThreaded)
///     .assignment(AssignmentPolicy::Dedicated)
///     .events_logger("events.txt")
///     .nodes(nodes)
///     .build()?;
///
/// system.spin_for(Duration::from_secs(10))?;
/// ```
pub struct SystemBuilder {
    config: SystemConfig,
    nodes: Vec<Arc<dyn Node>>,
    events_path: Option<PathBuf>,
    resources_path: Option<PathBuf>,
    system_info: Option<SystemInfo>,
}

impl SystemBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: SystemConfig::default(),
            nodes: Vec::new(),
            events_path: None,
            resources_path: None,
            system_info: None,
        }
    }

    /// Set the full configuration
    pub fn config(mut self, config: SystemConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the executor model
    pub fn executor(mut self, model: ExecutorModel) -> Self {
        self.config.executor = model;
        self
    }

    /// Set the assignment policy
    pub fn assignment(mut self, assignment: AssignmentPolicy) -> Self {
        self.config.assignment = assignment;
        self
    }

    /// Set the discovery settings
    pub fn discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.config.discovery = discovery;
        self
    }

    /// Set the resource sampling period
    pub fn resource_period(mut self, period: Duration) -> Self {
        self.config.resource_period = period;
        self
    }

    /// Add a node
    pub fn node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add several nodes
    pub fn nodes(mut self, nodes: impl IntoIterator<Item = Arc<dyn Node>>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    /// Log events to `path`
    pub fn events_logger(mut self, path: impl Into<PathBuf>) -> Self {
        self.events_path = Some(path.into());
        self
    }

    /// Log resource usage to `path`
    pub fn resource_logger(mut self, path: impl Into<PathBuf>) -> Self {
        self.resources_path = Some(path.into());
        self
    }

    /// Attach labels for comparing runs
    pub fn system_info(mut self, info: SystemInfo) -> Self {
        self.system_info = Some(info);
        self
    }

    /// Build the system
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails or two nodes share
    /// a name.
    pub fn build(self) -> BenchResult<System> {
        let mut system = System::with_config(self.config)?;
        system.add_nodes(self.nodes)?;
        if let Some(path) = self.events_path {
            system.enable_events_logger(path)?;
        }
        if let Some(path) = self.resources_path {
            system.enable_resource_logger(path)?;
        }
        if let Some(info) = self.system_info {
            system.set_system_info(info)?;
        }
        Ok(system)
    }
}

impl Default for SystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}
