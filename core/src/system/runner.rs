//! System lifecycle: registration, discovery, timed run

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::{AssignmentPolicy, ExecutorModel, SystemConfig, SystemInfo};
use crate::discovery::{
    wait_for_discovery, DiscoveryPhase, DiscoveryReport, DiscoveryState, DiscoveryTimeoutPolicy,
};
use crate::error::{BenchError, BenchResult};
use crate::events::{Event, EventCode, EventsLogger};
use crate::executor::{Executor, ExecutorHandle, ExecutorKey, ExecutorStats};
use crate::report::LatencyReport;
use crate::resources::ResourceUsageLogger;
use crate::traits::Node;

use super::aggregator::{aggregate_executor_stats, build_latency_report, ExecutorSummary, RunSummary};

const CALLER: &str = "system";

/// Lifecycle phase of a system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Nodes and loggers can still be added
    Building,
    /// `spin` is in progress
    Running,
    /// `spin` returned
    Finished,
}

/// Benchmark orchestrator
///
/// Owns the node roster and its executors, waits for discovery, runs the
/// experiment for a fixed duration and aggregates what the trackers
/// collected.
pub struct System {
    pub(super) config: SystemConfig,
    pub(super) nodes: Vec<Arc<dyn Node>>,
    names: HashSet<String>,
    executors: BTreeMap<ExecutorKey, Executor>,
    pub(super) events: Option<Arc<EventsLogger>>,
    pub(super) resources: Option<ResourceUsageLogger>,
    pub(super) system_info: Option<SystemInfo>,
    discovery_state: DiscoveryState,
    discovery_report: Option<DiscoveryReport>,
    phase: RunPhase,
    pub(super) summary: Option<RunSummary>,
}

impl System {
    /// Create a system using `model` for every executor and default settings
    pub fn new(model: ExecutorModel) -> Self {
        Self::from_parts(SystemConfig::new(model))
    }

    /// Create a system from a full configuration
    pub fn with_config(config: SystemConfig) -> BenchResult<Self> {
        config
            .validate()
            .map_err(|e| BenchError::config(e.to_string()))?;
        Ok(Self::from_parts(config))
    }

    fn from_parts(config: SystemConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            names: HashSet::new(),
            executors: BTreeMap::new(),
            events: None,
            resources: None,
            system_info: None,
            discovery_state: DiscoveryState::NotStarted,
            discovery_report: None,
            phase: RunPhase::Building,
            summary: None,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Registered nodes in registration order
    pub fn nodes(&self) -> &[Arc<dyn Node>] {
        &self.nodes
    }

    /// Executors by key
    pub fn executors(&self) -> &BTreeMap<ExecutorKey, Executor> {
        &self.executors
    }

    /// Discovery status
    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery_state
    }

    /// Discovery timings, once discovery ran
    pub fn discovery_report(&self) -> Option<&DiscoveryReport> {
        self.discovery_report.as_ref()
    }

    /// Summary of the finished run
    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    fn ensure_building(&self) -> BenchResult<()> {
        match self.phase {
            RunPhase::Building => Ok(()),
            _ => Err(BenchError::RosterLocked),
        }
    }

    fn default_key(&self, node: &dyn Node) -> ExecutorKey {
        match node.executor_id() {
            Some(id) => ExecutorKey::Id(id),
            None => match self.config.assignment {
                AssignmentPolicy::Shared => ExecutorKey::SHARED,
                AssignmentPolicy::Dedicated => ExecutorKey::Dedicated(node.name().to_string()),
            },
        }
    }

    fn insert(&mut self, node: Arc<dyn Node>, key: ExecutorKey) {
        let model = self.config.executor;
        tracing::debug!(node = node.name(), executor = %key, "Node registered");
        self.names.insert(node.name().to_string());
        self.executors
            .entry(key.clone())
            .or_insert_with(|| Executor::new(key, model))
            .add_node(Arc::clone(&node));
        self.nodes.push(node);
    }

    /// Register a node
    ///
    /// The node goes to the executor it asks for, otherwise where the
    /// assignment policy puts it.
    pub fn add_node(&mut self, node: Arc<dyn Node>) -> BenchResult<()> {
        self.ensure_building()?;
        if self.names.contains(node.name()) {
            return Err(BenchError::DuplicateNode(node.name().to_string()));
        }
        let key = self.default_key(node.as_ref());
        self.insert(node, key);
        Ok(())
    }

    /// Register a node on a specific executor
    pub fn add_node_to(&mut self, node: Arc<dyn Node>, key: ExecutorKey) -> BenchResult<()> {
        self.ensure_building()?;
        if self.names.contains(node.name()) {
            return Err(BenchError::DuplicateNode(node.name().to_string()));
        }
        self.insert(node, key);
        Ok(())
    }

    /// Register several nodes in order
    ///
    /// Either every node is registered or, on error, none is.
    pub fn add_nodes<I>(&mut self, nodes: I) -> BenchResult<()>
    where
        I: IntoIterator<Item = Arc<dyn Node>>,
    {
        self.ensure_building()?;
        let nodes: Vec<Arc<dyn Node>> = nodes.into_iter().collect();

        let mut batch = HashSet::new();
        for node in &nodes {
            if self.names.contains(node.name()) || !batch.insert(node.name()) {
                return Err(BenchError::DuplicateNode(node.name().to_string()));
            }
        }

        for node in nodes {
            let key = self.default_key(node.as_ref());
            self.insert(node, key);
        }
        Ok(())
    }

    /// Record discrete events to `path`
    ///
    /// If the file cannot be created the error is logged and the run
    /// proceeds without an events log.
    pub fn enable_events_logger(&mut self, path: impl AsRef<Path>) -> BenchResult<()> {
        self.ensure_building()?;
        let path = path.as_ref();
        match EventsLogger::create(path) {
            Ok(logger) => self.events = Some(Arc::new(logger)),
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "Could not create events file, events logging disabled"
                );
            }
        }
        Ok(())
    }

    /// Sample resource usage to `path` during the run
    pub fn enable_resource_logger(&mut self, path: impl AsRef<Path>) -> BenchResult<()> {
        self.ensure_building()?;
        self.resources = Some(ResourceUsageLogger::new(path));
        Ok(())
    }

    /// Attach labels used when comparing runs
    pub fn set_system_info(&mut self, info: SystemInfo) -> BenchResult<()> {
        if self.phase != RunPhase::Building {
            return Err(BenchError::SystemInfoLocked);
        }
        self.system_info = Some(info);
        Ok(())
    }

    /// Per-node and system-wide latency tables
    pub fn latency_report(&self) -> LatencyReport {
        build_latency_report(&self.nodes, self.discovery_state, self.system_info)
    }

    fn log_event(&self, code: EventCode, description: impl Into<String>) {
        if let Some(events) = &self.events {
            events.log(Event::new(CALLER, code, description));
        }
    }

    /// Run for `duration` after waiting for discovery, with named threads
    pub fn spin_for(&mut self, duration: Duration) -> BenchResult<RunSummary> {
        self.spin(duration, true, true)
    }

    /// Run the experiment
    ///
    /// Builds every executor, optionally waits for discovery, starts the
    /// resource logger and the executor threads, sleeps for `duration`, then
    /// stops and joins everything. Can only be called once.
    pub fn spin(
        &mut self,
        duration: Duration,
        wait_for_discovery: bool,
        name_threads: bool,
    ) -> BenchResult<RunSummary> {
        if self.phase != RunPhase::Building {
            return Err(BenchError::AlreadyStarted);
        }
        if Instant::now().checked_add(duration).is_none() {
            return Err(BenchError::config(format!("duration {duration:?} is too long")));
        }
        self.phase = RunPhase::Running;

        let result = self.run(duration, wait_for_discovery, name_threads);
        self.phase = RunPhase::Finished;
        let summary = result?;
        self.summary = Some(summary.clone());
        Ok(summary)
    }

    fn run(
        &mut self,
        duration: Duration,
        wait: bool,
        name_threads: bool,
    ) -> BenchResult<RunSummary> {
        tracing::info!(
            nodes = self.nodes.len(),
            executors = self.executors.len(),
            model = %self.config.executor,
            duration_ms = duration.as_millis() as u64,
            "Starting experiment"
        );

        let prepared = self
            .executors
            .values()
            .map(|executor| executor.prepare(name_threads))
            .collect::<BenchResult<Vec<_>>>()?;

        if wait {
            self.discover()?;
        } else {
            self.discovery_state = DiscoveryState::Skipped;
        }

        let start = Instant::now();
        let deadline = start
            .checked_add(duration)
            .ok_or_else(|| BenchError::config(format!("duration {duration:?} is too long")))?;
        let started_at = Utc::now();
        if let Some(events) = &self.events {
            events.set_start_time(start);
        }
        self.log_event(
            EventCode::ExperimentStart,
            format!("duration {} ms", duration.as_millis()),
        );

        if let Some(resources) = self.resources.as_mut() {
            if let Some(info) = self.system_info {
                resources.set_system_info(info.pubs, info.subs, info.frequency)?;
            }
            resources.start(self.config.resource_period);
        }

        let shutdown = CancellationToken::new();
        let mut handles: Vec<ExecutorHandle> = Vec::with_capacity(prepared.len());
        for executor in prepared {
            match executor.start(shutdown.clone(), self.events.clone(), name_threads) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shutdown.cancel();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    if let Some(resources) = self.resources.as_mut() {
                        resources.stop();
                    }
                    return Err(e);
                }
            }
        }

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(deadline - now);
        }

        shutdown.cancel();

        let mut executors = Vec::with_capacity(handles.len());
        let mut stats = Vec::with_capacity(handles.len());
        for handle in handles {
            let key = handle.key().to_string();
            let name = handle.name().to_string();
            let nodes = handle.node_count();
            let (executor_stats, failed) = match handle.join() {
                Ok(s) => {
                    let failed = s.panicked;
                    (s, failed)
                }
                Err(e) => {
                    tracing::error!(executor = %name, error = %e, "Executor failed");
                    self.log_event(EventCode::ExecutorFailure, e.to_string());
                    (ExecutorStats::default(), true)
                }
            };
            executors.push(ExecutorSummary {
                key,
                name,
                model: self.config.executor,
                nodes,
                callbacks: executor_stats.callbacks,
                errors: executor_stats.errors,
                failed,
            });
            stats.push(executor_stats);
        }

        if let Some(resources) = self.resources.as_mut() {
            resources.stop();
        }

        let elapsed = start.elapsed();
        self.log_event(
            EventCode::ExperimentEnd,
            format!("elapsed {} ms", elapsed.as_millis()),
        );

        let totals = aggregate_executor_stats(&stats);
        tracing::info!(
            elapsed_ms = elapsed.as_millis() as u64,
            callbacks = totals.total_callbacks,
            errors = totals.total_errors,
            "Experiment finished"
        );

        Ok(RunSummary {
            started_at,
            requested: duration,
            elapsed,
            discovery: self.discovery_state,
            discovery_report: self.discovery_report,
            executors,
            totals,
            latency: self.latency_report().total_rows,
            system_info: self.system_info,
        })
    }

    fn discover(&mut self) -> BenchResult<()> {
        self.discovery_state = DiscoveryState::Waiting(DiscoveryPhase::Participants);
        let report = wait_for_discovery(&self.nodes, &self.config.discovery);
        self.discovery_state = DiscoveryState::from(&report);
        self.discovery_report = Some(report);

        let Some((phase, waited)) = report.timed_out_phase() else {
            return Ok(());
        };

        self.log_event(
            EventCode::DiscoveryTimeout,
            format!("{} discovery incomplete after {} ms", phase, waited.as_millis()),
        );

        match self.config.discovery.timeout_policy {
            DiscoveryTimeoutPolicy::Proceed => {
                tracing::warn!(phase = %phase, "Discovery incomplete, starting experiment anyway");
                Ok(())
            }
            DiscoveryTimeoutPolicy::Abort => Err(BenchError::DiscoveryTimeout { phase, waited }),
        }
    }
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("config", &self.config)
            .field("nodes", &self.nodes.len())
            .field("executors", &self.executors)
            .field("phase", &self.phase)
            .field("discovery", &self.discovery_state)
            .finish()
    }
}
