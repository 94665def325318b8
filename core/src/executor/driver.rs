//! Executor threads and runtimes

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorModel;
use crate::error::{BenchError, BenchResult};
use crate::events::{Event, EventCode, EventsLogger};
use crate::traits::{Endpoint, Node};

use super::service::service_loop;
use super::stats::ExecutorStats;

/// Time given to runtime tasks to unwind after the executor stops
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Identifies an executor within a system
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExecutorKey {
    /// Numbered executor, shared by every node that asks for the id
    Id(usize),
    /// Executor owned by a single node
    Dedicated(String),
}

impl ExecutorKey {
    /// Key of the executor shared by nodes without an explicit id
    pub const SHARED: ExecutorKey = ExecutorKey::Id(0);
}

impl std::fmt::Display for ExecutorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorKey::Id(id) => write!(f, "{id}"),
            ExecutorKey::Dedicated(node) => write!(f, "{node}"),
        }
    }
}

/// A group of nodes driven by the same thread or thread pool
pub struct Executor {
    key: ExecutorKey,
    model: ExecutorModel,
    nodes: Vec<Arc<dyn Node>>,
}

impl Executor {
    /// Create an empty executor
    pub fn new(key: ExecutorKey, model: ExecutorModel) -> Self {
        Self {
            key,
            model,
            nodes: Vec::new(),
        }
    }

    /// Key of this executor
    pub fn key(&self) -> &ExecutorKey {
        &self.key
    }

    /// Scheduling model
    pub fn model(&self) -> ExecutorModel {
        self.model
    }

    /// Names of the assigned nodes joined with `_`
    pub fn name(&self) -> String {
        self.nodes
            .iter()
            .map(|n| n.name())
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Assign a node
    pub fn add_node(&mut self, node: Arc<dyn Node>) {
        self.nodes.push(node);
    }

    /// Assigned nodes in assignment order
    pub fn nodes(&self) -> &[Arc<dyn Node>] {
        &self.nodes
    }

    /// Number of endpoints across the assigned nodes
    pub fn endpoint_count(&self) -> usize {
        self.nodes.iter().map(|n| n.endpoints().len()).sum()
    }

    /// Build the runtime this executor will run on
    pub fn prepare(&self, name_threads: bool) -> BenchResult<PreparedExecutor> {
        let name = self.name();
        let runtime = match self.model {
            ExecutorModel::SingleThreaded => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build(),
            ExecutorModel::MultiThreaded { .. } => {
                let mut builder = tokio::runtime::Builder::new_multi_thread();
                builder
                    .worker_threads(self.model.worker_threads())
                    .enable_all();
                if name_threads {
                    builder.thread_name(format!("{name}-worker"));
                }
                builder.build()
            }
        }
        .map_err(|e| BenchError::executor(format!("failed to build runtime for '{name}': {e}")))?;

        let endpoints = self
            .nodes
            .iter()
            .flat_map(|node| {
                let node_name = node.name().to_string();
                node.endpoints()
                    .into_iter()
                    .map(move |endpoint| (node_name.clone(), endpoint))
            })
            .collect();

        Ok(PreparedExecutor {
            key: self.key.clone(),
            name,
            model: self.model,
            nodes: self.nodes.len(),
            runtime,
            endpoints,
        })
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("key", &self.key)
            .field("model", &self.model)
            .field("nodes", &self.name())
            .finish()
    }
}

/// An executor whose runtime is built and ready to start
pub struct PreparedExecutor {
    key: ExecutorKey,
    name: String,
    model: ExecutorModel,
    nodes: usize,
    runtime: Runtime,
    endpoints: Vec<(String, Arc<dyn Endpoint>)>,
}

impl PreparedExecutor {
    /// Executor name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the executor thread
    ///
    /// The thread services every endpoint until `shutdown` is cancelled.
    pub fn start(
        self,
        shutdown: CancellationToken,
        events: Option<Arc<EventsLogger>>,
        name_thread: bool,
    ) -> BenchResult<ExecutorHandle> {
        let PreparedExecutor {
            key,
            name,
            model,
            nodes,
            runtime,
            endpoints,
        } = self;

        let mut builder = std::thread::Builder::new();
        if name_thread {
            builder = builder.name(name.clone());
        }

        let thread_name = name.clone();
        let handle = builder
            .spawn(move || {
                let stats = runtime.block_on(drive(&thread_name, model, endpoints, shutdown, events));
                runtime.shutdown_timeout(SHUTDOWN_GRACE);
                stats
            })
            .map_err(|e| BenchError::executor(format!("failed to spawn executor '{name}': {e}")))?;

        tracing::debug!(executor = %name, model = %model, "Executor started");

        Ok(ExecutorHandle {
            key,
            name,
            nodes,
            handle,
        })
    }
}

async fn drive(
    executor: &str,
    model: ExecutorModel,
    endpoints: Vec<(String, Arc<dyn Endpoint>)>,
    shutdown: CancellationToken,
    events: Option<Arc<EventsLogger>>,
) -> ExecutorStats {
    let mut stats = ExecutorStats::new();
    stats.start();

    match model {
        ExecutorModel::SingleThreaded => {
            let loops = endpoints.into_iter().map(|(node, endpoint)| {
                AssertUnwindSafe(service_loop(node, endpoint, shutdown.clone(), events.clone()))
                    .catch_unwind()
            });
            for result in join_all(loops).await {
                match result {
                    Ok(loop_stats) => stats.merge(&loop_stats),
                    Err(_) => {
                        stats.panicked = true;
                        report_panic(executor, &events);
                    }
                }
            }
        }
        ExecutorModel::MultiThreaded { .. } => {
            let handles: Vec<_> = endpoints
                .into_iter()
                .map(|(node, endpoint)| {
                    tokio::spawn(service_loop(node, endpoint, shutdown.clone(), events.clone()))
                })
                .collect();
            for handle in handles {
                match handle.await {
                    Ok(loop_stats) => stats.merge(&loop_stats),
                    Err(e) if e.is_panic() => {
                        stats.panicked = true;
                        report_panic(executor, &events);
                    }
                    Err(e) => {
                        tracing::warn!(executor = %executor, error = %e, "Endpoint task cancelled");
                    }
                }
            }
        }
    }

    stats.stop();
    stats
}

fn report_panic(executor: &str, events: &Option<Arc<EventsLogger>>) {
    tracing::error!(executor = %executor, "Endpoint loop panicked");
    if let Some(events) = events {
        events.log(Event::new(
            executor,
            EventCode::ExecutorFailure,
            "endpoint loop panicked",
        ));
    }
}

/// A running executor thread
pub struct ExecutorHandle {
    key: ExecutorKey,
    name: String,
    nodes: usize,
    handle: JoinHandle<ExecutorStats>,
}

impl ExecutorHandle {
    /// Key of the executor
    pub fn key(&self) -> &ExecutorKey {
        &self.key
    }

    /// Executor name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of nodes driven by this executor
    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// Wait for the executor thread to finish
    pub fn join(self) -> BenchResult<ExecutorStats> {
        let name = self.name;
        self.handle
            .join()
            .map_err(|_| BenchError::executor(format!("executor '{name}' panicked")))
    }
}
