//! Executors drive the endpoints of their nodes
//!
//! Each executor owns one OS thread running a tokio runtime:
//!
//! - `SingleThreaded`: a current-thread runtime; every endpoint loop of every
//!   assigned node is joined on that one thread, so callbacks never overlap.
//! - `MultiThreaded`: a fixed worker pool; each endpoint loop is its own task,
//!   so different endpoints may run concurrently while a single endpoint is
//!   never re-entered.
//!
//! An endpoint loop repeatedly awaits [`Endpoint::service`](crate::traits::Endpoint::service)
//! until the shared cancellation token fires.
//!
//! # Example
//!
//! ```ignore
//! let mut executor = Executor::new(ExecutorKey::SHARED, ExecutorModel::SingleThreaded);
//! executor.add_node(node);
//!
//! let shutdown = CancellationToken::new();
//! let handle = executor.prepare(true)?.start(shutdown.clone(), None, true)?;
//! std::thread::sleep(Duration::from_secs(1));
//! shutdown.cancel();
//! let stats = handle.join()?;
//! ```

mod driver;
mod service;
mod stats;

pub use driver::{Executor, ExecutorHandle, ExecutorKey, PreparedExecutor};
pub use service::service_loop;
pub use stats::ExecutorStats;
