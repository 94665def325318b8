//! pubsub-bench-topology: describe and build benchmark topologies
//!
//! - [`TopologyDescription`]: serde model of a JSON topology file
//! - [`MessageRegistry`]: resolves message type tags such as `stamped10kb`
//! - [`NodeFactory`]: builds loopback nodes from tags, index ranges or files
//!
//! # Example
//!
//! ```ignore
//! let factory = NodeFactory::new(Domain::new(DomainConfig::default()));
//! let (nodes, info) = factory.load_topology("topology.json", TrackerOptions::default())?;
//!
//! let mut system = System::new(ExecutorModel::SingleThreaded);
//! system.add_nodes(nodes)?;
//! system.set_system_info(info)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod description;
pub mod error;
pub mod factory;
pub mod registry;

pub use description::{
    ClientDescription, NodeDescription, PublisherDescription, ServerDescription,
    SubscriberDescription, TopologyDescription, DEFAULT_PERIOD,
};
pub use error::{TopologyError, TopologyResult};
pub use factory::{node_name, NodeFactory};
pub use registry::MessageRegistry;
