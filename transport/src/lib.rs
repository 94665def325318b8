//! pubsub-bench-transport: in-process loopback transport
//!
//! Implements the core `Node` and `Endpoint` traits on top of tokio channels:
//!
//! - Topics are broadcast channels; services are mpsc queues with oneshot replies
//! - A shared [`Domain`] simulates participant and endpoint discovery delays
//! - Every endpoint feeds a core `Tracker`
//!
//! # Example
//!
//! ```ignore
//! let domain = Domain::new(DomainConfig::default());
//! let msg = MessageType::new("stamped10b", 10);
//!
//! let publisher = LoopbackNode::builder(domain.clone(), "talker")
//!     .add_periodic_publisher("chatter", &msg, Duration::from_millis(10))
//!     .build()?;
//! let subscriber = LoopbackNode::builder(domain, "listener")
//!     .add_subscriber("chatter", &msg)
//!     .build()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod domain;
pub mod endpoints;
pub mod message;
pub mod node;

pub use domain::{Domain, DomainConfig};
pub use endpoints::{PeriodicClient, PeriodicPublisher, Server, Subscriber};
pub use message::{MessageType, Request, Stamped};
pub use node::{LoopbackNode, LoopbackNodeBuilder};
