//! Capability traits implemented by transports
//!
//! The orchestrator only sees nodes and endpoints through these traits, so it
//! stays independent of concrete message types and of the transport that
//! moves them. Implementations live in their own crates (`transport/`).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::events::EventCode;
use crate::tracker::Tracker;

// ============================================================================
// Endpoint
// ============================================================================

/// Role of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// Periodic topic publisher
    Publisher,
    /// Topic subscriber
    Subscriber,
    /// Periodic service client
    Client,
    /// Service server
    Server,
}

impl EndpointKind {
    /// All kinds in report order
    pub const ALL: [EndpointKind; 4] = [
        EndpointKind::Publisher,
        EndpointKind::Subscriber,
        EndpointKind::Client,
        EndpointKind::Server,
    ];

    /// Kind this endpoint has to be matched with before it can receive traffic
    ///
    /// Only receiving sides wait on a counterpart during endpoint discovery.
    pub fn counterpart(&self) -> Option<EndpointKind> {
        match self {
            EndpointKind::Subscriber => Some(EndpointKind::Publisher),
            EndpointKind::Client => Some(EndpointKind::Server),
            EndpointKind::Publisher | EndpointKind::Server => None,
        }
    }

    /// Lowercase label used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Publisher => "publisher",
            EndpointKind::Subscriber => "subscriber",
            EndpointKind::Client => "client",
            EndpointKind::Server => "server",
        }
    }
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EndpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EndpointKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown endpoint kind '{s}'"))
    }
}

/// Static description of an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// Role
    pub kind: EndpointKind,
    /// Topic or service name
    pub channel: String,
    /// Message type tag
    pub msg_type: String,
}

impl EndpointInfo {
    /// Create a new endpoint description
    pub fn new(kind: EndpointKind, channel: impl Into<String>, msg_type: impl Into<String>) -> Self {
        Self {
            kind,
            channel: channel.into(),
            msg_type: msg_type.into(),
        }
    }
}

/// Something worth recording in the events log, reported by an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Event category
    pub code: EventCode,
    /// Human readable detail
    pub description: String,
}

impl Notice {
    /// Create a new notice
    pub fn new(code: EventCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

/// A single instrumented endpoint
///
/// `service` waits for the endpoint's next unit of work (timer tick, incoming
/// message, incoming request) and handles it. Executors call it in a loop
/// and never call it concurrently for the same endpoint.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Static description
    fn info(&self) -> &EndpointInfo;

    /// Tracker fed by this endpoint
    fn tracker(&self) -> &Arc<Tracker>;

    /// Wait for and service one unit of work
    async fn service(&self) -> Result<Option<Notice>, TransportError>;
}

// ============================================================================
// Node
// ============================================================================

/// A named benchmark participant owning instrumented endpoints
pub trait Node: Send + Sync {
    /// Unique node name
    fn name(&self) -> &str;

    /// Executor this node asks to be placed on, if any
    fn executor_id(&self) -> Option<usize> {
        None
    }

    /// Every endpoint of this node, in declaration order
    fn endpoints(&self) -> Vec<Arc<dyn Endpoint>>;

    /// Names of the participants this node's transport has discovered
    fn discovered_participants(&self) -> Vec<String>;

    /// Number of counterpart endpoints currently matched with `endpoint`
    fn matched_endpoints(&self, endpoint: &EndpointInfo) -> usize;

    /// Trackers of every endpoint of `kind`
    fn trackers(&self, kind: EndpointKind) -> Vec<Arc<Tracker>> {
        self.endpoints()
            .iter()
            .filter(|e| e.info().kind == kind)
            .map(|e| Arc::clone(e.tracker()))
            .collect()
    }

    /// Publisher trackers
    fn pub_trackers(&self) -> Vec<Arc<Tracker>> {
        self.trackers(EndpointKind::Publisher)
    }

    /// Subscriber trackers
    fn sub_trackers(&self) -> Vec<Arc<Tracker>> {
        self.trackers(EndpointKind::Subscriber)
    }

    /// Client trackers
    fn client_trackers(&self) -> Vec<Arc<Tracker>> {
        self.trackers(EndpointKind::Client)
    }

    /// Server trackers
    fn server_trackers(&self) -> Vec<Arc<Tracker>> {
        self.trackers(EndpointKind::Server)
    }
}
