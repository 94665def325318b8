//! Error types for pubsub-bench-topology

use std::path::PathBuf;

use pubsub_bench_core::BenchError;
use thiserror::Error;

/// Topology error type
#[derive(Error, Debug)]
pub enum TopologyError {
    /// The description file could not be read
    #[error("failed to read topology '{path}': {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The description is not valid JSON for a topology
    #[error("invalid topology description: {0}")]
    Json(#[from] serde_json::Error),

    /// A message type tag is not known to the registry
    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),

    /// A publisher or client period is missing, ambiguous or not positive
    #[error("invalid period for '{channel}': {reason}")]
    InvalidPeriod {
        /// Topic or service name
        channel: String,
        /// What is wrong
        reason: String,
    },

    /// Two nodes share a name
    #[error("node '{0}' is described more than once")]
    DuplicateNode(String),

    /// A node name is empty
    #[error("node names must not be empty")]
    EmptyNodeName,

    /// An index range is empty or reversed
    #[error("invalid node index range {start}..{end}")]
    InvalidRange {
        /// First index
        start: usize,
        /// One past the last index
        end: usize,
    },

    /// Node construction failed
    #[error(transparent)]
    Node(#[from] BenchError),
}

impl TopologyError {
    /// Create an invalid period error
    pub fn invalid_period(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPeriod {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type TopologyResult<T> = std::result::Result<T, TopologyError>;
