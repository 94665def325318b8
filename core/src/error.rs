//! Error types for pubsub-bench-core

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::discovery::DiscoveryPhase;

/// Core error type
#[derive(Error, Debug)]
pub enum BenchError {
    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A node with the same name is already registered
    #[error("node '{0}' is already registered")]
    DuplicateNode(String),

    /// The roster can no longer change because the experiment started
    #[error("nodes and loggers cannot be changed after spin has started")]
    RosterLocked,

    /// `spin` was called more than once on the same system
    #[error("the experiment has already been started")]
    AlreadyStarted,

    /// System info must be set before resource logging starts
    #[error("system info must be set before the resource logger is started")]
    SystemInfoLocked,

    /// Discovery did not complete and the timeout policy is `Abort`
    #[error("{phase} discovery did not complete within {waited:?}")]
    DiscoveryTimeout {
        /// Phase that timed out
        phase: DiscoveryPhase,
        /// Time spent waiting on that phase
        waited: Duration,
    },

    /// Executor could not be prepared or started
    #[error("executor error: {0}")]
    Executor(String),

    /// A persisted report could not be parsed
    #[error("failed to parse report '{path}': {reason}")]
    ReportParse {
        /// File being parsed
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an executor error
    pub fn executor(message: impl Into<String>) -> Self {
        Self::Executor(message.into())
    }

    /// Create a report parse error
    pub fn report_parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ReportParse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a caller configuration mistake
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BenchError::Config(_)
                | BenchError::DuplicateNode(_)
                | BenchError::RosterLocked
                | BenchError::AlreadyStarted
                | BenchError::SystemInfoLocked
        )
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Errors raised by a transport while servicing an endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The underlying channel is gone; the endpoint cannot make progress
    #[error("channel '{0}' is closed")]
    Closed(String),

    /// No matching counterpart endpoint is available
    #[error("no counterpart available on '{0}'")]
    NoCounterpart(String),

    /// The counterpart did not answer in time
    #[error("timed out after {timeout:?} on '{channel}'")]
    Timeout {
        /// Channel (topic or service) name
        channel: String,
        /// Time waited
        timeout: Duration,
    },

    /// Anything else reported by the transport
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Fatal errors end the endpoint's service loop; others are retried
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Closed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BenchError::DuplicateNode("node_0".into()).to_string(),
            "node 'node_0' is already registered"
        );
        let err = BenchError::DiscoveryTimeout {
            phase: DiscoveryPhase::Participants,
            waited: Duration::from_millis(40),
        };
        assert!(err.to_string().starts_with("participant discovery"));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(BenchError::RosterLocked.is_configuration());
        assert!(BenchError::config("bad").is_configuration());
        assert!(!BenchError::executor("boom").is_configuration());
    }

    #[test]
    fn test_transport_error_fatality() {
        assert!(TransportError::Closed("chatter".into()).is_fatal());
        assert!(!TransportError::NoCounterpart("svc".into()).is_fatal());
        assert!(!TransportError::Timeout {
            channel: "svc".into(),
            timeout: Duration::from_millis(5),
        }
        .is_fatal());
    }
}
