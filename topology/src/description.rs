//! JSON topology descriptions
//!
//! A topology file lists nodes and the endpoints each one owns:
//!
//! ```json
//! {
//!   "nodes": [
//!     {
//!       "node_name": "node_0",
//!       "executor_id": 1,
//!       "publishers": [{ "topic_name": "a", "msg_type": "stamped10b", "freq_hz": 100 }],
//!       "subscribers": [{ "topic_name": "b", "msg_type": "stamped10b" }],
//!       "clients": [{ "service_name": "s", "msg_type": "stamped10b", "period_ms": 50 }],
//!       "servers": [{ "service_name": "t", "msg_type": "stamped10b" }]
//!     }
//!   ]
//! }
//! ```
//!
//! Publishers and clients take either `period_ms` or `freq_hz`; with neither
//! they run every [`DEFAULT_PERIOD`].

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use pubsub_bench_core::SystemInfo;
use serde::{Deserialize, Serialize};

use crate::error::{TopologyError, TopologyResult};
use crate::registry::MessageRegistry;

/// Period of publishers and clients that do not specify one
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(10);

/// A whole topology
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyDescription {
    /// Nodes in declaration order
    pub nodes: Vec<NodeDescription>,
}

/// One node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    /// Unique node name
    pub node_name: String,
    /// Executor to place the node on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<usize>,
    /// Periodic publishers
    #[serde(default)]
    pub publishers: Vec<PublisherDescription>,
    /// Subscribers
    #[serde(default)]
    pub subscribers: Vec<SubscriberDescription>,
    /// Periodic clients
    #[serde(default)]
    pub clients: Vec<ClientDescription>,
    /// Servers
    #[serde(default)]
    pub servers: Vec<ServerDescription>,
}

/// A periodic publisher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherDescription {
    /// Topic to publish on
    pub topic_name: String,
    /// Message type tag
    pub msg_type: String,
    /// Publishing period in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_ms: Option<f64>,
    /// Publishing frequency in Hz
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freq_hz: Option<f64>,
}

/// A subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberDescription {
    /// Topic to subscribe to
    pub topic_name: String,
    /// Message type tag
    pub msg_type: String,
}

/// A periodic client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientDescription {
    /// Service to call
    pub service_name: String,
    /// Message type tag
    pub msg_type: String,
    /// Request period in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_ms: Option<f64>,
    /// Request frequency in Hz
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freq_hz: Option<f64>,
}

/// A server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescription {
    /// Service to serve
    pub service_name: String,
    /// Message type tag
    pub msg_type: String,
}

fn resolve_period(channel: &str, period_ms: Option<f64>, freq_hz: Option<f64>) -> TopologyResult<Duration> {
    let period = match (period_ms, freq_hz) {
        (Some(_), Some(_)) => {
            return Err(TopologyError::invalid_period(
                channel,
                "both period_ms and freq_hz are set",
            ))
        }
        (Some(ms), None) if ms > 0.0 && ms.is_finite() => Duration::from_secs_f64(ms / 1000.0),
        (None, Some(hz)) if hz > 0.0 && hz.is_finite() => Duration::from_secs_f64(1.0 / hz),
        (None, None) => DEFAULT_PERIOD,
        _ => return Err(TopologyError::invalid_period(channel, "must be positive")),
    };
    if period.is_zero() {
        return Err(TopologyError::invalid_period(channel, "rounds to zero"));
    }
    Ok(period)
}

impl PublisherDescription {
    /// Publishing period
    pub fn period(&self) -> TopologyResult<Duration> {
        resolve_period(&self.topic_name, self.period_ms, self.freq_hz)
    }
}

impl ClientDescription {
    /// Request period
    pub fn period(&self) -> TopologyResult<Duration> {
        resolve_period(&self.service_name, self.period_ms, self.freq_hz)
    }
}

impl TopologyDescription {
    /// Read and validate a topology file
    pub fn from_file(path: impl AsRef<Path>) -> TopologyResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let description = Self::from_json(&content)?;
        tracing::debug!(
            path = %path.display(),
            nodes = description.nodes.len(),
            "Topology loaded"
        );
        Ok(description)
    }

    /// Parse and validate a topology from JSON text
    pub fn from_json(content: &str) -> TopologyResult<Self> {
        let description: Self = serde_json::from_str(content)?;
        description.validate()?;
        Ok(description)
    }

    /// Check node names and periods
    pub fn validate(&self) -> TopologyResult<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.node_name.is_empty() {
                return Err(TopologyError::EmptyNodeName);
            }
            if !seen.insert(node.node_name.as_str()) {
                return Err(TopologyError::DuplicateNode(node.node_name.clone()));
            }
            for publisher in &node.publishers {
                publisher.period()?;
            }
            for client in &node.clients {
                client.period()?;
            }
        }
        Ok(())
    }

    /// Summary labels for the latency reports
    ///
    /// Frequency is the highest publisher frequency and the message size the
    /// largest published payload; both are zero without publishers.
    pub fn system_info(&self, registry: &MessageRegistry) -> TopologyResult<SystemInfo> {
        let mut pubs = 0;
        let mut subs = 0;
        let mut frequency = 0.0f32;
        let mut msg_size = 0;

        for node in &self.nodes {
            subs += node.subscribers.len();
            for publisher in &node.publishers {
                pubs += 1;
                let hz = 1.0 / publisher.period()?.as_secs_f64();
                frequency = frequency.max(hz as f32);
                msg_size = msg_size.max(registry.resolve(&publisher.msg_type)?.size);
            }
        }

        Ok(SystemInfo::new(pubs, subs, frequency, msg_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPOLOGY: &str = r#"{
        "nodes": [
            {
                "node_name": "talker",
                "executor_id": 1,
                "publishers": [
                    { "topic_name": "fast", "msg_type": "stamped10b", "freq_hz": 100 },
                    { "topic_name": "slow", "msg_type": "stamped1kb", "period_ms": 500 }
                ]
            },
            {
                "node_name": "listener",
                "subscribers": [
                    { "topic_name": "fast", "msg_type": "stamped10b" },
                    { "topic_name": "slow", "msg_type": "stamped1kb" }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse() {
        let description = TopologyDescription::from_json(TOPOLOGY).unwrap();
        assert_eq!(description.nodes.len(), 2);
        assert_eq!(description.nodes[0].executor_id, Some(1));
        assert_eq!(description.nodes[1].executor_id, None);
        assert!(description.nodes[1].clients.is_empty());
        assert_eq!(
            description.nodes[0].publishers[1].period().unwrap(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_system_info() {
        let description = TopologyDescription::from_json(TOPOLOGY).unwrap();
        let info = description.system_info(&MessageRegistry::new()).unwrap();
        assert_eq!(info.pubs, 2);
        assert_eq!(info.subs, 2);
        assert!((info.frequency - 100.0).abs() < 1e-3);
        assert_eq!(info.msg_size, 1024);
    }

    #[test]
    fn test_default_period() {
        let publisher = PublisherDescription {
            topic_name: "t".into(),
            msg_type: "stamped10b".into(),
            period_ms: None,
            freq_hz: None,
        };
        assert_eq!(publisher.period().unwrap(), DEFAULT_PERIOD);
    }

    #[test]
    fn test_invalid_periods() {
        for (period_ms, freq_hz) in [(Some(10.0), Some(100.0)), (Some(0.0), None), (None, Some(-1.0))] {
            let client = ClientDescription {
                service_name: "s".into(),
                msg_type: "stamped10b".into(),
                period_ms,
                freq_hz,
            };
            assert!(matches!(client.period(), Err(TopologyError::InvalidPeriod { .. })));
        }
    }

    #[test]
    fn test_duplicate_node_names() {
        let json = r#"{ "nodes": [ { "node_name": "a" }, { "node_name": "a" } ] }"#;
        assert!(matches!(
            TopologyDescription::from_json(json),
            Err(TopologyError::DuplicateNode(name)) if name == "a"
        ));
    }

    #[test]
    fn test_empty_node_name() {
        let json = r#"{ "nodes": [ { "node_name": "" } ] }"#;
        assert!(matches!(
            TopologyDescription::from_json(json),
            Err(TopologyError::EmptyNodeName)
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            TopologyDescription::from_json("{ nodes: "),
            Err(TopologyError::Json(_))
        ));
    }
}
