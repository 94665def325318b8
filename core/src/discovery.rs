//! Bounded two-phase discovery wait
//!
//! Before the measurement window opens, the system polls its nodes until every
//! participant has seen every other one, and then until every receiving
//! endpoint is matched with the counterparts declared in the roster. Each
//! phase is bounded; a timed-out phase is handled by [`DiscoveryTimeoutPolicy`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::traits::{EndpointInfo, EndpointKind, Node};

/// Discovery phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryPhase {
    /// Participant discovery (PDP)
    Participants,
    /// Endpoint discovery (EDP)
    Endpoints,
}

impl std::fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryPhase::Participants => f.write_str("participant"),
            DiscoveryPhase::Endpoints => f.write_str("endpoint"),
        }
    }
}

/// What to do when a discovery phase runs out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryTimeoutPolicy {
    /// Log a warning and start the experiment anyway
    #[default]
    Proceed,
    /// Fail `spin` with a discovery timeout error
    Abort,
}

/// Discovery wait settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Delay between two checks
    pub poll_period: Duration,
    /// Maximum time spent in participant discovery
    pub max_pdp_time: Duration,
    /// Maximum time spent in endpoint discovery
    pub max_edp_time: Duration,
    /// Behavior when a phase times out
    pub timeout_policy: DiscoveryTimeoutPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_millis(20),
            max_pdp_time: Duration::from_secs(30),
            max_edp_time: Duration::from_secs(30),
            timeout_policy: DiscoveryTimeoutPolicy::Proceed,
        }
    }
}

impl DiscoveryConfig {
    /// Use the same maximum wait for both phases
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_pdp_time = max_wait;
        self.max_edp_time = max_wait;
        self
    }

    /// Set the timeout policy
    pub fn with_timeout_policy(mut self, policy: DiscoveryTimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }
}

/// Result of one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    /// Whether the phase condition was met before the deadline
    pub satisfied: bool,
    /// Time spent in the phase
    pub elapsed: Duration,
    /// Number of times the condition was evaluated
    pub polls: u32,
}

/// Result of the whole discovery wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Participant phase
    pub participants: PhaseOutcome,
    /// Endpoint phase; `None` when the participant phase timed out
    pub endpoints: Option<PhaseOutcome>,
}

impl DiscoveryReport {
    /// Whether both phases completed
    pub fn is_complete(&self) -> bool {
        self.participants.satisfied && self.endpoints.map(|e| e.satisfied).unwrap_or(false)
    }

    /// First phase that did not complete, with the time spent waiting on it
    pub fn timed_out_phase(&self) -> Option<(DiscoveryPhase, Duration)> {
        if !self.participants.satisfied {
            return Some((DiscoveryPhase::Participants, self.participants.elapsed));
        }
        match self.endpoints {
            Some(outcome) if !outcome.satisfied => Some((DiscoveryPhase::Endpoints, outcome.elapsed)),
            _ => None,
        }
    }

    /// Total time spent waiting
    pub fn elapsed(&self) -> Duration {
        self.participants.elapsed + self.endpoints.map(|e| e.elapsed).unwrap_or_default()
    }
}

/// Discovery status of a system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "phase")]
pub enum DiscoveryState {
    /// `spin` has not been called
    #[default]
    NotStarted,
    /// Currently waiting on a phase
    Waiting(DiscoveryPhase),
    /// Both phases completed
    Satisfied,
    /// A phase ran out of time
    TimedOut(DiscoveryPhase),
    /// The caller asked not to wait
    Skipped,
}

impl DiscoveryState {
    /// Label used in the total statistics report
    pub fn label(&self) -> &'static str {
        match self {
            DiscoveryState::NotStarted | DiscoveryState::Waiting(_) => "pending",
            DiscoveryState::Satisfied => "complete",
            DiscoveryState::TimedOut(_) => "incomplete",
            DiscoveryState::Skipped => "skipped",
        }
    }
}

impl From<&DiscoveryReport> for DiscoveryState {
    fn from(report: &DiscoveryReport) -> Self {
        match report.timed_out_phase() {
            Some((phase, _)) => DiscoveryState::TimedOut(phase),
            None => DiscoveryState::Satisfied,
        }
    }
}

/// Poll `condition` every `period` until it holds or `max_wait` has elapsed
///
/// The condition is checked before the first sleep, so a condition that
/// already holds returns without sleeping. Never sleeps past the deadline.
pub fn wait_until<F>(period: Duration, max_wait: Duration, mut condition: F) -> PhaseOutcome
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    let mut polls = 0u32;

    loop {
        polls += 1;
        if condition() {
            return PhaseOutcome {
                satisfied: true,
                elapsed: start.elapsed(),
                polls,
            };
        }

        let elapsed = start.elapsed();
        if elapsed >= max_wait {
            return PhaseOutcome {
                satisfied: false,
                elapsed,
                polls,
            };
        }

        std::thread::sleep(period.min(max_wait - elapsed));
    }
}

/// Whether every node has discovered every other node of the roster
pub fn participants_discovered(nodes: &[Arc<dyn Node>]) -> bool {
    nodes.iter().all(|node| {
        let seen = node.discovered_participants();
        nodes
            .iter()
            .filter(|other| other.name() != node.name())
            .all(|other| seen.iter().any(|name| name == other.name()))
    })
}

/// Counterpart endpoints each receiving endpoint is expected to match
#[derive(Debug, Default)]
pub struct EndpointExpectations {
    declared: HashMap<(EndpointKind, String), usize>,
}

impl EndpointExpectations {
    /// Count the endpoints declared by the roster
    pub fn from_nodes(nodes: &[Arc<dyn Node>]) -> Self {
        let mut declared = HashMap::new();
        for node in nodes {
            for endpoint in node.endpoints() {
                let info = endpoint.info();
                *declared.entry((info.kind, info.channel.clone())).or_insert(0) += 1;
            }
        }
        Self { declared }
    }

    /// Number of counterparts `info` should be matched with
    pub fn expected(&self, info: &EndpointInfo) -> usize {
        info.kind
            .counterpart()
            .and_then(|kind| self.declared.get(&(kind, info.channel.clone())))
            .copied()
            .unwrap_or(0)
    }

    /// Receiving endpoints still waiting on a counterpart, as `(node, info, matched, expected)`
    pub fn pending(&self, nodes: &[Arc<dyn Node>]) -> Vec<(String, EndpointInfo, usize, usize)> {
        let mut pending = Vec::new();
        for node in nodes {
            for endpoint in node.endpoints() {
                let info = endpoint.info();
                let expected = self.expected(info);
                if expected == 0 {
                    continue;
                }
                let matched = node.matched_endpoints(info);
                if matched < expected {
                    pending.push((node.name().to_string(), info.clone(), matched, expected));
                }
            }
        }
        pending
    }

    /// Whether every receiving endpoint is matched
    pub fn satisfied(&self, nodes: &[Arc<dyn Node>]) -> bool {
        self.pending(nodes).is_empty()
    }
}

/// Run both discovery phases against `nodes`
///
/// The endpoint phase only starts once the participant phase completed.
pub fn wait_for_discovery(nodes: &[Arc<dyn Node>], config: &DiscoveryConfig) -> DiscoveryReport {
    tracing::info!(
        nodes = nodes.len(),
        max_pdp_ms = config.max_pdp_time.as_millis() as u64,
        "Waiting for participant discovery"
    );
    let participants = wait_until(config.poll_period, config.max_pdp_time, || {
        participants_discovered(nodes)
    });

    if !participants.satisfied {
        for node in nodes {
            let seen = node.discovered_participants();
            let missing: Vec<&str> = nodes
                .iter()
                .map(|n| n.name())
                .filter(|name| *name != node.name() && !seen.iter().any(|s| s == name))
                .collect();
            if !missing.is_empty() {
                tracing::debug!(node = node.name(), missing = ?missing, "Participants not discovered");
            }
        }
        tracing::warn!(
            waited_ms = participants.elapsed.as_millis() as u64,
            "Participant discovery did not complete"
        );
        return DiscoveryReport {
            participants,
            endpoints: None,
        };
    }

    tracing::info!(
        elapsed_ms = participants.elapsed.as_millis() as u64,
        "Participant discovery complete"
    );

    let expectations = EndpointExpectations::from_nodes(nodes);
    let endpoints = wait_until(config.poll_period, config.max_edp_time, || {
        expectations.satisfied(nodes)
    });

    if endpoints.satisfied {
        tracing::info!(
            elapsed_ms = endpoints.elapsed.as_millis() as u64,
            "Endpoint discovery complete"
        );
    } else {
        for (node, info, matched, expected) in expectations.pending(nodes) {
            tracing::debug!(
                node = %node,
                kind = %info.kind,
                channel = %info.channel,
                matched,
                expected,
                "Endpoint not matched"
            );
        }
        tracing::warn!(
            waited_ms = endpoints.elapsed.as_millis() as u64,
            "Endpoint discovery did not complete"
        );
    }

    DiscoveryReport {
        participants,
        endpoints: Some(endpoints),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::TransportError;
    use crate::tracker::{Tracker, TrackerOptions};
    use crate::traits::{Endpoint, Notice};

    struct StaticEndpoint {
        info: EndpointInfo,
        tracker: Arc<Tracker>,
    }

    #[async_trait]
    impl Endpoint for StaticEndpoint {
        fn info(&self) -> &EndpointInfo {
            &self.info
        }

        fn tracker(&self) -> &Arc<Tracker> {
            &self.tracker
        }

        async fn service(&self) -> Result<Option<Notice>, TransportError> {
            Ok(None)
        }
    }

    struct ScriptedNode {
        name: String,
        peers: Mutex<Vec<String>>,
        endpoints: Vec<Arc<dyn Endpoint>>,
        matched: Mutex<usize>,
    }

    impl ScriptedNode {
        fn new(name: &str, peers: &[&str], endpoints: &[(EndpointKind, &str)]) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                peers: Mutex::new(peers.iter().map(|p| p.to_string()).collect()),
                endpoints: endpoints
                    .iter()
                    .map(|(kind, channel)| {
                        Arc::new(StaticEndpoint {
                            info: EndpointInfo::new(*kind, *channel, "stamped10b"),
                            tracker: Arc::new(Tracker::new(name, *channel, TrackerOptions::default())),
                        }) as Arc<dyn Endpoint>
                    })
                    .collect(),
                matched: Mutex::new(0),
            })
        }
    }

    impl Node for ScriptedNode {
        fn name(&self) -> &str {
            &self.name
        }

        fn endpoints(&self) -> Vec<Arc<dyn Endpoint>> {
            self.endpoints.clone()
        }

        fn discovered_participants(&self) -> Vec<String> {
            self.peers.lock().clone()
        }

        fn matched_endpoints(&self, _endpoint: &EndpointInfo) -> usize {
            *self.matched.lock()
        }
    }

    fn fast_config() -> DiscoveryConfig {
        DiscoveryConfig {
            poll_period: Duration::from_millis(5),
            max_pdp_time: Duration::from_millis(60),
            max_edp_time: Duration::from_millis(60),
            timeout_policy: DiscoveryTimeoutPolicy::Proceed,
        }
    }

    #[test]
    fn test_wait_until_true_returns_without_sleeping() {
        let outcome = wait_until(Duration::from_secs(1), Duration::from_secs(5), || true);
        assert!(outcome.satisfied);
        assert_eq!(outcome.polls, 1);
        assert!(outcome.elapsed < Duration::from_millis(100));
    }

    #[test]
    fn test_wait_until_false_is_bounded() {
        let max = Duration::from_millis(50);
        let period = Duration::from_millis(20);
        let outcome = wait_until(period, max, || false);
        assert!(!outcome.satisfied);
        assert!(outcome.elapsed >= max);
        assert!(outcome.elapsed < max + period + Duration::from_millis(50));
    }

    #[test]
    fn test_wait_until_becomes_true() {
        let mut calls = 0;
        let outcome = wait_until(Duration::from_millis(1), Duration::from_secs(5), || {
            calls += 1;
            calls == 3
        });
        assert!(outcome.satisfied);
        assert_eq!(outcome.polls, 3);
    }

    #[test]
    fn test_participants_discovered() {
        let a = ScriptedNode::new("a", &["b"], &[]);
        let b = ScriptedNode::new("b", &[], &[]);
        let nodes: Vec<Arc<dyn Node>> = vec![a, b.clone()];
        assert!(!participants_discovered(&nodes));

        b.peers.lock().push("a".to_string());
        assert!(participants_discovered(&nodes));
    }

    #[test]
    fn test_single_node_is_trivially_discovered() {
        let nodes: Vec<Arc<dyn Node>> = vec![ScriptedNode::new("only", &[], &[])];
        let report = wait_for_discovery(&nodes, &fast_config());
        assert!(report.is_complete());
        assert_eq!(DiscoveryState::from(&report), DiscoveryState::Satisfied);
    }

    #[test]
    fn test_endpoint_expectations() {
        let publisher = ScriptedNode::new(
            "pub",
            &["sub"],
            &[(EndpointKind::Publisher, "chatter"), (EndpointKind::Publisher, "chatter")],
        );
        let subscriber = ScriptedNode::new("sub", &["pub"], &[(EndpointKind::Subscriber, "chatter")]);
        let nodes: Vec<Arc<dyn Node>> = vec![publisher, subscriber.clone()];

        let expectations = EndpointExpectations::from_nodes(&nodes);
        let info = EndpointInfo::new(EndpointKind::Subscriber, "chatter", "stamped10b");
        assert_eq!(expectations.expected(&info), 2);
        assert!(!expectations.satisfied(&nodes));

        *subscriber.matched.lock() = 2;
        assert!(expectations.satisfied(&nodes));
    }

    #[test]
    fn test_participant_timeout_skips_endpoint_phase() {
        let a = ScriptedNode::new("a", &[], &[]);
        let b = ScriptedNode::new("b", &["a"], &[]);
        let nodes: Vec<Arc<dyn Node>> = vec![a, b];

        let report = wait_for_discovery(&nodes, &fast_config());
        assert!(!report.participants.satisfied);
        assert!(report.endpoints.is_none());
        assert_eq!(
            report.timed_out_phase().map(|(phase, _)| phase),
            Some(DiscoveryPhase::Participants)
        );
        assert_eq!(DiscoveryState::from(&report).label(), "incomplete");
    }

    #[test]
    fn test_endpoint_timeout() {
        let publisher = ScriptedNode::new("pub", &["sub"], &[(EndpointKind::Publisher, "chatter")]);
        let subscriber = ScriptedNode::new("sub", &["pub"], &[(EndpointKind::Subscriber, "chatter")]);
        let nodes: Vec<Arc<dyn Node>> = vec![publisher, subscriber];

        let config = fast_config();
        let report = wait_for_discovery(&nodes, &config);
        assert!(report.participants.satisfied);
        let endpoints = report.endpoints.unwrap();
        assert!(!endpoints.satisfied);
        assert!(endpoints.elapsed >= config.max_edp_time);
        assert_eq!(
            DiscoveryState::from(&report),
            DiscoveryState::TimedOut(DiscoveryPhase::Endpoints)
        );
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(DiscoveryState::NotStarted.label(), "pending");
        assert_eq!(DiscoveryState::Satisfied.label(), "complete");
        assert_eq!(DiscoveryState::Skipped.label(), "skipped");
    }
}
