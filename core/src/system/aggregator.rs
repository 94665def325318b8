//! Result aggregation across nodes and executors

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{ExecutorModel, SystemInfo};
use crate::discovery::{DiscoveryReport, DiscoveryState};
use crate::executor::ExecutorStats;
use crate::report::{LatencyReport, NodeRow, TotalRow};
use crate::tracker::{Tracker, TrackerStats};
use crate::traits::{EndpointKind, Node};

/// Merge the statistics of a set of trackers
pub fn merge_trackers(trackers: &[Arc<Tracker>]) -> TrackerStats {
    trackers.iter().fold(TrackerStats::default(), |mut acc, t| {
        acc.merge(&t.statistics());
        acc
    })
}

/// Build the per-node and per-kind latency tables for `nodes`
pub fn build_latency_report(
    nodes: &[Arc<dyn Node>],
    discovery: DiscoveryState,
    system_info: Option<SystemInfo>,
) -> LatencyReport {
    let mut node_rows = Vec::new();
    let mut total_rows = Vec::new();

    for kind in EndpointKind::ALL {
        let mut total = TrackerStats::default();
        let mut contributing_nodes = 0;
        let mut endpoints = 0;

        for node in nodes {
            let trackers = node.trackers(kind);
            if trackers.is_empty() {
                continue;
            }
            let stats = merge_trackers(&trackers);
            total.merge(&stats);
            contributing_nodes += 1;
            endpoints += trackers.len();
            node_rows.push(NodeRow {
                node: node.name().to_string(),
                kind,
                endpoints: trackers.len(),
                stats,
            });
        }

        if endpoints > 0 {
            total_rows.push(TotalRow {
                kind,
                nodes: contributing_nodes,
                endpoints,
                stats: total,
            });
        }
    }

    // rows are collected kind by kind; present them node by node
    let order: Vec<&str> = nodes.iter().map(|n| n.name()).collect();
    node_rows.sort_by_key(|row| {
        (
            order.iter().position(|name| *name == row.node).unwrap_or(usize::MAX),
            row.kind,
        )
    });

    LatencyReport {
        node_rows,
        total_rows,
        discovery: discovery.label().to_string(),
        system_info,
    }
}

/// Aggregated statistics from all executors
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedStats {
    /// Number of executors that ran
    pub total_executors: usize,

    /// Total serviced callbacks
    pub total_callbacks: usize,

    /// Total failed callbacks
    pub total_errors: usize,

    /// Endpoint loops that ended early on a fatal error
    pub stopped_endpoints: usize,

    /// Maximum duration across all executors
    pub total_duration: Duration,

    /// Overall callbacks per second
    pub callbacks_per_second: f64,
}

/// Aggregate statistics from multiple executors
pub fn aggregate_executor_stats(stats: &[ExecutorStats]) -> AggregatedStats {
    if stats.is_empty() {
        return AggregatedStats::default();
    }

    let total_callbacks: usize = stats.iter().map(|s| s.callbacks).sum();
    let total_errors: usize = stats.iter().map(|s| s.errors).sum();
    let stopped_endpoints: usize = stats.iter().map(|s| s.stopped_endpoints).sum();

    let total_duration = stats
        .iter()
        .filter_map(|s| s.elapsed())
        .max()
        .unwrap_or(Duration::ZERO);

    let secs = total_duration.as_secs_f64();
    let callbacks_per_second = if secs > 0.0 {
        total_callbacks as f64 / secs
    } else {
        0.0
    };

    AggregatedStats {
        total_executors: stats.len(),
        total_callbacks,
        total_errors,
        stopped_endpoints,
        total_duration,
        callbacks_per_second,
    }
}

/// Outcome of one executor
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorSummary {
    /// Executor key
    pub key: String,
    /// Executor name
    pub name: String,
    /// Scheduling model
    pub model: ExecutorModel,
    /// Number of assigned nodes
    pub nodes: usize,
    /// Serviced callbacks
    pub callbacks: usize,
    /// Failed callbacks
    pub errors: usize,
    /// Whether the executor thread or one of its loops panicked
    pub failed: bool,
}

/// Everything known about a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Wall-clock start of the measurement window
    pub started_at: DateTime<Utc>,
    /// Requested duration
    pub requested: Duration,
    /// Measured duration, from start until every executor was joined
    pub elapsed: Duration,
    /// Discovery status
    pub discovery: DiscoveryState,
    /// Discovery timings, absent when discovery was skipped
    pub discovery_report: Option<DiscoveryReport>,
    /// Per-executor outcome
    pub executors: Vec<ExecutorSummary>,
    /// Totals across executors
    pub totals: AggregatedStats,
    /// System-wide latency rows
    pub latency: Vec<TotalRow>,
    /// Labels for comparing runs
    pub system_info: Option<SystemInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Behavior, MockEndpoint, MockNode};
    use std::time::Instant;

    #[test]
    fn test_aggregate_empty() {
        let agg = aggregate_executor_stats(&[]);
        assert_eq!(agg.total_executors, 0);
        assert_eq!(agg.total_callbacks, 0);
        assert_eq!(agg.callbacks_per_second, 0.0);
    }

    #[test]
    fn test_aggregate_uses_longest_executor() {
        let start = Instant::now();
        let a = ExecutorStats {
            callbacks: 10,
            errors: 1,
            started_at: Some(start),
            ended_at: Some(start + Duration::from_secs(1)),
            ..Default::default()
        };
        let b = ExecutorStats {
            callbacks: 30,
            started_at: Some(start),
            ended_at: Some(start + Duration::from_secs(2)),
            ..Default::default()
        };

        let agg = aggregate_executor_stats(&[a, b]);
        assert_eq!(agg.total_executors, 2);
        assert_eq!(agg.total_callbacks, 40);
        assert_eq!(agg.total_errors, 1);
        assert_eq!(agg.total_duration, Duration::from_secs(2));
        assert!((agg.callbacks_per_second - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_rows_follow_registration_order() {
        let second = MockNode::new("b_node").with_endpoint(MockEndpoint::new(
            "b_node",
            EndpointKind::Publisher,
            "chatter",
            Behavior::Fail,
        ));
        let first = MockNode::recording("z_node", 10).with_endpoint(MockEndpoint::new(
            "z_node",
            EndpointKind::Publisher,
            "other",
            Behavior::Fail,
        ));
        let nodes: Vec<Arc<dyn Node>> = vec![Arc::new(first), Arc::new(second)];

        let report = build_latency_report(&nodes, DiscoveryState::Skipped, None);
        let rows: Vec<(&str, EndpointKind)> = report
            .node_rows
            .iter()
            .map(|r| (r.node.as_str(), r.kind))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("z_node", EndpointKind::Publisher),
                ("z_node", EndpointKind::Subscriber),
                ("b_node", EndpointKind::Publisher),
            ]
        );
        assert_eq!(report.total_rows.len(), 2);
        assert_eq!(report.total_rows[0].nodes, 2);
        assert_eq!(report.discovery, "skipped");
    }

    #[test]
    fn test_zero_sample_trackers_report_zeros() {
        let nodes: Vec<Arc<dyn Node>> = vec![Arc::new(MockNode::recording("idle", 10))];
        let report = build_latency_report(&nodes, DiscoveryState::Satisfied, None);

        let total = &report.total_rows[0].stats;
        assert_eq!(total.received, 0);
        assert_eq!(total.latency.count, 0);
        assert_eq!(total.latency.mean, 0.0);
        assert_eq!(total.latency.min, 0.0);
        assert_eq!(total.latency.max, 0.0);
        assert_eq!(total.latency.stddev(), 0.0);
    }

    #[test]
    fn test_merge_trackers_matches_pooled_samples() {
        let a = Arc::new(Tracker::new("n", "a", Default::default()));
        let b = Arc::new(Tracker::new("n", "b", Default::default()));
        for us in [10, 20, 30] {
            a.record(Duration::from_micros(us), None);
        }
        b.record(Duration::from_micros(40), None);

        let merged = merge_trackers(&[a, b]);
        assert_eq!(merged.received, 4);
        assert!((merged.latency.mean - 25.0).abs() < 1e-9);
        // population variance of 10,20,30,40
        assert!((merged.latency.variance() - 125.0).abs() < 1e-6);
    }
}
