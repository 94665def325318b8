//! Full runs over the loopback transport

use std::time::Duration;

use pubsub_bench_core::{EndpointKind, ExecutorModel, Node, System, TrackerOptions};
use pubsub_bench_topology::NodeFactory;
use pubsub_bench_transport::{Domain, DomainConfig};

fn pub_sub_nodes(factory: &NodeFactory) -> Vec<std::sync::Arc<dyn Node>> {
    let mut nodes = factory
        .create_periodic_publisher_nodes(0, 2, 1.0, "stamped10b")
        .unwrap();
    nodes.extend(
        factory
            .create_subscriber_nodes(2, 4, 2, "stamped10b", TrackerOptions::default())
            .unwrap(),
    );
    nodes
}

#[test]
fn test_end_to_end_pub_sub() {
    let dir = tempfile::tempdir().unwrap();
    let factory = NodeFactory::new(Domain::new(DomainConfig::default()));
    let nodes = pub_sub_nodes(&factory);

    let mut system = System::new(ExecutorModel::SingleThreaded);
    system.add_nodes(nodes.clone()).unwrap();
    system.enable_events_logger(dir.path().join("events.txt")).unwrap();

    let duration = Duration::from_secs(3);
    let period = Duration::from_secs(1);
    let summary = system.spin(duration, true, true).unwrap();
    assert!(summary.discovery_report.as_ref().unwrap().is_complete());
    assert_eq!(summary.executors.len(), 4);
    assert!(summary.executors.iter().all(|e| !e.failed));
    assert!(summary.elapsed >= duration);
    assert!(summary.elapsed <= duration + period, "elapsed {:?}", summary.elapsed);

    // 3 s at 1 Hz, give or take the tick at the boundary
    let expected = 2..=4;
    for node in &nodes[..2] {
        let stats = node.pub_trackers()[0].statistics();
        assert!(expected.contains(&stats.received), "{} published {}", node.name(), stats.received);
    }
    for node in &nodes[2..] {
        for tracker in node.sub_trackers() {
            let stats = tracker.statistics();
            assert!(expected.contains(&stats.received), "{} received {}", node.name(), stats.received);
            assert_eq!(stats.lost, 0);
        }
    }

    let all_stats = dir.path().join("all.txt");
    system.save_latency_all_stats(&all_stats).unwrap();
    let content = std::fs::read_to_string(&all_stats).unwrap();
    assert_eq!(content.lines().count(), 5);

    let report = system.latency_report();
    let kinds: Vec<EndpointKind> = report.total_rows.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![EndpointKind::Publisher, EndpointKind::Subscriber]);
}

#[test]
fn test_end_to_end_multi_threaded_compare() {
    let dir = tempfile::tempdir().unwrap();
    let factory = NodeFactory::new(Domain::new(DomainConfig::default()));

    let mut system = System::new(ExecutorModel::MultiThreaded { threads: 2 });
    system.add_nodes(pub_sub_nodes(&factory)).unwrap();
    system.spin(Duration::from_millis(300), true, false).unwrap();

    let totals = dir.path().join("multi.txt");
    system.save_latency_total_stats(&totals).unwrap();

    let table = System::aggregate_stats_table(&[&totals]).unwrap();
    assert!(table.contains("multi"));
}
