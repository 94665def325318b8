//! Node factory tests against the JSON fixture and index ranges

use std::path::PathBuf;
use std::time::Duration;

use pubsub_bench_core::{Node, TrackerOptions};
use pubsub_bench_topology::{MessageRegistry, NodeFactory, TopologyError};
use pubsub_bench_transport::{Domain, DomainConfig, LoopbackNode};

fn factory() -> NodeFactory {
    NodeFactory::new(Domain::new(DomainConfig::default()))
}

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("files")
        .join("test_architecture.json")
}

// ============================================================================
// From strings
// ============================================================================

#[test]
fn test_factory_from_strings() {
    let factory = factory();
    let builder = LoopbackNode::builder(factory.domain().clone(), "node");
    let builder = factory
        .add_subscriber_from_strings(builder, "stamped10b", "my_topic")
        .unwrap();
    let builder = factory
        .add_periodic_publisher_from_strings(builder, "stamped10b", "my_topic", Duration::from_millis(10))
        .unwrap();
    let builder = factory
        .add_server_from_strings(builder, "stamped10b", "my_service")
        .unwrap();
    let builder = factory
        .add_periodic_client_from_strings(builder, "stamped10b", "my_service", Duration::from_millis(10))
        .unwrap();
    let node = builder.build().unwrap();

    assert_eq!(node.sub_trackers().len(), 1);
    assert_eq!(node.pub_trackers().len(), 1);
    assert_eq!(node.server_trackers().len(), 1);
    assert_eq!(node.client_trackers().len(), 1);
    assert_eq!(node.pub_trackers()[0].statistics().msg_size, 10);
}

#[test]
fn test_factory_unknown_message_type() {
    let factory = factory();
    let builder = LoopbackNode::builder(factory.domain().clone(), "node");
    let result = factory.add_subscriber_from_strings(builder, "not_a_message", "my_topic");
    assert!(matches!(result, Err(TopologyError::UnknownMessageType(tag)) if tag == "not_a_message"));
}

#[test]
fn test_factory_custom_registry() {
    let mut registry = MessageRegistry::new();
    registry.register("image", 921_600);
    let factory = factory().with_registry(registry);

    let nodes = factory.create_periodic_publisher_nodes(0, 1, 30.0, "image").unwrap();
    assert_eq!(nodes[0].pub_trackers()[0].statistics().msg_size, 921_600);
}

// ============================================================================
// From ranges
// ============================================================================

#[test]
fn test_factory_create_subscriber_nodes() {
    let nodes = factory()
        .create_subscriber_nodes(0, 2, 3, "stamped10b", TrackerOptions::default())
        .unwrap();

    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0].name(), "node_0");
    assert_eq!(nodes[1].name(), "node_1");
    for node in &nodes {
        assert_eq!(node.sub_trackers().len(), 3);
        assert!(node.pub_trackers().is_empty());
    }
}

#[test]
fn test_factory_create_publisher_nodes() {
    let nodes = factory()
        .create_periodic_publisher_nodes(2, 4, 100.0, "stamped10b")
        .unwrap();

    let names: Vec<&str> = nodes.iter().map(|n| n.name()).collect();
    assert_eq!(names, vec!["node_2", "node_3"]);
    for node in &nodes {
        assert_eq!(node.pub_trackers().len(), 1);
        assert!(node.sub_trackers().is_empty());
    }
    // each publisher publishes on a topic named after its node
    let endpoints = nodes[0].endpoints();
    assert_eq!(endpoints[0].info().channel, "node_2");
}

#[test]
fn test_factory_create_client_and_server_nodes() {
    let factory = factory();
    let servers = factory.create_server_nodes(0, 2, "stamped10b").unwrap();
    let clients = factory
        .create_periodic_client_nodes(2, 3, 2, 10.0, "stamped10b", TrackerOptions::default())
        .unwrap();

    assert_eq!(servers.len(), 2);
    assert_eq!(clients[0].client_trackers().len(), 2);

    let info = clients[0].endpoints()[0].info().clone();
    assert_eq!(info.channel, "node_0");
    assert_eq!(clients[0].matched_endpoints(&info), 1);
}

#[test]
fn test_factory_rejects_bad_input() {
    let factory = factory();
    assert!(matches!(
        factory.create_periodic_publisher_nodes(3, 3, 10.0, "stamped10b"),
        Err(TopologyError::InvalidRange { start: 3, end: 3 })
    ));
    assert!(matches!(
        factory.create_periodic_publisher_nodes(0, 1, 0.0, "stamped10b"),
        Err(TopologyError::InvalidPeriod { .. })
    ));
}

// ============================================================================
// From JSON
// ============================================================================

#[test]
fn test_factory_parse_topology() {
    let nodes = factory()
        .parse_topology(fixture(), TrackerOptions::default())
        .unwrap();

    assert_eq!(nodes.len(), 3);

    assert_eq!(nodes[0].name(), "node_0");
    assert_eq!(nodes[0].pub_trackers().len(), 2);
    assert_eq!(nodes[0].executor_id(), None);

    assert_eq!(nodes[1].name(), "node_1");
    assert_eq!(nodes[1].sub_trackers().len(), 1);
    assert_eq!(nodes[1].executor_id(), Some(1));

    assert_eq!(nodes[2].name(), "node_2");
    assert_eq!(nodes[2].client_trackers().len(), 1);
    assert_eq!(nodes[2].executor_id(), Some(1));
}

#[test]
fn test_factory_load_topology_system_info() {
    let (nodes, info) = factory()
        .load_topology(fixture(), TrackerOptions::default())
        .unwrap();

    assert_eq!(nodes.len(), 3);
    assert_eq!(info.pubs, 2);
    assert_eq!(info.subs, 1);
    assert!((info.frequency - 100.0).abs() < 1e-3);
    assert_eq!(info.msg_size, 10 * 1024);
}

#[test]
fn test_factory_missing_file() {
    let result = factory().parse_topology("does/not/exist.json", TrackerOptions::default());
    assert!(matches!(result, Err(TopologyError::Io { .. })));
}
