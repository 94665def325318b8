//! Node factory
//!
//! Builds loopback nodes from message type tags, index ranges or a JSON
//! topology. Nodes created from ranges are named `node_<i>`; publishers and
//! servers use their node name as topic or service name, so subscriber `j`
//! of a subscriber node listens to `node_<j>`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pubsub_bench_core::{Node, SystemInfo, TrackerOptions};
use pubsub_bench_transport::{Domain, LoopbackNode, LoopbackNodeBuilder};

use crate::description::{NodeDescription, TopologyDescription};
use crate::error::{TopologyError, TopologyResult};
use crate::registry::MessageRegistry;

/// Name of the node with index `id`
pub fn node_name(id: usize) -> String {
    format!("node_{id}")
}

fn check_range(start: usize, end: usize) -> TopologyResult<()> {
    if start >= end {
        return Err(TopologyError::InvalidRange { start, end });
    }
    Ok(())
}

fn frequency_to_period(channel: &str, frequency: f64) -> TopologyResult<Duration> {
    if !(frequency > 0.0 && frequency.is_finite()) {
        return Err(TopologyError::invalid_period(channel, "frequency must be positive"));
    }
    Ok(Duration::from_secs_f64(1.0 / frequency))
}

/// Creates nodes inside one [`Domain`]
#[derive(Debug, Clone)]
pub struct NodeFactory {
    domain: Arc<Domain>,
    registry: MessageRegistry,
}

impl NodeFactory {
    /// Create a factory for `domain` with the default registry
    pub fn new(domain: Arc<Domain>) -> Self {
        Self {
            domain,
            registry: MessageRegistry::new(),
        }
    }

    /// Replace the message registry
    pub fn with_registry(mut self, registry: MessageRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Domain nodes are created in
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// Message registry
    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    /// Add a subscriber given its message type tag
    pub fn add_subscriber_from_strings(
        &self,
        builder: LoopbackNodeBuilder,
        msg_type: &str,
        topic: &str,
    ) -> TopologyResult<LoopbackNodeBuilder> {
        let msg = self.registry.resolve(msg_type)?;
        Ok(builder.add_subscriber(topic, &msg))
    }

    /// Add a periodic publisher given its message type tag
    pub fn add_periodic_publisher_from_strings(
        &self,
        builder: LoopbackNodeBuilder,
        msg_type: &str,
        topic: &str,
        period: Duration,
    ) -> TopologyResult<LoopbackNodeBuilder> {
        let msg = self.registry.resolve(msg_type)?;
        Ok(builder.add_periodic_publisher(topic, &msg, period))
    }

    /// Add a server given its message type tag
    pub fn add_server_from_strings(
        &self,
        builder: LoopbackNodeBuilder,
        msg_type: &str,
        service: &str,
    ) -> TopologyResult<LoopbackNodeBuilder> {
        let msg = self.registry.resolve(msg_type)?;
        Ok(builder.add_server(service, &msg))
    }

    /// Add a periodic client given its message type tag
    pub fn add_periodic_client_from_strings(
        &self,
        builder: LoopbackNodeBuilder,
        msg_type: &str,
        service: &str,
        period: Duration,
    ) -> TopologyResult<LoopbackNodeBuilder> {
        let msg = self.registry.resolve(msg_type)?;
        Ok(builder.add_periodic_client(service, &msg, period))
    }

    /// Nodes `start..end`, each subscribing to `node_0..node_<n_publishers>`
    pub fn create_subscriber_nodes(
        &self,
        start: usize,
        end: usize,
        n_publishers: usize,
        msg_type: &str,
        options: TrackerOptions,
    ) -> TopologyResult<Vec<Arc<dyn Node>>> {
        check_range(start, end)?;
        (start..end)
            .map(|id| -> TopologyResult<Arc<dyn Node>> {
                let mut builder = LoopbackNode::builder(self.domain.clone(), node_name(id))
                    .tracker_options(options);
                for publisher in 0..n_publishers {
                    builder = self.add_subscriber_from_strings(builder, msg_type, &node_name(publisher))?;
                }
                Ok(Arc::new(builder.build()?))
            })
            .collect()
    }

    /// Nodes `start..end`, each publishing on its own name at `frequency` Hz
    pub fn create_periodic_publisher_nodes(
        &self,
        start: usize,
        end: usize,
        frequency: f64,
        msg_type: &str,
    ) -> TopologyResult<Vec<Arc<dyn Node>>> {
        check_range(start, end)?;
        (start..end)
            .map(|id| -> TopologyResult<Arc<dyn Node>> {
                let name = node_name(id);
                let period = frequency_to_period(&name, frequency)?;
                let builder = LoopbackNode::builder(self.domain.clone(), name.clone());
                let builder = self.add_periodic_publisher_from_strings(builder, msg_type, &name, period)?;
                Ok(Arc::new(builder.build()?))
            })
            .collect()
    }

    /// Nodes `start..end`, each calling `node_0..node_<n_services>` at `frequency` Hz
    pub fn create_periodic_client_nodes(
        &self,
        start: usize,
        end: usize,
        n_services: usize,
        frequency: f64,
        msg_type: &str,
        options: TrackerOptions,
    ) -> TopologyResult<Vec<Arc<dyn Node>>> {
        check_range(start, end)?;
        (start..end)
            .map(|id| -> TopologyResult<Arc<dyn Node>> {
                let period = frequency_to_period(&node_name(id), frequency)?;
                let mut builder = LoopbackNode::builder(self.domain.clone(), node_name(id))
                    .tracker_options(options);
                for service in 0..n_services {
                    builder = self.add_periodic_client_from_strings(
                        builder,
                        msg_type,
                        &node_name(service),
                        period,
                    )?;
                }
                Ok(Arc::new(builder.build()?))
            })
            .collect()
    }

    /// Nodes `start..end`, each serving a service named after itself
    pub fn create_server_nodes(
        &self,
        start: usize,
        end: usize,
        msg_type: &str,
    ) -> TopologyResult<Vec<Arc<dyn Node>>> {
        check_range(start, end)?;
        (start..end)
            .map(|id| -> TopologyResult<Arc<dyn Node>> {
                let name = node_name(id);
                let builder = LoopbackNode::builder(self.domain.clone(), name.clone());
                let builder = self.add_server_from_strings(builder, msg_type, &name)?;
                Ok(Arc::new(builder.build()?))
            })
            .collect()
    }

    /// Build one described node
    pub fn node_from_description(
        &self,
        description: &NodeDescription,
        options: TrackerOptions,
    ) -> TopologyResult<Arc<dyn Node>> {
        let mut builder = LoopbackNode::builder(self.domain.clone(), description.node_name.clone())
            .tracker_options(options);
        if let Some(id) = description.executor_id {
            builder = builder.executor_id(id);
        }

        for publisher in &description.publishers {
            builder = self.add_periodic_publisher_from_strings(
                builder,
                &publisher.msg_type,
                &publisher.topic_name,
                publisher.period()?,
            )?;
        }
        for subscriber in &description.subscribers {
            builder = self.add_subscriber_from_strings(builder, &subscriber.msg_type, &subscriber.topic_name)?;
        }
        for client in &description.clients {
            builder = self.add_periodic_client_from_strings(
                builder,
                &client.msg_type,
                &client.service_name,
                client.period()?,
            )?;
        }
        for server in &description.servers {
            builder = self.add_server_from_strings(builder, &server.msg_type, &server.service_name)?;
        }

        Ok(Arc::new(builder.build()?))
    }

    /// Build every node of a topology in declaration order
    pub fn nodes_from_description(
        &self,
        description: &TopologyDescription,
        options: TrackerOptions,
    ) -> TopologyResult<Vec<Arc<dyn Node>>> {
        description.validate()?;
        description
            .nodes
            .iter()
            .map(|node| self.node_from_description(node, options))
            .collect()
    }

    /// Read a topology file and build its nodes
    pub fn parse_topology(
        &self,
        path: impl AsRef<Path>,
        options: TrackerOptions,
    ) -> TopologyResult<Vec<Arc<dyn Node>>> {
        let description = TopologyDescription::from_file(path)?;
        let nodes = self.nodes_from_description(&description, options)?;
        tracing::info!(nodes = nodes.len(), "Topology built");
        Ok(nodes)
    }

    /// Read a topology file, build its nodes and derive the report labels
    pub fn load_topology(
        &self,
        path: impl AsRef<Path>,
        options: TrackerOptions,
    ) -> TopologyResult<(Vec<Arc<dyn Node>>, SystemInfo)> {
        let description = TopologyDescription::from_file(path)?;
        let info = description.system_info(&self.registry)?;
        let nodes = self.nodes_from_description(&description, options)?;
        tracing::info!(
            nodes = nodes.len(),
            pubs = info.pubs,
            subs = info.subs,
            "Topology built"
        );
        Ok((nodes, info))
    }
}
