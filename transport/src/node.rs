//! Loopback node and its builder

use std::sync::Arc;
use std::time::Duration;

use pubsub_bench_core::{
    BenchError, BenchResult, Endpoint, EndpointInfo, EndpointKind, Node, Tracker, TrackerOptions,
};

use crate::domain::Domain;
use crate::endpoints::{PeriodicClient, PeriodicPublisher, Server, Subscriber};
use crate::message::MessageType;

/// A node whose endpoints talk through a [`Domain`]
pub struct LoopbackNode {
    name: String,
    executor_id: Option<usize>,
    domain: Arc<Domain>,
    endpoints: Vec<Arc<dyn Endpoint>>,
}

impl LoopbackNode {
    /// Start building a node called `name` in `domain`
    pub fn builder(domain: Arc<Domain>, name: impl Into<String>) -> LoopbackNodeBuilder {
        LoopbackNodeBuilder::new(domain, name)
    }

    /// Domain this node belongs to
    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }
}

impl Node for LoopbackNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn executor_id(&self) -> Option<usize> {
        self.executor_id
    }

    fn endpoints(&self) -> Vec<Arc<dyn Endpoint>> {
        self.endpoints.clone()
    }

    fn discovered_participants(&self) -> Vec<String> {
        self.domain.discovered_by(&self.name)
    }

    fn matched_endpoints(&self, endpoint: &EndpointInfo) -> usize {
        match endpoint.kind {
            EndpointKind::Subscriber => self.domain.matched_publishers(&self.name, &endpoint.channel),
            EndpointKind::Client => self.domain.matched_servers(&self.name, &endpoint.channel),
            EndpointKind::Publisher | EndpointKind::Server => 0,
        }
    }
}

impl std::fmt::Debug for LoopbackNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackNode")
            .field("name", &self.name)
            .field("executor_id", &self.executor_id)
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
struct EndpointSpec {
    kind: EndpointKind,
    channel: String,
    msg_type: MessageType,
    period: Option<Duration>,
}

/// Builder for [`LoopbackNode`]
///
/// # Example
///
/// ```ignore
/// let node = LoopbackNode::builder(domain, "node_0")
///     .add_periodic_publisher("chatter", &msg, Duration::from_millis(10))
///     .add_subscriber("feedback", &msg)
///     .executor_id(1)
///     .build()?;
/// ```
pub struct LoopbackNodeBuilder {
    domain: Arc<Domain>,
    name: String,
    executor_id: Option<usize>,
    options: TrackerOptions,
    endpoints: Vec<EndpointSpec>,
}

impl LoopbackNodeBuilder {
    /// Create a new builder
    pub fn new(domain: Arc<Domain>, name: impl Into<String>) -> Self {
        Self {
            domain,
            name: name.into(),
            executor_id: None,
            options: TrackerOptions::default(),
            endpoints: Vec::new(),
        }
    }

    /// Ask to be placed on executor `id`
    pub fn executor_id(mut self, id: usize) -> Self {
        self.executor_id = Some(id);
        self
    }

    /// Late / too-late thresholds of every endpoint
    pub fn tracker_options(mut self, options: TrackerOptions) -> Self {
        self.options = options;
        self
    }

    fn push(mut self, kind: EndpointKind, channel: &str, msg_type: &MessageType, period: Option<Duration>) -> Self {
        self.endpoints.push(EndpointSpec {
            kind,
            channel: channel.to_string(),
            msg_type: msg_type.clone(),
            period,
        });
        self
    }

    /// Publish on `topic` every `period`
    pub fn add_periodic_publisher(self, topic: &str, msg_type: &MessageType, period: Duration) -> Self {
        self.push(EndpointKind::Publisher, topic, msg_type, Some(period))
    }

    /// Subscribe to `topic`
    pub fn add_subscriber(self, topic: &str, msg_type: &MessageType) -> Self {
        self.push(EndpointKind::Subscriber, topic, msg_type, None)
    }

    /// Call `service` every `period`
    pub fn add_periodic_client(self, service: &str, msg_type: &MessageType, period: Duration) -> Self {
        self.push(EndpointKind::Client, service, msg_type, Some(period))
    }

    /// Serve `service`
    pub fn add_server(self, service: &str, msg_type: &MessageType) -> Self {
        self.push(EndpointKind::Server, service, msg_type, None)
    }

    /// Join the domain and create the endpoints
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty node name or a zero period.
    pub fn build(self) -> BenchResult<LoopbackNode> {
        if self.name.is_empty() {
            return Err(BenchError::config("node name must not be empty"));
        }
        if let Some(spec) = self.endpoints.iter().find(|s| s.period == Some(Duration::ZERO)) {
            return Err(BenchError::config(format!(
                "{} '{}' on node '{}' has a zero period",
                spec.kind, spec.channel, self.name
            )));
        }

        let domain = self.domain;
        domain.join(&self.name);

        let endpoints = self
            .endpoints
            .into_iter()
            .map(|spec| {
                let info = EndpointInfo::new(spec.kind, spec.channel.clone(), spec.msg_type.name.clone());
                let tracker = Arc::new(Tracker::new(self.name.clone(), spec.channel.clone(), self.options));
                let size = spec.msg_type.size;
                let period = spec.period.unwrap_or_default();

                let endpoint: Arc<dyn Endpoint> = match spec.kind {
                    EndpointKind::Publisher => {
                        let sender = domain.register_publisher(&self.name, &spec.channel);
                        Arc::new(PeriodicPublisher::new(
                            info,
                            tracker,
                            sender,
                            period,
                            domain.next_source_id(),
                            size,
                        ))
                    }
                    EndpointKind::Subscriber => {
                        let receiver = domain.subscribe(&spec.channel);
                        Arc::new(Subscriber::new(info, tracker, receiver, size))
                    }
                    EndpointKind::Client => Arc::new(PeriodicClient::new(
                        info,
                        tracker,
                        Arc::clone(&domain),
                        self.name.clone(),
                        period,
                        size,
                    )),
                    EndpointKind::Server => {
                        let requests = domain.register_server(&self.name, &spec.channel);
                        Arc::new(Server::new(info, tracker, requests, size))
                    }
                };
                endpoint
            })
            .collect::<Vec<_>>();

        tracing::debug!(node = %self.name, endpoints = endpoints.len(), "Loopback node created");

        Ok(LoopbackNode {
            name: self.name,
            executor_id: self.executor_id,
            domain,
            endpoints,
        })
    }
}
