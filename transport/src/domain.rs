//! Shared registry of participants, topics and services
//!
//! A [`Domain`] stands in for the discovery protocol of a real middleware.
//! Participants become visible to each other `pdp_delay` after joining and
//! endpoints become matchable `edp_delay` after they are registered.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::message::{Request, Stamped};

/// Domain settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainConfig {
    /// Delay before a joined participant is discovered by others
    pub pdp_delay: Duration,
    /// Delay before a registered endpoint can be matched
    pub edp_delay: Duration,
    /// Messages buffered per topic before slow subscribers lag
    pub topic_capacity: usize,
    /// Pending requests buffered per server
    pub service_capacity: usize,
    /// How long a client waits for a reply
    pub request_timeout: Duration,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            pdp_delay: Duration::ZERO,
            edp_delay: Duration::ZERO,
            topic_capacity: 1024,
            service_capacity: 64,
            request_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
struct PublisherEntry {
    owner: String,
    topic: String,
    registered_at: Instant,
}

#[derive(Debug)]
struct ServerEntry {
    owner: String,
    registered_at: Instant,
    requests: mpsc::Sender<Request>,
}

#[derive(Debug, Default)]
struct DomainState {
    participants: HashMap<String, Instant>,
    hidden: HashSet<String>,
    topics: HashMap<String, broadcast::Sender<Stamped>>,
    publishers: Vec<PublisherEntry>,
    servers: HashMap<String, Vec<ServerEntry>>,
}

impl DomainState {
    fn visible(&self, observer: &str, owner: &str, pdp_delay: Duration, now: Instant) -> bool {
        if observer == owner {
            return true;
        }
        if self.hidden.contains(owner) {
            return false;
        }
        self.participants
            .get(owner)
            .map(|joined| *joined + pdp_delay <= now)
            .unwrap_or(false)
    }
}

/// In-process discovery domain
#[derive(Debug)]
pub struct Domain {
    config: DomainConfig,
    state: Mutex<DomainState>,
    next_source: AtomicU64,
}

impl Domain {
    /// Create a domain
    pub fn new(config: DomainConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(DomainState::default()),
            next_source: AtomicU64::new(1),
        })
    }

    /// Domain settings
    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    /// Add a participant
    pub fn join(&self, name: &str) {
        self.state
            .lock()
            .participants
            .entry(name.to_string())
            .or_insert_with(Instant::now);
        tracing::debug!(participant = name, "Participant joined");
    }

    /// Make a participant permanently undiscoverable by others
    pub fn hide(&self, name: &str) {
        self.state.lock().hidden.insert(name.to_string());
    }

    /// Participants `observer` has discovered so far
    pub fn discovered_by(&self, observer: &str) -> Vec<String> {
        let now = Instant::now();
        let state = self.state.lock();
        let mut names: Vec<String> = state
            .participants
            .keys()
            .filter(|name| name.as_str() != observer)
            .filter(|name| state.visible(observer, name, self.config.pdp_delay, now))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Allocate an id for a message source
    pub fn next_source_id(&self) -> u64 {
        self.next_source.fetch_add(1, Ordering::Relaxed)
    }

    /// Sender of `topic`, creating the topic if needed
    pub fn topic(&self, topic: &str) -> broadcast::Sender<Stamped> {
        let capacity = self.config.topic_capacity.max(1);
        self.state
            .lock()
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .clone()
    }

    /// Declare a publisher of `topic` owned by `owner`
    pub fn register_publisher(&self, owner: &str, topic: &str) -> broadcast::Sender<Stamped> {
        let sender = self.topic(topic);
        self.state.lock().publishers.push(PublisherEntry {
            owner: owner.to_string(),
            topic: topic.to_string(),
            registered_at: Instant::now(),
        });
        sender
    }

    /// Subscribe to `topic`
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Stamped> {
        self.topic(topic).subscribe()
    }

    /// Publishers of `topic` that `observer` is matched with
    pub fn matched_publishers(&self, observer: &str, topic: &str) -> usize {
        let now = Instant::now();
        let state = self.state.lock();
        state
            .publishers
            .iter()
            .filter(|p| p.topic == topic)
            .filter(|p| p.registered_at + self.config.edp_delay <= now)
            .filter(|p| state.visible(observer, &p.owner, self.config.pdp_delay, now))
            .count()
    }

    /// Declare a server of `service` owned by `owner`
    pub fn register_server(&self, owner: &str, service: &str) -> mpsc::Receiver<Request> {
        let (tx, rx) = mpsc::channel(self.config.service_capacity.max(1));
        self.state
            .lock()
            .servers
            .entry(service.to_string())
            .or_default()
            .push(ServerEntry {
                owner: owner.to_string(),
                registered_at: Instant::now(),
                requests: tx,
            });
        rx
    }

    fn ready_servers(&self, observer: &str, service: &str) -> Vec<mpsc::Sender<Request>> {
        let now = Instant::now();
        let state = self.state.lock();
        state
            .servers
            .get(service)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|s| s.registered_at + self.config.edp_delay <= now)
                    .filter(|s| state.visible(observer, &s.owner, self.config.pdp_delay, now))
                    .map(|s| s.requests.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Servers of `service` that `observer` is matched with
    pub fn matched_servers(&self, observer: &str, service: &str) -> usize {
        self.ready_servers(observer, service).len()
    }

    /// A matched server of `service`, chosen by `hint` among the ready ones
    pub fn server_for(&self, observer: &str, service: &str, hint: u64) -> Option<mpsc::Sender<Request>> {
        let servers = self.ready_servers(observer, service);
        if servers.is_empty() {
            return None;
        }
        let index = (hint % servers.len() as u64) as usize;
        servers.into_iter().nth(index)
    }
}
