//! Mock nodes and endpoints shared by unit tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::events::EventCode;
use crate::tracker::{Tracker, TrackerOptions};
use crate::traits::{Endpoint, EndpointInfo, EndpointKind, Node, Notice};

// ============================================================================
// Mock Endpoint
// ============================================================================

/// What a mock endpoint does on each callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    /// Record a sample of the given latency
    Record(Duration),
    /// Return a retryable error
    Fail,
    /// Return a fatal error
    Close,
    /// Panic
    Panic,
    /// Report a lost-message notice
    Notify,
}

/// Endpoint that ticks every `period` and acts according to its behavior
pub struct MockEndpoint {
    info: EndpointInfo,
    tracker: Arc<Tracker>,
    period: Duration,
    busy: Duration,
    behavior: Behavior,
    calls: AtomicUsize,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl MockEndpoint {
    pub fn new(node: &str, kind: EndpointKind, channel: &str, behavior: Behavior) -> Self {
        Self {
            info: EndpointInfo::new(kind, channel, "stamped10b"),
            tracker: Arc::new(Tracker::new(node, channel, TrackerOptions::default())),
            period: Duration::from_millis(5),
            busy: Duration::ZERO,
            behavior,
            calls: AtomicUsize::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Block the thread for `busy` inside each callback
    pub fn with_busy(mut self, busy: Duration) -> Self {
        self.busy = busy;
        self
    }

    /// Share overlap counters with other endpoints
    pub fn with_counters(mut self, active: Arc<AtomicUsize>, max_active: Arc<AtomicUsize>) -> Self {
        self.active = active;
        self.max_active = max_active;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Endpoint for MockEndpoint {
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    async fn service(&self) -> Result<Option<Notice>, TransportError> {
        tokio::time::sleep(self.period).await;
        self.calls.fetch_add(1, Ordering::SeqCst);

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.busy.is_zero() {
            std::thread::sleep(self.busy);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        match self.behavior {
            Behavior::Record(latency) => {
                self.tracker.record(latency, Some(Duration::from_secs(1)));
                Ok(None)
            }
            Behavior::Fail => Err(TransportError::Other("boom".to_string())),
            Behavior::Close => Err(TransportError::Closed(self.info.channel.clone())),
            Behavior::Panic => panic!("endpoint panicked"),
            Behavior::Notify => Ok(Some(Notice::new(EventCode::LostMessages, "1 message"))),
        }
    }
}

// ============================================================================
// Mock Node
// ============================================================================

/// Node with scripted discovery and a fixed set of endpoints
pub struct MockNode {
    name: String,
    executor_id: Option<usize>,
    endpoints: Vec<Arc<MockEndpoint>>,
    peers: Mutex<Vec<String>>,
    matched: AtomicUsize,
}

impl MockNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            executor_id: None,
            endpoints: Vec::new(),
            peers: Mutex::new(Vec::new()),
            matched: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn with_executor_id(mut self, id: usize) -> Self {
        self.executor_id = Some(id);
        self
    }

    pub fn with_endpoint(mut self, endpoint: MockEndpoint) -> Self {
        self.endpoints.push(Arc::new(endpoint));
        self
    }

    /// Node that records samples of `latency_us` on one subscriber endpoint
    pub fn recording(name: &str, latency_us: u64) -> Self {
        Self::new(name).with_endpoint(MockEndpoint::new(
            name,
            EndpointKind::Subscriber,
            "chatter",
            Behavior::Record(Duration::from_micros(latency_us)),
        ))
    }

    pub fn with_peers(self, peers: &[&str]) -> Self {
        *self.peers.lock() = peers.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Report no matched endpoints
    pub fn unmatched(self) -> Self {
        self.matched.store(0, Ordering::SeqCst);
        self
    }

    pub fn mock_endpoints(&self) -> &[Arc<MockEndpoint>] {
        &self.endpoints
    }

    pub fn total_calls(&self) -> usize {
        self.endpoints.iter().map(|e| e.calls()).sum()
    }
}

impl Node for MockNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn executor_id(&self) -> Option<usize> {
        self.executor_id
    }

    fn endpoints(&self) -> Vec<Arc<dyn Endpoint>> {
        self.endpoints
            .iter()
            .map(|e| Arc::clone(e) as Arc<dyn Endpoint>)
            .collect()
    }

    fn discovered_participants(&self) -> Vec<String> {
        self.peers.lock().clone()
    }

    fn matched_endpoints(&self, _endpoint: &EndpointInfo) -> usize {
        self.matched.load(Ordering::SeqCst)
    }
}
