//! Instrumented loopback endpoints

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};

use pubsub_bench_core::{
    Endpoint, EndpointInfo, EventCode, Notice, SampleClass, Tracker, TransportError,
};

use crate::domain::Domain;
use crate::message::{Request, Stamped};

/// Fixed-rate ticker; missed ticks are skipped rather than bunched
#[derive(Debug)]
struct Ticker {
    period: Duration,
    next: parking_lot::Mutex<Option<Instant>>,
}

impl Ticker {
    fn new(period: Duration) -> Self {
        Self {
            period,
            next: parking_lot::Mutex::new(None),
        }
    }

    async fn tick(&self) {
        let deadline = {
            let mut next = self.next.lock();
            let now = Instant::now();
            let deadline = match *next {
                Some(deadline) if deadline + self.period > now => deadline,
                Some(_) => now,
                None => now,
            };
            *next = Some(deadline + self.period);
            deadline
        };
        tokio::time::sleep_until(deadline.into()).await;
    }
}

fn notice_for(class: SampleClass, channel: &str, latency: Duration) -> Option<Notice> {
    match class {
        SampleClass::OnTime => None,
        SampleClass::Late => Some(Notice::new(
            EventCode::LateMessage,
            format!("{channel}: {} us", latency.as_micros()),
        )),
        SampleClass::TooLate => Some(Notice::new(
            EventCode::TooLateMessage,
            format!("{channel}: {} us", latency.as_micros()),
        )),
    }
}

// ============================================================================
// Publisher
// ============================================================================

/// Publishes a message every period and records how long publishing takes
pub struct PeriodicPublisher {
    info: EndpointInfo,
    tracker: Arc<Tracker>,
    sender: broadcast::Sender<Stamped>,
    ticker: Ticker,
    source: u64,
    sequence: AtomicU64,
    size: usize,
}

impl PeriodicPublisher {
    pub(crate) fn new(
        info: EndpointInfo,
        tracker: Arc<Tracker>,
        sender: broadcast::Sender<Stamped>,
        period: Duration,
        source: u64,
        size: usize,
    ) -> Self {
        tracker.set_msg_size(size);
        Self {
            info,
            tracker,
            sender,
            ticker: Ticker::new(period),
            source,
            sequence: AtomicU64::new(0),
            size,
        }
    }
}

#[async_trait]
impl Endpoint for PeriodicPublisher {
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    async fn service(&self) -> Result<Option<Notice>, TransportError> {
        self.ticker.tick().await;

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let message = Stamped::new(self.source, sequence, Some(self.ticker.period), self.size);
        let started = message.sent_at;
        // no receivers yet is not an error; the message is simply dropped
        let _ = self.sender.send(message);

        let elapsed = started.elapsed();
        let class = self.tracker.record(elapsed, Some(self.ticker.period));
        Ok(notice_for(class, &self.info.channel, elapsed))
    }
}

// ============================================================================
// Subscriber
// ============================================================================

/// Receives messages from a topic and records their one-way latency
pub struct Subscriber {
    info: EndpointInfo,
    tracker: Arc<Tracker>,
    receiver: tokio::sync::Mutex<broadcast::Receiver<Stamped>>,
    lagged: AtomicBool,
}

impl Subscriber {
    pub(crate) fn new(
        info: EndpointInfo,
        tracker: Arc<Tracker>,
        receiver: broadcast::Receiver<Stamped>,
        size: usize,
    ) -> Self {
        tracker.set_msg_size(size);
        Self {
            info,
            tracker,
            receiver: tokio::sync::Mutex::new(receiver),
            lagged: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Endpoint for Subscriber {
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    async fn service(&self) -> Result<Option<Notice>, TransportError> {
        let mut receiver = self.receiver.lock().await;
        match receiver.recv().await {
            Ok(message) => {
                let latency = message.sent_at.elapsed();
                let class = self.tracker.record(latency, message.period);
                let lost = self.tracker.track_sequence(message.source, message.sequence);
                // a lag was already reported for this gap
                let after_lag = self.lagged.swap(false, Ordering::Relaxed);
                if lost > 0 && !after_lag {
                    return Ok(Some(Notice::new(
                        EventCode::LostMessages,
                        format!("{}: {} messages", self.info.channel, lost),
                    )));
                }
                Ok(notice_for(class, &self.info.channel, latency))
            }
            // skipped messages are counted as a sequence gap on the next receive
            Err(RecvError::Lagged(skipped)) => {
                self.lagged.store(true, Ordering::Relaxed);
                Ok(Some(Notice::new(
                    EventCode::LostMessages,
                    format!("{}: lagged behind by {} messages", self.info.channel, skipped),
                )))
            }
            Err(RecvError::Closed) => Err(TransportError::Closed(self.info.channel.clone())),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Sends a request every period and records the round trip
pub struct PeriodicClient {
    info: EndpointInfo,
    tracker: Arc<Tracker>,
    domain: Arc<Domain>,
    owner: String,
    ticker: Ticker,
    source: u64,
    sequence: AtomicU64,
    size: usize,
}

impl PeriodicClient {
    pub(crate) fn new(
        info: EndpointInfo,
        tracker: Arc<Tracker>,
        domain: Arc<Domain>,
        owner: String,
        period: Duration,
        size: usize,
    ) -> Self {
        tracker.set_msg_size(size);
        let source = domain.next_source_id();
        Self {
            info,
            tracker,
            domain,
            owner,
            ticker: Ticker::new(period),
            source,
            sequence: AtomicU64::new(0),
            size,
        }
    }
}

#[async_trait]
impl Endpoint for PeriodicClient {
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    async fn service(&self) -> Result<Option<Notice>, TransportError> {
        self.ticker.tick().await;

        let channel = &self.info.channel;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let server = self
            .domain
            .server_for(&self.owner, channel, sequence)
            .ok_or_else(|| TransportError::NoCounterpart(channel.clone()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let message = Stamped::new(self.source, sequence, Some(self.ticker.period), self.size);
        let sent_at = message.sent_at;
        server
            .send(Request {
                message,
                reply: reply_tx,
            })
            .await
            .map_err(|_| TransportError::NoCounterpart(channel.clone()))?;

        let timeout = self.domain.config().request_timeout;
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(_reply)) => {
                let round_trip = sent_at.elapsed();
                let class = self.tracker.record(round_trip, Some(self.ticker.period));
                Ok(notice_for(class, channel, round_trip))
            }
            Ok(Err(_)) => Err(TransportError::NoCounterpart(channel.clone())),
            Err(_) => {
                self.tracker.add_lost(1);
                Err(TransportError::Timeout {
                    channel: channel.clone(),
                    timeout,
                })
            }
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// Answers requests and records how long they took to arrive
pub struct Server {
    info: EndpointInfo,
    tracker: Arc<Tracker>,
    requests: tokio::sync::Mutex<mpsc::Receiver<Request>>,
    size: usize,
}

impl Server {
    pub(crate) fn new(
        info: EndpointInfo,
        tracker: Arc<Tracker>,
        requests: mpsc::Receiver<Request>,
        size: usize,
    ) -> Self {
        tracker.set_msg_size(size);
        Self {
            info,
            tracker,
            requests: tokio::sync::Mutex::new(requests),
            size,
        }
    }
}

#[async_trait]
impl Endpoint for Server {
    fn info(&self) -> &EndpointInfo {
        &self.info
    }

    fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    async fn service(&self) -> Result<Option<Notice>, TransportError> {
        let request = self
            .requests
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| TransportError::Closed(self.info.channel.clone()))?;

        let latency = request.message.sent_at.elapsed();
        let class = self.tracker.record(latency, request.message.period);
        let reply = Stamped::new(
            request.message.source,
            request.message.sequence,
            None,
            self.size,
        );
        // the client may have timed out already
        let _ = request.reply.send(reply);
        Ok(notice_for(class, &self.info.channel, latency))
    }
}
