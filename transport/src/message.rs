//! Messages exchanged over the loopback transport

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

/// A message type: a name and the payload size it carries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageType {
    /// Type tag, e.g. `stamped10kb`
    pub name: String,
    /// Payload size in bytes
    pub size: usize,
}

impl MessageType {
    /// Create a new message type
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// A timestamped message
///
/// The payload is shared, so fanning a message out to many subscribers does
/// not copy it.
#[derive(Debug, Clone)]
pub struct Stamped {
    /// Identifies the sending endpoint
    pub source: u64,
    /// Per-source sequence number, starting at 0
    pub sequence: u64,
    /// When the message was handed to the transport
    pub sent_at: Instant,
    /// Sending period of the source, if periodic
    pub period: Option<Duration>,
    /// Opaque payload
    pub payload: Arc<[u8]>,
}

impl Stamped {
    /// Create a message with a zeroed payload of `size` bytes
    pub fn new(source: u64, sequence: u64, period: Option<Duration>, size: usize) -> Self {
        Self {
            source,
            sequence,
            sent_at: Instant::now(),
            period,
            payload: vec![0u8; size].into(),
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// A service request and the channel its reply goes to
#[derive(Debug)]
pub struct Request {
    /// Request message
    pub message: Stamped,
    /// Reply channel
    pub reply: oneshot::Sender<Stamped>,
}
