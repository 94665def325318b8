//! Per-endpoint latency tracker

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::metrics::LatencyStats;

/// Thresholds used to classify samples as late or too late
///
/// A threshold is the smaller of its absolute bound and its percentage of the
/// expected period. Endpoints without a period only use the absolute bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerOptions {
    /// Late threshold as a percentage of the period
    pub late_percentage: u32,
    /// Late threshold in microseconds
    pub late_absolute_us: u64,
    /// Too-late threshold as a percentage of the period
    pub too_late_percentage: u32,
    /// Too-late threshold in microseconds
    pub too_late_absolute_us: u64,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            late_percentage: 20,
            late_absolute_us: 5_000,
            too_late_percentage: 100,
            too_late_absolute_us: 50_000,
        }
    }
}

impl TrackerOptions {
    /// Option keys accepted in configuration files
    pub fn recognized_options() -> &'static [&'static str] {
        &[
            "late_percentage",
            "late_absolute_us",
            "too_late_percentage",
            "too_late_absolute_us",
        ]
    }

    fn threshold(absolute_us: u64, percentage: u32, period: Option<Duration>) -> Duration {
        let absolute = Duration::from_micros(absolute_us);
        match period {
            Some(period) if !period.is_zero() => {
                absolute.min(period.mul_f64(f64::from(percentage) / 100.0))
            }
            _ => absolute,
        }
    }

    /// Latency above which a sample counts as late
    pub fn late_threshold(&self, period: Option<Duration>) -> Duration {
        Self::threshold(self.late_absolute_us, self.late_percentage, period)
    }

    /// Latency above which a sample counts as too late
    pub fn too_late_threshold(&self, period: Option<Duration>) -> Duration {
        Self::threshold(self.too_late_absolute_us, self.too_late_percentage, period)
    }
}

/// Classification of a recorded sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleClass {
    /// Within the late threshold
    OnTime,
    /// Above the late threshold, still part of the statistics
    Late,
    /// Above the too-late threshold, counted but excluded from the statistics
    TooLate,
}

/// Snapshot of what a tracker has collected
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackerStats {
    /// Samples received (including late and too-late ones)
    pub received: u64,
    /// Late samples
    pub late: u64,
    /// Too-late samples
    pub too_late: u64,
    /// Messages detected as lost
    pub lost: u64,
    /// Payload size in bytes
    pub msg_size: usize,
    /// Latency of every sample that was not too late
    pub latency: LatencyStats,
}

impl TrackerStats {
    /// Combine another snapshot into this one
    pub fn merge(&mut self, other: &TrackerStats) {
        self.received += other.received;
        self.late += other.late;
        self.too_late += other.too_late;
        self.lost += other.lost;
        self.msg_size = self.msg_size.max(other.msg_size);
        self.latency.merge(&other.latency);
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    stats: TrackerStats,
    last_sequence: HashMap<u64, u64>,
}

/// Collects timing samples for one endpoint
///
/// Written by the endpoint's own service loop and read by the system only
/// after every executor thread has been joined.
#[derive(Debug)]
pub struct Tracker {
    node: String,
    channel: String,
    options: TrackerOptions,
    state: Mutex<TrackerState>,
}

impl Tracker {
    /// Create a tracker for `channel` on `node`
    pub fn new(node: impl Into<String>, channel: impl Into<String>, options: TrackerOptions) -> Self {
        Self {
            node: node.into(),
            channel: channel.into(),
            options,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Owning node name
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Topic or service name
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Classification thresholds
    pub fn options(&self) -> &TrackerOptions {
        &self.options
    }

    /// Set the payload size reported for this endpoint
    pub fn set_msg_size(&self, size: usize) {
        self.state.lock().stats.msg_size = size;
    }

    /// Record one latency sample; `period` is the expected message period
    pub fn record(&self, latency: Duration, period: Option<Duration>) -> SampleClass {
        let class = if latency > self.options.too_late_threshold(period) {
            SampleClass::TooLate
        } else if latency > self.options.late_threshold(period) {
            SampleClass::Late
        } else {
            SampleClass::OnTime
        };

        let mut state = self.state.lock();
        state.stats.received += 1;
        match class {
            SampleClass::TooLate => state.stats.too_late += 1,
            SampleClass::Late => {
                state.stats.late += 1;
                state.stats.latency.record(latency);
            }
            SampleClass::OnTime => state.stats.latency.record(latency),
        }
        class
    }

    /// Track the sequence number of a message from `source`
    ///
    /// Returns the number of messages newly detected as lost.
    pub fn track_sequence(&self, source: u64, sequence: u64) -> u64 {
        let mut state = self.state.lock();
        let lost = match state.last_sequence.get(&source) {
            Some(&last) if sequence > last + 1 => sequence - last - 1,
            Some(_) => 0,
            // first message seen from this source; earlier ones predate the subscription
            None => 0,
        };
        let last = state.last_sequence.entry(source).or_insert(sequence);
        *last = (*last).max(sequence);
        state.stats.lost += lost;
        lost
    }

    /// Add messages known to be lost without sequence information
    pub fn add_lost(&self, count: u64) {
        self.state.lock().stats.lost += count;
    }

    /// Snapshot of the collected statistics
    pub fn statistics(&self) -> TrackerStats {
        self.state.lock().stats
    }
}
