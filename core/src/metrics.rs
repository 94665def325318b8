//! Running latency statistics with mergeable moments

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Latency summary over a set of samples (all values in microseconds)
///
/// Samples are accumulated with Welford's update and two summaries are
/// combined with Chan's parallel formula, so per-tracker statistics can be
/// merged into node and system totals without keeping raw samples around.
/// An empty summary (`count == 0`) is the identity of [`LatencyStats::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Number of samples
    pub count: u64,
    /// Mean latency
    pub mean: f64,
    /// Sum of squared distances from the mean
    m2: f64,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
}

impl LatencyStats {
    /// Create an empty summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a summary from raw microsecond values
    pub fn from_values(values: &[f64]) -> Self {
        let mut stats = Self::new();
        for &value in values {
            stats.record_us(value);
        }
        stats
    }

    /// Add one sample
    pub fn record(&mut self, latency: Duration) {
        self.record_us(latency.as_secs_f64() * 1_000_000.0);
    }

    /// Add one sample expressed in microseconds
    pub fn record_us(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Combine another summary into this one
    pub fn merge(&mut self, other: &LatencyStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }

        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let n = n_a + n_b;
        let delta = other.mean - self.mean;

        self.mean = (n_a * self.mean + n_b * other.mean) / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Return the merge of two summaries
    pub fn merged(mut self, other: &LatencyStats) -> Self {
        self.merge(other);
        self
    }

    /// Population variance
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).max(0.0)
        }
    }

    /// Population standard deviation
    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Whether no samples were recorded
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl<'a> std::iter::Sum<&'a LatencyStats> for LatencyStats {
    fn sum<I: Iterator<Item = &'a LatencyStats>>(iter: I) -> Self {
        iter.fold(LatencyStats::new(), |acc, s| acc.merged(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-6 * (1.0 + a.abs().max(b.abs()))
    }

    #[test]
    fn test_from_values() {
        let stats = LatencyStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.count, 8);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert!(close(stats.mean, 5.0));
        assert!(close(stats.stddev(), 2.0));
    }

    #[test]
    fn test_empty_stats() {
        let stats = LatencyStats::new();
        assert!(stats.is_empty());
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.stddev(), 0.0);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 0.0);
    }

    #[test]
    fn test_single_value() {
        let mut stats = LatencyStats::new();
        stats.record(Duration::from_micros(42));
        assert_eq!(stats.count, 1);
        assert!(close(stats.mean, 42.0));
        assert_eq!(stats.stddev(), 0.0);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let a = LatencyStats::from_values(&[1.0, 2.0, 3.0]);
        let b = LatencyStats::from_values(&[10.0, 20.0]);
        let all = LatencyStats::from_values(&[1.0, 2.0, 3.0, 10.0, 20.0]);

        let merged = a.merged(&b);
        assert_eq!(merged.count, 5);
        assert!(close(merged.mean, all.mean));
        assert!(close(merged.stddev(), all.stddev()));
        assert_eq!(merged.min, 1.0);
        assert_eq!(merged.max, 20.0);
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let a = LatencyStats::from_values(&[5.0, 6.0]);
        assert_eq!(a.merged(&LatencyStats::new()), a);
        assert_eq!(LatencyStats::new().merged(&a), a);
    }

    #[test]
    fn test_non_finite_ignored() {
        let stats = LatencyStats::from_values(&[1.0, f64::NAN, f64::INFINITY, 3.0]);
        assert_eq!(stats.count, 2);
        assert!(close(stats.mean, 2.0));
    }

    proptest! {
        #[test]
        fn merge_is_order_independent(
            a in prop::collection::vec(0.0f64..1e6, 0..50),
            b in prop::collection::vec(0.0f64..1e6, 0..50),
        ) {
            let sa = LatencyStats::from_values(&a);
            let sb = LatencyStats::from_values(&b);
            let ab = sa.merged(&sb);
            let ba = sb.merged(&sa);
            prop_assert_eq!(ab.count, ba.count);
            prop_assert!(close(ab.mean, ba.mean));
            prop_assert!(close(ab.stddev(), ba.stddev()));
            prop_assert_eq!(ab.min, ba.min);
            prop_assert_eq!(ab.max, ba.max);
        }

        #[test]
        fn empty_tracker_does_not_shift_aggregate(
            a in prop::collection::vec(0.0f64..1e6, 1..50),
        ) {
            let sa = LatencyStats::from_values(&a);
            let with_empty = sa.merged(&LatencyStats::new());
            prop_assert_eq!(with_empty, sa);
        }
    }
}
