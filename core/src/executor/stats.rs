//! Executor statistics tracking

use std::time::{Duration, Instant};

/// Statistics tracked by each executor
#[derive(Debug, Default, Clone)]
pub struct ExecutorStats {
    /// Number of serviced units of work
    pub callbacks: usize,

    /// Number of callbacks that returned an error
    pub errors: usize,

    /// Endpoint loops that ended on a fatal error before shutdown
    pub stopped_endpoints: usize,

    /// Whether a service loop panicked
    pub panicked: bool,

    /// Executor start time
    pub started_at: Option<Instant>,

    /// Executor end time
    pub ended_at: Option<Instant>,
}

impl ExecutorStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking (records start time)
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop tracking (records end time)
    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Record a serviced callback
    pub fn record_callback(&mut self) {
        self.callbacks += 1;
    }

    /// Record a failed callback
    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }

    /// Get callbacks per second
    pub fn callbacks_per_second(&self) -> f64 {
        self.elapsed()
            .map(|d| {
                let secs = d.as_secs_f64();
                if secs > 0.0 {
                    self.callbacks as f64 / secs
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0)
    }

    /// Merge counters from another loop or executor
    pub fn merge(&mut self, other: &ExecutorStats) {
        self.callbacks += other.callbacks;
        self.errors += other.errors;
        self.stopped_endpoints += other.stopped_endpoints;
        self.panicked |= other.panicked;
        self.started_at = match (self.started_at, other.started_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.ended_at = match (self.ended_at, other.ended_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_stats_defaults() {
        let stats = ExecutorStats::default();
        assert_eq!(stats.callbacks, 0);
        assert_eq!(stats.errors, 0);
        assert!(!stats.panicked);
        assert!(stats.elapsed().is_none());
        assert_eq!(stats.callbacks_per_second(), 0.0);
    }

    #[test]
    fn test_executor_stats_merge() {
        let mut a = ExecutorStats::new();
        a.start();
        a.record_callback();
        a.record_error();

        let mut b = ExecutorStats::new();
        b.record_callback();
        b.record_callback();
        b.stopped_endpoints = 1;
        b.stop();

        a.merge(&b);
        assert_eq!(a.callbacks, 3);
        assert_eq!(a.errors, 1);
        assert_eq!(a.stopped_endpoints, 1);
        assert!(a.started_at.is_some());
        assert!(a.ended_at.is_some());
    }

    #[test]
    fn test_elapsed_uses_end_time() {
        let mut stats = ExecutorStats::new();
        stats.start();
        std::thread::sleep(Duration::from_millis(5));
        stats.stop();
        let first = stats.elapsed().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(stats.elapsed().unwrap(), first);
    }
}
