//! Observability counters for the interception pipeline.
//!
//! Atomic counters, cheap to bump from any event-loop thread. A snapshot can
//! be taken at any point without stopping the pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters for pipeline activity and buffer accounting.
#[derive(Debug)]
pub struct Metrics {
    /// Packets that entered the pipeline
    pub packets_intercepted: AtomicU64,
    /// Packets passed through untouched
    pub packets_passed_through: AtomicU64,
    /// Packets re-serialized after listener mutation
    pub packets_rewritten: AtomicU64,
    /// Packets cancelled by a listener
    pub packets_cancelled: AtomicU64,
    /// Packets dropped due to malformed data
    pub packets_dropped: AtomicU64,
    /// Listener invocations that returned an error
    pub listener_errors: AtomicU64,
    /// Replacement buffers allocated on the rewrite path
    pub buffers_allocated: AtomicU64,
    /// Buffers released by the pipeline
    pub buffers_released: AtomicU64,
    /// One-time compression relocations performed
    pub compression_relocations: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            packets_intercepted: AtomicU64::new(0),
            packets_passed_through: AtomicU64::new(0),
            packets_rewritten: AtomicU64::new(0),
            packets_cancelled: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            listener_errors: AtomicU64::new(0),
            buffers_allocated: AtomicU64::new(0),
            buffers_released: AtomicU64::new(0),
            compression_relocations: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Consistent-enough point-in-time view of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_intercepted: self.packets_intercepted.load(Ordering::Relaxed),
            packets_passed_through: self.packets_passed_through.load(Ordering::Relaxed),
            packets_rewritten: self.packets_rewritten.load(Ordering::Relaxed),
            packets_cancelled: self.packets_cancelled.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            listener_errors: self.listener_errors.load(Ordering::Relaxed),
            buffers_allocated: self.buffers_allocated.load(Ordering::Relaxed),
            buffers_released: self.buffers_released.load(Ordering::Relaxed),
            compression_relocations: self.compression_relocations.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            intercepted = s.packets_intercepted,
            passed_through = s.packets_passed_through,
            rewritten = s.packets_rewritten,
            cancelled = s.packets_cancelled,
            dropped = s.packets_dropped,
            listener_errors = s.listener_errors,
            uptime_secs = s.uptime_secs,
            "pipeline metrics"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_intercepted: u64,
    pub packets_passed_through: u64,
    pub packets_rewritten: u64,
    pub packets_cancelled: u64,
    pub packets_dropped: u64,
    pub listener_errors: u64,
    pub buffers_allocated: u64,
    pub buffers_released: u64,
    pub compression_relocations: u64,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.packets_intercepted.fetch_add(3, Ordering::Relaxed);
        metrics.packets_cancelled.fetch_add(1, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.packets_intercepted, 3);
        assert_eq!(snapshot.packets_cancelled, 1);
        assert_eq!(snapshot.packets_rewritten, 0);
    }
}
