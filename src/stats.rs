//! Event pipeline counters.
//!
//! Every event that leaves the queue ends in exactly one bucket. None of these
//! outcomes is an error: a removed pin, a bounce and a repeated value are all
//! expected, and the counters are the only place they become visible.

use core::sync::atomic::{AtomicU32, Ordering};

/// Thread-safe pipeline counters.
///
/// Written by the event processor and the trigger executor, read by the
/// control context for status reporting.
pub struct PipelineStats {
    /// Events forwarded to the publisher.
    published: AtomicU32,

    /// Dropped by the debounce window.
    debounced: AtomicU32,

    /// Dropped by change detection.
    unchanged: AtomicU32,

    /// Pin was removed while the event was in flight.
    orphaned: AtomicU32,

    /// Pin was owned by a running pulse.
    suppressed: AtomicU32,
}

impl PipelineStats {
    pub const fn new() -> Self {
        Self {
            published: AtomicU32::new(0),
            debounced: AtomicU32::new(0),
            unchanged: AtomicU32::new(0),
            orphaned: AtomicU32::new(0),
            suppressed: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_debounced(&self) {
        self.debounced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_orphaned(&self) {
        self.orphaned.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            debounced: self.debounced.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            evicted: 0,
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of pipeline counters (for diagnostics).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub published: u32,
    pub debounced: u32,
    pub unchanged: u32,
    pub orphaned: u32,
    pub suppressed: u32,
    /// Queue evictions, filled in by the owner of the queue.
    pub evicted: u32,
}

impl StatsSnapshot {
    /// Events that left the queue without being published.
    pub fn discarded(&self) -> u32 {
        self.debounced + self.unchanged + self.orphaned + self.suppressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = PipelineStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_counters_are_independent() {
        let stats = PipelineStats::new();
        stats.record_published();
        stats.record_published();
        stats.record_debounced();
        stats.record_orphaned();

        let snap = stats.snapshot();
        assert_eq!(snap.published, 2);
        assert_eq!(snap.debounced, 1);
        assert_eq!(snap.unchanged, 0);
        assert_eq!(snap.orphaned, 1);
        assert_eq!(snap.discarded(), 2);
    }
}
