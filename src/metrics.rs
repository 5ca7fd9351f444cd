//! Inspection counters for the pool

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time population counts.
///
/// The three fields are sampled independently, not under one lock; callers
/// must not assume the combination is ever an exact snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Total live handles, busy and idle combined
    pub opened: usize,

    /// Handles currently borrowed by callers
    pub busy: usize,

    /// Handles cached for reuse
    pub idle: usize,
}

/// Cumulative counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Opener successes
    pub total_created: u64,

    /// Successful acquisitions
    pub total_acquired: u64,

    /// Acquisitions served from the idle buffer
    pub total_recycled: u64,

    /// Handles dropped by a staleness or usability check
    pub total_evicted: u64,

    /// Handles closed outside an eviction check: explicit discards, full
    /// idle buffer, outlived handles, un-returned drops, and the
    /// shutdown drain
    pub total_discarded: u64,
}

/// Internal counter tracker
pub(crate) struct MetricsTracker {
    pub total_created: AtomicU64,
    pub total_acquired: AtomicU64,
    pub total_recycled: AtomicU64,
    pub total_evicted: AtomicU64,
    pub total_discarded: AtomicU64,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            total_created: AtomicU64::new(0),
            total_acquired: AtomicU64::new(0),
            total_recycled: AtomicU64::new(0),
            total_evicted: AtomicU64::new(0),
            total_discarded: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> PoolMetrics {
        PoolMetrics {
            total_created: self.total_created.load(Ordering::Relaxed),
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_recycled: self.total_recycled.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
            total_discarded: self.total_discarded.load(Ordering::Relaxed),
        }
    }
}
