//! Global atomic counters for Gitter Runner.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    deliveries_received: AtomicU64,
    duplicates_dropped: AtomicU64,
    verifications_passed: AtomicU64,
    verifications_failed: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    phases_aborted: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            deliveries_received: AtomicU64::new(0),
            duplicates_dropped: AtomicU64::new(0),
            verifications_passed: AtomicU64::new(0),
            verifications_failed: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            phases_aborted: AtomicU64::new(0),
        }
    }

    pub fn inc_deliveries(&self) {
        self.deliveries_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_duplicates(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a verification outcome.
    pub fn record_verification(&self, passed: bool) {
        let counter = if passed {
            &self.verifications_passed
        } else {
            &self.verifications_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tool run outcome (dry or real).
    pub fn record_run(&self, succeeded: bool) {
        let counter = if succeeded {
            &self.runs_succeeded
        } else {
            &self.runs_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_aborted(&self) {
        self.phases_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            deliveries_received = self.deliveries_received(),
            duplicates_dropped = self.duplicates_dropped(),
            verifications_passed = self.verifications_passed(),
            verifications_failed = self.verifications_failed(),
            runs_succeeded = self.runs_succeeded(),
            runs_failed = self.runs_failed(),
            phases_aborted = self.phases_aborted(),
        );
    }

    pub fn deliveries_received(&self) -> u64 {
        self.deliveries_received.load(Ordering::Relaxed)
    }

    pub fn duplicates_dropped(&self) -> u64 {
        self.duplicates_dropped.load(Ordering::Relaxed)
    }

    pub fn verifications_passed(&self) -> u64 {
        self.verifications_passed.load(Ordering::Relaxed)
    }

    pub fn verifications_failed(&self) -> u64 {
        self.verifications_failed.load(Ordering::Relaxed)
    }

    pub fn runs_succeeded(&self) -> u64 {
        self.runs_succeeded.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> u64 {
        self.runs_failed.load(Ordering::Relaxed)
    }

    pub fn phases_aborted(&self) -> u64 {
        self.phases_aborted.load(Ordering::Relaxed)
    }
}
