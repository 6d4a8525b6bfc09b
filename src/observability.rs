use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Counters for the notification pipeline and the case number fallback path
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    pub jobs_processed: AtomicU64,
    pub jobs_dropped: AtomicU64,
    pub push_attempts: AtomicU64,
    pub push_failures: AtomicU64,
    pub live_emissions: AtomicU64,
    pub live_failures: AtomicU64,
    pub inbox_records: AtomicU64,
    pub inbox_failures: AtomicU64,
    pub counter_fallbacks: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_job_processed(&self) {
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_dropped(&self) {
        self.jobs_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_push_attempt(&self) {
        self.push_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_push_failure(&self) {
        self.push_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_live_emission(&self) {
        self.live_emissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_live_failure(&self) {
        self.live_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inbox_record(&self) {
        self.inbox_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inbox_failure(&self) {
        self.inbox_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_counter_fallback(&self) {
        self.counter_fallbacks.fetch_add(1, Ordering::Relaxed);
        warn!("Case number issued from fallback scan");
    }

    pub fn get_stats(&self) -> DispatchStats {
        DispatchStats {
            jobs_processed: self.jobs_processed.load(Ordering::Relaxed),
            jobs_dropped: self.jobs_dropped.load(Ordering::Relaxed),
            push_attempts: self.push_attempts.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
            live_emissions: self.live_emissions.load(Ordering::Relaxed),
            live_failures: self.live_failures.load(Ordering::Relaxed),
            inbox_records: self.inbox_records.load(Ordering::Relaxed),
            inbox_failures: self.inbox_failures.load(Ordering::Relaxed),
            counter_fallbacks: self.counter_fallbacks.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Dispatch metrics: jobs={} ({} dropped), push={}/{} failed, live={} ({} failed), inbox={} ({} failed), counter_fallbacks={}",
            stats.jobs_processed,
            stats.jobs_dropped,
            stats.push_attempts,
            stats.push_failures,
            stats.live_emissions,
            stats.live_failures,
            stats.inbox_records,
            stats.inbox_failures,
            stats.counter_fallbacks
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    pub jobs_processed: u64,
    pub jobs_dropped: u64,
    pub push_attempts: u64,
    pub push_failures: u64,
    pub live_emissions: u64,
    pub live_failures: u64,
    pub inbox_records: u64,
    pub inbox_failures: u64,
    pub counter_fallbacks: u64,
}

/// Global metrics instance
static DISPATCH_METRICS: std::sync::LazyLock<DispatchMetrics> =
    std::sync::LazyLock::new(DispatchMetrics::new);

pub fn dispatch_metrics() -> &'static DispatchMetrics {
    &DISPATCH_METRICS
}
