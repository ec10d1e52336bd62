//! Metrics and performance monitoring
//!
//! Thin wrappers around the `metrics` facade so metric names live in one
//! place. Without an installed recorder every call is a no-op.

use std::time::Instant;

pub const FETCH_ATTEMPTS: &str = "collection_fetch_attempts_total";
pub const FETCH_FAILURES: &str = "collection_fetch_failures_total";
pub const STALE_RESPONSES: &str = "collection_stale_responses_total";
pub const DUPLICATES_DROPPED: &str = "collection_duplicates_dropped_total";
pub const RARITY_RECOMPUTES: &str = "rarity_recomputes_total";
pub const RARITY_CACHE_HITS: &str = "rarity_cache_hits_total";
pub const OPERATION_DURATION_MS: &str = "operation_duration_ms";

pub fn record_fetch_attempt(operation: &str) {
    metrics::counter!(FETCH_ATTEMPTS, "operation" => operation.to_string()).increment(1);
}

pub fn record_fetch_failure(operation: &str, retryable: bool) {
    metrics::counter!(
        FETCH_FAILURES,
        "operation" => operation.to_string(),
        "retryable" => retryable.to_string()
    )
    .increment(1);
}

pub fn record_stale_response() {
    metrics::counter!(STALE_RESPONSES).increment(1);
}

pub fn record_duplicates_dropped(count: usize) {
    if count > 0 {
        metrics::counter!(DUPLICATES_DROPPED).increment(count as u64);
    }
}

pub fn record_rarity_cache(hit: bool) {
    if hit {
        metrics::counter!(RARITY_CACHE_HITS).increment(1);
    } else {
        metrics::counter!(RARITY_RECOMPUTES).increment(1);
    }
}

/// Performance timer for tracking operation duration
pub struct PerformanceTimer {
    start: Instant,
    label: &'static str,
}

impl PerformanceTimer {
    pub fn new(label: &'static str) -> Self {
        Self {
            start: Instant::now(),
            label,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn log_if_slow(&self, threshold_ms: u64) {
        let elapsed = self.elapsed_ms();
        if elapsed > threshold_ms {
            tracing::warn!(
                "⚠️ Slow operation: {} took {}ms (threshold: {}ms)",
                self.label,
                elapsed,
                threshold_ms
            );
        }
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        metrics::histogram!(OPERATION_DURATION_MS, "label" => self.label)
            .record(elapsed.as_secs_f64() * 1000.0);
        tracing::debug!("⏱️ {} completed in {}ms", self.label, elapsed.as_millis());
    }
}
