//! Metrics definitions for token validation.
//!
//! All metrics follow Prometheus naming conventions:
//! - `token_validation_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `outcome`: 3 values (authenticated, rejected, transport_error)
//! - `result`: 3 values (hit, miss, error)
//! - `operation`: 2 values (get, add)

use metrics::{counter, histogram};
use std::time::Duration;

/// Record a completed validation.
///
/// Metric: `token_validation_requests_total`, `token_validation_duration_seconds`
/// Labels: `outcome`
pub fn record_validation(outcome: &'static str, duration: Duration) {
    histogram!("token_validation_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());

    counter!("token_validation_requests_total", "outcome" => outcome).increment(1);
}

/// Record a cache lookup.
///
/// Metric: `token_validation_cache_lookups_total`
/// Labels: `result` (hit, miss, error)
pub fn record_cache_lookup(result: &'static str) {
    counter!("token_validation_cache_lookups_total", "result" => result).increment(1);
}

/// Record a cache backend failure.
///
/// Metric: `token_validation_cache_errors_total`
/// Labels: `operation` (get, add)
pub fn record_cache_error(operation: &'static str) {
    counter!("token_validation_cache_errors_total", "operation" => operation).increment(1);
}
