//! Observability for token validation.
//!
//! # Privacy by Default
//!
//! Bearer tokens are never logged. Log lines that need to correlate requests
//! for the same token carry [`hash_for_correlation`] instead.

pub mod metrics;

use ring::digest::{digest, SHA256};

/// Hash a value for correlation in logs (SHA-256, first 8 hex chars).
///
/// This is a one-way correlation id, not a cache key: the truncation limits
/// reversibility and makes collisions possible.
#[must_use]
pub fn hash_for_correlation(value: &str) -> String {
    let hash = digest(&SHA256, value.as_bytes());
    hex::encode(hash.as_ref().get(..4).unwrap_or_default())
}
