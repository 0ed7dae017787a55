//! Validation result cache.
//!
//! The remote validator consults a [`ValidationResultCache`] before calling the
//! authority and populates it after a successful validation. Expiry and
//! eviction belong to the cache implementation.
//!
//! [`InMemoryValidationResultCache`] is the default backend:
//!
//! - Entries are keyed by the SHA-256 digest of the token, so raw bearer
//!   tokens are not retained by the cache
//! - An entry expires after the configured duration, or at the token's `exp`
//!   claim if that comes first
//! - Capacity is bounded; expired entries are purged first, then the entry
//!   closest to expiry is evicted

use crate::claims::ClaimSet;
use crate::errors::CacheError;
use async_trait::async_trait;
use ring::digest::{digest, SHA256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Default cache duration (5 minutes).
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(300);

/// Default maximum number of cached tokens.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Capability consumed by the remote validator.
///
/// Both operations may suspend (e.g. a remote store). `get` on an unknown or
/// expired token returns `Ok(None)`. `add` overwrites any existing entry.
#[async_trait]
pub trait ValidationResultCache: Send + Sync {
    /// Look up the claims cached for a token.
    async fn get(&self, token: &str) -> Result<Option<ClaimSet>, CacheError>;

    /// Cache the claims for a token.
    async fn add(&self, token: &str, claims: &ClaimSet) -> Result<(), CacheError>;
}

/// Cached claims with expiry time.
struct CachedClaims {
    claims: ClaimSet,
    expires_at: Instant,
}

/// In-process cache backed by a `HashMap` behind a `RwLock`.
pub struct InMemoryValidationResultCache {
    entries: RwLock<HashMap<String, CachedClaims>>,
    duration: Duration,
    max_entries: usize,
}

impl InMemoryValidationResultCache {
    /// Create a cache with the given entry duration.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self::with_capacity(duration, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with the given entry duration and capacity.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn with_capacity(duration: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            duration,
            max_entries: max_entries.max(1),
        }
    }

    /// Entry duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Number of entries, including expired entries not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remove all expired entries. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        purge(&mut entries, Instant::now())
    }

    /// Remaining lifetime for a new entry, or `None` if the token is
    /// already past its `exp` claim.
    fn entry_lifetime(&self, claims: &ClaimSet) -> Option<Duration> {
        match claims.expires_at() {
            Some(exp) => {
                // Out-of-range exp values are treated as already expired
                let remaining = exp
                    .checked_sub(chrono::Utc::now().timestamp())
                    .and_then(|secs| u64::try_from(secs).ok())
                    .filter(|secs| *secs > 0)?;
                Some(self.duration.min(Duration::from_secs(remaining)))
            }
            None => Some(self.duration),
        }
    }
}

impl Default for InMemoryValidationResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DURATION)
    }
}

fn cache_key(token: &str) -> String {
    hex::encode(digest(&SHA256, token.as_bytes()))
}

fn purge(entries: &mut HashMap<String, CachedClaims>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| entry.expires_at > now);
    before - entries.len()
}

#[async_trait]
impl ValidationResultCache for InMemoryValidationResultCache {
    #[instrument(skip_all)]
    async fn get(&self, token: &str) -> Result<Option<ClaimSet>, CacheError> {
        let key = cache_key(token);
        let now = Instant::now();

        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.claims.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired - remove unless a concurrent add refreshed it
        let mut entries = self.entries.write().await;
        if entries
            .get(&key)
            .is_some_and(|entry| entry.expires_at <= now)
        {
            entries.remove(&key);
            debug!(target: "token_validation.cache", "Removed expired cache entry");
        }
        Ok(None)
    }

    #[instrument(skip_all)]
    async fn add(&self, token: &str, claims: &ClaimSet) -> Result<(), CacheError> {
        let Some(lifetime) = self.entry_lifetime(claims) else {
            debug!(target: "token_validation.cache", "Token already expired, not caching");
            return Ok(());
        };

        let key = cache_key(token);
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let purged = purge(&mut entries, now);
            if entries.len() >= self.max_entries {
                let soonest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(evicted) = soonest {
                    entries.remove(&evicted);
                }
            }
            debug!(
                target: "token_validation.cache",
                purged,
                max_entries = self.max_entries,
                "Cache at capacity, evicted entries"
            );
        }

        entries.insert(
            key,
            CachedClaims {
                claims: claims.clone(),
                expires_at: now + lifetime,
            },
        );

        Ok(())
    }
}
