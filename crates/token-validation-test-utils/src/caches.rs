//! Cache test doubles.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use token_validation::{
    CacheError, ClaimSet, InMemoryValidationResultCache, ValidationResultCache,
};

/// In-memory cache that counts `get` and `add` calls.
#[derive(Default)]
pub struct RecordingCache {
    inner: InMemoryValidationResultCache,
    gets: AtomicUsize,
    adds: AtomicUsize,
}

impl RecordingCache {
    /// Create an empty recording cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store claims for a token without counting it as an `add`.
    pub async fn preload(&self, token: &str, claims: &ClaimSet) {
        self.inner
            .add(token, claims)
            .await
            .expect("in-memory cache add should not fail");
    }

    /// Claims currently cached for a token, without counting it as a `get`.
    pub async fn peek(&self, token: &str) -> Option<ClaimSet> {
        self.inner
            .get(token)
            .await
            .expect("in-memory cache get should not fail")
    }

    /// Number of `get` calls.
    #[must_use]
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `add` calls.
    #[must_use]
    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ValidationResultCache for RecordingCache {
    async fn get(&self, token: &str) -> Result<Option<ClaimSet>, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(token).await
    }

    async fn add(&self, token: &str, claims: &ClaimSet) -> Result<(), CacheError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.inner.add(token, claims).await
    }
}

/// Cache whose backend always fails.
#[derive(Default)]
pub struct FailingCache {
    attempts: AtomicUsize,
}

impl FailingCache {
    /// Create a failing cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` and `add` attempts.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ValidationResultCache for FailingCache {
    async fn get(&self, _token: &str) -> Result<Option<ClaimSet>, CacheError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Backend("cache unavailable".to_string()))
    }

    async fn add(&self, _token: &str, _claims: &ClaimSet) -> Result<(), CacheError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Backend("cache unavailable".to_string()))
    }
}
