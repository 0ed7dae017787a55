//! Remote token validator.
//!
//! Validity of an opaque bearer token is delegated to the authority's
//! validation endpoint:
//!
//! ```text
//! GET {authority}/connect/accesstokenvalidation?token={token}
//! ```
//!
//! 1. If caching is enabled and the cache holds claims for the token, they are
//!    returned without a network call
//! 2. Otherwise the endpoint is called once (no retries)
//! 3. A non-200 status is `Rejected`; a 200 body is flattened into claims
//! 4. Only successful validations are cached
//!
//! Transport failures (connection, timeout, cancellation, malformed body) are
//! reported separately from rejections so hosts can fail open or closed.
//!
//! # Example
//!
//! ```rust,ignore
//! use token_validation::{RemoteTokenValidator, ValidationOutcome, ValidatorConfig};
//!
//! let config = ValidatorConfig::new_secure("https://idp.example.com/core")?
//!     .with_validation_result_cache(true);
//! let validator = RemoteTokenValidator::builder(config).build()?;
//!
//! match validator.validate(token).await {
//!     ValidationOutcome::Authenticated(claims) => { /* ... */ }
//!     ValidationOutcome::Rejected => { /* 401 */ }
//!     ValidationOutcome::TransportError(cause) => { /* 503 */ }
//! }
//! ```

use crate::cache::{InMemoryValidationResultCache, ValidationResultCache};
use crate::certificate::{tls_config_with_validator, CertificateValidator};
use crate::claims::{map_to_claims, ClaimSet, MalformedPayload};
use crate::config::ValidatorConfig;
use crate::errors::ValidatorError;
use crate::identity::AuthenticatedIdentity;
use crate::observability::{hash_for_correlation, metrics};
use reqwest::StatusCode;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

/// Maximum accepted token size in bytes (8KB).
///
/// Larger tokens are rejected before any cache lookup or network call.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// Maximum accepted validation response body in bytes (256KB).
///
/// Larger bodies are a transport failure and are not parsed.
pub const MAX_RESPONSE_SIZE_BYTES: usize = 256 * 1024;

// =============================================================================
// Outcome Types
// =============================================================================

/// Why the authority could not give an answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// Connection to the authority failed (refused, DNS, TLS).
    #[error("Connection to validation authority failed: {0}")]
    Connect(String),

    /// The validation call timed out.
    #[error("Validation request timed out")]
    Timeout,

    /// The caller cancelled the validation.
    #[error("Validation cancelled")]
    Cancelled,

    /// Any other HTTP client failure (e.g. reading the body).
    #[error("Validation request failed: {0}")]
    Request(String),

    /// The response body exceeded [`MAX_RESPONSE_SIZE_BYTES`].
    #[error("Validation response exceeds {max_size} bytes")]
    ResponseTooLarge {
        /// Configured limit.
        max_size: usize,
    },

    /// The authority answered 200 with a body that is not a claim object.
    #[error(transparent)]
    MalformedPayload(#[from] MalformedPayload),
}

impl From<reqwest::Error> for TransportFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportFailure::Timeout
        } else if e.is_connect() {
            TransportFailure::Connect(e.to_string())
        } else {
            TransportFailure::Request(e.to_string())
        }
    }
}

/// Result of validating a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The authority accepted the token (or the cache held its claims).
    Authenticated(ClaimSet),

    /// The authority answered with a non-success status.
    Rejected,

    /// The authority could not be consulted.
    TransportError(TransportFailure),
}

impl ValidationOutcome {
    /// Whether the token was authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, ValidationOutcome::Authenticated(_))
    }

    /// Claims of an authenticated token.
    #[must_use]
    pub fn claims(&self) -> Option<&ClaimSet> {
        match self {
            ValidationOutcome::Authenticated(claims) => Some(claims),
            _ => None,
        }
    }

    /// Bounded metrics label for this outcome.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ValidationOutcome::Authenticated(_) => "authenticated",
            ValidationOutcome::Rejected => "rejected",
            ValidationOutcome::TransportError(_) => "transport_error",
        }
    }
}

/// What the authority said about a token.
enum AuthorityVerdict {
    Valid(ClaimSet),
    Invalid(StatusCode),
}

/// Read a response body, failing once it exceeds [`MAX_RESPONSE_SIZE_BYTES`].
async fn read_bounded_body(mut response: reqwest::Response) -> Result<Vec<u8>, TransportFailure> {
    let too_large = TransportFailure::ResponseTooLarge {
        max_size: MAX_RESPONSE_SIZE_BYTES,
    };

    let declared = response.content_length().unwrap_or(0);
    if usize::try_from(declared).map_or(true, |len| len > MAX_RESPONSE_SIZE_BYTES) {
        return Err(too_large);
    }

    let mut body = Vec::with_capacity(usize::try_from(declared).unwrap_or(0));
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > MAX_RESPONSE_SIZE_BYTES {
            return Err(too_large);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`RemoteTokenValidator`].
pub struct RemoteTokenValidatorBuilder {
    config: ValidatorConfig,
    cache: Option<Arc<dyn ValidationResultCache>>,
    certificate_validator: Option<Arc<dyn CertificateValidator>>,
    http_client: Option<reqwest::Client>,
}

impl RemoteTokenValidatorBuilder {
    /// Use a custom cache backend.
    ///
    /// Ignored unless `enable_validation_result_cache` is set.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ValidationResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Install a certificate validation hook into the HTTP client.
    #[must_use]
    pub fn with_certificate_validator(mut self, validator: Arc<dyn CertificateValidator>) -> Self {
        self.certificate_validator = Some(validator);
        self
    }

    /// Use a caller-supplied HTTP client instead of building one.
    ///
    /// The client's own timeouts and TLS settings apply.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Build the validator.
    ///
    /// # Errors
    ///
    /// - `ValidatorError::Configuration` - certificate validator combined with
    ///   a caller-supplied HTTP client
    /// - `ValidatorError::Tls` - TLS configuration for the hook failed
    /// - `ValidatorError::HttpClient` - the HTTP client cannot be built
    pub fn build(self) -> Result<RemoteTokenValidator, ValidatorError> {
        let http_client = match (self.http_client, self.certificate_validator) {
            (Some(_), Some(_)) => {
                return Err(ValidatorError::Configuration(
                    "a certificate validator cannot be installed into a caller-supplied HTTP client"
                        .to_string(),
                ));
            }
            (Some(client), None) => client,
            (None, validator) => build_http_client(&self.config, validator)?,
        };

        let cache = if self.config.enable_validation_result_cache {
            Some(self.cache.unwrap_or_else(|| {
                Arc::new(InMemoryValidationResultCache::new(
                    self.config.cache_duration,
                )) as Arc<dyn ValidationResultCache>
            }))
        } else {
            None
        };

        Ok(RemoteTokenValidator {
            endpoint: self.config.validation_endpoint(),
            config: self.config,
            http_client,
            cache,
        })
    }
}

fn build_http_client(
    config: &ValidatorConfig,
    certificate_validator: Option<Arc<dyn CertificateValidator>>,
) -> Result<reqwest::Client, ValidatorError> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .connect_timeout(config.connect_timeout);

    if let Some(validator) = certificate_validator {
        builder = builder.use_preconfigured_tls(tls_config_with_validator(validator)?);
    }

    builder
        .build()
        .map_err(|e| ValidatorError::HttpClient(format!("Failed to build HTTP client: {e}")))
}

// =============================================================================
// Validator
// =============================================================================

/// Validates bearer tokens against a remote authority.
///
/// Cheap to share behind an `Arc`: the HTTP client (connection pool, TLS
/// hook) is read-only after construction and the cache handles its own
/// concurrency.
pub struct RemoteTokenValidator {
    config: ValidatorConfig,
    endpoint: String,
    http_client: reqwest::Client,
    cache: Option<Arc<dyn ValidationResultCache>>,
}

impl fmt::Debug for RemoteTokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTokenValidator")
            .field("endpoint", &self.endpoint)
            .field("cache_enabled", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl RemoteTokenValidator {
    /// Start building a validator.
    #[must_use]
    pub fn builder(config: ValidatorConfig) -> RemoteTokenValidatorBuilder {
        RemoteTokenValidatorBuilder {
            config,
            cache: None,
            certificate_validator: None,
            http_client: None,
        }
    }

    /// Validator configuration.
    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validation endpoint URL, without the token query.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether results are cached.
    #[must_use]
    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Wrap claims into an identity using the configured claim types.
    #[must_use]
    pub fn identity(&self, claims: ClaimSet) -> AuthenticatedIdentity {
        AuthenticatedIdentity::new(claims, self.config.identity.clone())
    }

    /// Validate a token.
    ///
    /// Bounded by the HTTP client's timeouts.
    #[instrument(skip_all, fields(token_hash = %hash_for_correlation(token)))]
    pub async fn validate(&self, token: &str) -> ValidationOutcome {
        self.run(token, None).await
    }

    /// Validate a token, aborting when `cancel` fires.
    ///
    /// A cancelled validation returns `TransportError(Cancelled)` and never
    /// writes to the cache.
    #[instrument(skip_all, fields(token_hash = %hash_for_correlation(token)))]
    pub async fn validate_with_cancellation(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> ValidationOutcome {
        self.run(token, Some(cancel)).await
    }

    async fn run(&self, token: &str, cancel: Option<&CancellationToken>) -> ValidationOutcome {
        let start = Instant::now();
        let outcome = self.resolve(token, cancel).await;
        metrics::record_validation(outcome.label(), start.elapsed());
        outcome
    }

    async fn resolve(&self, token: &str, cancel: Option<&CancellationToken>) -> ValidationOutcome {
        if token.is_empty() || token.len() > MAX_TOKEN_SIZE_BYTES {
            debug!(
                target: "token_validation.validator",
                token_size = token.len(),
                max_size = MAX_TOKEN_SIZE_BYTES,
                "Token empty or too large, rejecting without validation call"
            );
            return ValidationOutcome::Rejected;
        }

        if let Some(claims) = self.cached_claims(token).await {
            return ValidationOutcome::Authenticated(claims);
        }

        let verdict = match cancel {
            Some(cancel) => tokio::select! {
                biased;
                () = cancel.cancelled() => Err(TransportFailure::Cancelled),
                verdict = self.call_authority(token) => verdict,
            },
            None => self.call_authority(token).await,
        };

        match verdict {
            Ok(AuthorityVerdict::Valid(claims)) => {
                if cancel.is_some_and(CancellationToken::is_cancelled) {
                    debug!(target: "token_validation.validator", "Validation cancelled before caching");
                    return ValidationOutcome::TransportError(TransportFailure::Cancelled);
                }
                self.store_claims(token, &claims).await;
                debug!(
                    target: "token_validation.validator",
                    claim_count = claims.len(),
                    "Token validated by authority"
                );
                ValidationOutcome::Authenticated(claims)
            }
            Ok(AuthorityVerdict::Invalid(status)) => {
                debug!(
                    target: "token_validation.validator",
                    status = %status,
                    "Token rejected by authority"
                );
                ValidationOutcome::Rejected
            }
            Err(failure) => {
                warn!(
                    target: "token_validation.validator",
                    error = %failure,
                    "Token validation failed"
                );
                ValidationOutcome::TransportError(failure)
            }
        }
    }

    /// Call the validation endpoint once.
    async fn call_authority(&self, token: &str) -> Result<AuthorityVerdict, TransportFailure> {
        trace!(
            target: "token_validation.validator",
            url = %self.endpoint,
            "Calling validation endpoint"
        );

        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[("token", token)])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Ok(AuthorityVerdict::Invalid(status));
        }

        let body = read_bounded_body(response).await?;
        let claims = map_to_claims(&body)?;
        Ok(AuthorityVerdict::Valid(claims))
    }

    /// Cache lookup. Cache failures are logged and treated as a miss.
    async fn cached_claims(&self, token: &str) -> Option<ClaimSet> {
        let cache = self.cache.as_ref()?;

        match cache.get(token).await {
            Ok(Some(claims)) => {
                metrics::record_cache_lookup("hit");
                debug!(target: "token_validation.validator", "Validation result cache hit");
                Some(claims)
            }
            Ok(None) => {
                metrics::record_cache_lookup("miss");
                None
            }
            Err(e) => {
                metrics::record_cache_lookup("error");
                metrics::record_cache_error("get");
                warn!(
                    target: "token_validation.validator",
                    error = %e,
                    "Validation result cache lookup failed, bypassing cache"
                );
                None
            }
        }
    }

    /// Cache population. Cache failures are logged and ignored.
    async fn store_claims(&self, token: &str, claims: &ClaimSet) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };

        if let Err(e) = cache.add(token, claims).await {
            metrics::record_cache_error("add");
            warn!(
                target: "token_validation.validator",
                error = %e,
                "Failed to cache validation result"
            );
        }
    }
}
