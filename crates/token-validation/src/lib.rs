//! Bearer token validation delegated to a remote validation authority.
//!
//! A resource server hands an opaque bearer token to
//! [`RemoteTokenValidator::validate`], which asks the authority's validation
//! endpoint whether the token is valid and turns the answer into a
//! [`ClaimSet`]. Results can be cached, the authority's TLS certificate can be
//! checked by a custom hook, and axum hosts can use the bearer middleware.

#![warn(clippy::pedantic)]

/// Module for the validation result cache (trait and in-memory backend)
pub mod cache;

/// Module for the certificate validation hook
pub mod certificate;

/// Module for claim types and the claim mapper
pub mod claims;

/// Module for validator configuration
pub mod config;

/// Module for error types
pub mod errors;

/// Module for the authenticated identity
pub mod identity;

/// Module for axum bearer middleware
pub mod middleware;

/// Module for logging helpers and metrics
pub mod observability;

/// Module for the remote validator
pub mod validator;

pub use cache::{InMemoryValidationResultCache, ValidationResultCache};
pub use certificate::{CertificateValidator, PinnedCertificateValidator, PolicyErrors};
pub use claims::{map_to_claims, Claim, ClaimSet, MalformedPayload};
pub use config::{ConfigError, IdentityOptions, ValidatorConfig};
pub use errors::{AuthError, CacheError, ValidatorError};
pub use identity::AuthenticatedIdentity;
pub use validator::{
    RemoteTokenValidator, RemoteTokenValidatorBuilder, TransportFailure, ValidationOutcome,
};
