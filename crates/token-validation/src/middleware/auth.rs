//! Bearer authentication middleware.
//!
//! Extracts the bearer token from the `Authorization` header, validates it
//! with the [`RemoteTokenValidator`] and injects an [`AuthenticatedIdentity`]
//! into request extensions.
//!
//! | Outcome | Response |
//! |---------|----------|
//! | Missing or non-bearer header | 401 |
//! | `Rejected` | 401 |
//! | `TransportError` | 503 |
//! | `Authenticated` | next handler |

use crate::errors::AuthError;
use crate::identity::AuthenticatedIdentity;
use crate::validator::{RemoteTokenValidator, ValidationOutcome};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the bearer middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Validator shared by all requests.
    pub validator: Arc<RemoteTokenValidator>,
}

impl AuthState {
    /// Create middleware state around a validator.
    #[must_use]
    pub fn new(validator: Arc<RemoteTokenValidator>) -> Self {
        Self { validator }
    }
}

/// Extract the bearer token from the `Authorization` header.
///
/// The scheme is matched case-insensitively. An empty token is treated as
/// missing.
///
/// # Errors
///
/// `AuthError::MissingToken` if the header is absent, not valid ASCII, uses
/// another scheme, or carries no token.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AuthError::MissingToken("Missing Authorization header".to_string()))?;

    let (scheme, token) = auth_header
        .split_once(' ')
        .ok_or_else(|| AuthError::MissingToken("Invalid Authorization header format".to_string()))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingToken(
            "Unsupported authorization scheme".to_string(),
        ));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken("Empty bearer token".to_string()));
    }

    Ok(token)
}

/// Bearer authentication middleware.
///
/// Use with `axum::middleware::from_fn_with_state`. On success the request
/// reaches the next handler with an [`AuthenticatedIdentity`] in its
/// extensions.
#[instrument(skip_all, name = "token_validation.middleware.auth")]
pub async fn require_bearer(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, AuthError> {
    let token = extract_bearer_token(req.headers())?;

    let identity = match state.validator.validate(token).await {
        ValidationOutcome::Authenticated(claims) => state.validator.identity(claims),
        ValidationOutcome::Rejected => return Err(AuthError::InvalidToken),
        ValidationOutcome::TransportError(cause) => {
            return Err(AuthError::AuthorityUnavailable(cause.to_string()))
        }
    };

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Extension trait for reading the authenticated identity from a request.
pub trait IdentityExt {
    /// Get the identity injected by [`require_bearer`].
    ///
    /// Returns `None` if the middleware was not applied to this request.
    fn identity(&self) -> Option<&AuthenticatedIdentity>;
}

impl<B> IdentityExt for axum::http::Request<B> {
    fn identity(&self) -> Option<&AuthenticatedIdentity> {
        self.extensions().get::<AuthenticatedIdentity>()
    }
}
