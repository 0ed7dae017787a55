//! Error types for token validation.
//!
//! - [`ValidatorError`]: building a validator failed (configuration, TLS, HTTP client)
//! - [`CacheError`]: a validation result cache backend failed
//! - [`AuthError`]: hosting-pipeline rejections, mapped to HTTP responses
//!
//! Client-facing messages in [`AuthError`] responses are intentionally generic.
//! Actual causes are logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while constructing a validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidatorError {
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// TLS configuration for the certificate validation hook failed.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// Errors raised by a validation result cache backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The backing store failed.
    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Authentication errors surfaced to the hosting HTTP pipeline.
///
/// Maps to HTTP status codes:
/// - MissingToken, InvalidToken: 401 Unauthorized
/// - AuthorityUnavailable: 503 Service Unavailable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer token on the request.
    #[error("Missing bearer token: {0}")]
    MissingToken(String),

    /// The authority rejected the token.
    #[error("Invalid token")]
    InvalidToken,

    /// The authority could not be reached or answered garbage.
    #[error("Validation authority unavailable: {0}")]
    AuthorityUnavailable(String),
}

impl AuthError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken(_) | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::AuthorityUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match &self {
            AuthError::MissingToken(reason) => {
                tracing::debug!(target: "token_validation.middleware", reason = %reason, "Request without bearer token");
                ("INVALID_TOKEN", "The access token is invalid or expired")
            }
            AuthError::InvalidToken => ("INVALID_TOKEN", "The access token is invalid or expired"),
            AuthError::AuthorityUnavailable(reason) => {
                // Log actual reason server-side
                tracing::warn!(target: "token_validation.middleware", reason = %reason, "Validation authority unavailable");
                (
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable",
                )
            }
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer error=\"invalid_token\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::MissingToken("none".to_string()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::InvalidToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::AuthorityUnavailable("down".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_unauthorized_response_has_www_authenticate() {
        let response = AuthError::InvalidToken.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("WWW-Authenticate").unwrap(),
            "Bearer error=\"invalid_token\""
        );
    }

    #[test]
    fn test_unavailable_response_has_no_challenge() {
        let response =
            AuthError::AuthorityUnavailable("connection refused".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get("WWW-Authenticate").is_none());
    }

    #[test]
    fn test_error_display() {
        let err = ValidatorError::Configuration("bad authority".to_string());
        assert!(err.to_string().contains("bad authority"));

        let err = ValidatorError::Tls("no roots".to_string());
        assert!(err.to_string().contains("no roots"));

        let err = CacheError::Backend("redis down".to_string());
        assert!(err.to_string().contains("redis down"));
    }
}
