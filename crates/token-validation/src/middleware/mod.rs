//! HTTP middleware for hosts built on axum.
//!
//! - `auth` - Bearer token middleware backed by the remote validator

pub mod auth;

pub use auth::{extract_bearer_token, require_bearer, AuthState, IdentityExt};
