//! # Token Validation Test Utilities
//!
//! Shared test utilities for the `token-validation` crate.
//!
//! This crate provides:
//! - Mock validation authority (`MockAuthority`, backed by wiremock)
//! - Self-signed HTTPS authority (`TlsAuthority`) for certificate hook tests
//! - Cache test doubles (`RecordingCache`, `FailingCache`)
//! - Config helpers (`test_config`, `unreachable_authority`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use token_validation_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let authority = MockAuthority::start().await;
//!     authority
//!         .accept_token("good-token", serde_json::json!({"sub": "u1"}))
//!         .await;
//!
//!     let validator = RemoteTokenValidator::builder(authority.config())
//!         .build()
//!         .unwrap();
//!     assert!(validator.validate("good-token").await.is_authenticated());
//! }
//! ```

pub mod authority;
pub mod caches;
pub mod tls;

// Re-export commonly used items
pub use authority::*;
pub use caches::*;
pub use tls::*;
