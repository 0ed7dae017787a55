//! Validator configuration.
//!
//! Configuration can be built in code (`ValidatorConfig::new` plus `with_*`
//! builders) or loaded from environment variables:
//!
//! | Variable | Default |
//! |---|---|
//! | `AUTHORITY_URL` | required |
//! | `VALIDATION_CACHE_ENABLED` | `false` |
//! | `VALIDATION_CACHE_DURATION_SECONDS` | `300` |
//! | `VALIDATION_HTTP_TIMEOUT_SECONDS` | `10` |
//! | `AUTHENTICATION_TYPE` | `Bearer` |
//! | `NAME_CLAIM_TYPE` | `name` |
//! | `ROLE_CLAIM_TYPE` | `role` |

use crate::cache::DEFAULT_CACHE_DURATION;
use reqwest::Url;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Fixed path of the validation endpoint, relative to the authority.
pub const VALIDATION_ENDPOINT_PATH: &str = "connect/accesstokenvalidation";

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for the HTTP client.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum accepted HTTP request timeout.
pub const MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Default authentication type for authenticated identities.
pub const DEFAULT_AUTHENTICATION_TYPE: &str = "Bearer";

/// Default claim type carrying the identity name.
pub const DEFAULT_NAME_CLAIM_TYPE: &str = "name";

/// Default claim type carrying roles.
pub const DEFAULT_ROLE_CLAIM_TYPE: &str = "role";

/// Errors raised while building a [`ValidatorConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// The authority is not an absolute http(s) URL without query or fragment.
    #[error("Invalid authority: {0}")]
    InvalidAuthority(String),

    /// A cache setting is malformed or out of range.
    #[error("Invalid cache configuration: {0}")]
    InvalidCache(String),

    /// The HTTP timeout is malformed or outside 1-120 seconds.
    #[error("Invalid HTTP timeout configuration: {0}")]
    InvalidHttpTimeout(String),
}

/// Claim types used to build an authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityOptions {
    /// Authentication type reported by the identity (e.g. "Bearer").
    pub authentication_type: String,

    /// Claim type holding the identity name.
    pub name_claim_type: String,

    /// Claim type holding roles.
    pub role_claim_type: String,
}

impl Default for IdentityOptions {
    fn default() -> Self {
        Self {
            authentication_type: DEFAULT_AUTHENTICATION_TYPE.to_string(),
            name_claim_type: DEFAULT_NAME_CLAIM_TYPE.to_string(),
            role_claim_type: DEFAULT_ROLE_CLAIM_TYPE.to_string(),
        }
    }
}

/// Configuration for [`RemoteTokenValidator`](crate::validator::RemoteTokenValidator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Base URL of the validation authority (e.g. `https://idp.example.com/core`).
    pub authority: String,

    /// Consult and populate the validation result cache.
    pub enable_validation_result_cache: bool,

    /// Lifetime of entries in the default in-memory cache.
    pub cache_duration: Duration,

    /// HTTP request timeout for the validation call.
    pub http_timeout: Duration,

    /// HTTP connect timeout for the validation call.
    pub connect_timeout: Duration,

    /// Identity claim types.
    pub identity: IdentityOptions,
}

impl ValidatorConfig {
    /// Create a configuration with defaults and caching disabled.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidAuthority` if the authority is not an
    /// absolute http(s) URL without query or fragment.
    ///
    /// # Security Warning
    ///
    /// Tokens are sent in the query string. Use
    /// [`ValidatorConfig::new_secure`] to enforce HTTPS.
    pub fn new(authority: impl Into<String>) -> Result<Self, ConfigError> {
        let authority = authority.into();
        validate_authority(&authority)?;

        Ok(Self {
            authority,
            enable_validation_result_cache: false,
            cache_duration: DEFAULT_CACHE_DURATION,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            identity: IdentityOptions::default(),
        })
    }

    /// Create a configuration requiring HTTPS.
    ///
    /// This is the recommended constructor for production use.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidAuthority` if the URL doesn't use HTTPS.
    pub fn new_secure(authority: impl Into<String>) -> Result<Self, ConfigError> {
        let authority = authority.into();
        if !authority.starts_with("https://") {
            return Err(ConfigError::InvalidAuthority(
                "authority must use HTTPS in production".into(),
            ));
        }
        Self::new(authority)
    }

    /// Enable or disable the validation result cache.
    #[must_use]
    pub fn with_validation_result_cache(mut self, enabled: bool) -> Self {
        self.enable_validation_result_cache = enabled;
        self
    }

    /// Set the in-memory cache entry lifetime.
    #[must_use]
    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = duration;
        self
    }

    /// Set the HTTP request timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Set the HTTP connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the identity claim types.
    #[must_use]
    pub fn with_identity(mut self, identity: IdentityOptions) -> Self {
        self.identity = identity;
        self
    }

    /// Validation endpoint URL, without the token query.
    ///
    /// The authority is joined to the fixed path with exactly one `/`.
    #[must_use]
    pub fn validation_endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.authority.trim_end_matches('/'),
            VALIDATION_ENDPOINT_PATH
        )
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`ValidatorConfig::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    ///
    /// # Errors
    ///
    /// - `ConfigError::MissingEnvVar` - `AUTHORITY_URL` is not set
    /// - `ConfigError::InvalidAuthority` - `AUTHORITY_URL` is not a valid authority
    /// - `ConfigError::InvalidCache` - `VALIDATION_CACHE_ENABLED` is not a boolean,
    ///   or `VALIDATION_CACHE_DURATION_SECONDS` is not a positive integer
    /// - `ConfigError::InvalidHttpTimeout` - `VALIDATION_HTTP_TIMEOUT_SECONDS` is
    ///   not an integer between 1 and 120
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let authority = vars
            .get("AUTHORITY_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTHORITY_URL".to_string()))?
            .clone();

        let mut config = Self::new(authority)?;

        if let Some(value_str) = vars.get("VALIDATION_CACHE_ENABLED") {
            config.enable_validation_result_cache = parse_bool(value_str).ok_or_else(|| {
                ConfigError::InvalidCache(format!(
                    "VALIDATION_CACHE_ENABLED must be true or false, got '{value_str}'"
                ))
            })?;
        }

        if let Some(value_str) = vars.get("VALIDATION_CACHE_DURATION_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidCache(format!(
                    "VALIDATION_CACHE_DURATION_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidCache(
                    "VALIDATION_CACHE_DURATION_SECONDS must be greater than 0".to_string(),
                ));
            }

            config.cache_duration = Duration::from_secs(value);
        }

        if let Some(value_str) = vars.get("VALIDATION_HTTP_TIMEOUT_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidHttpTimeout(format!(
                    "VALIDATION_HTTP_TIMEOUT_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidHttpTimeout(
                    "VALIDATION_HTTP_TIMEOUT_SECONDS must be greater than 0".to_string(),
                ));
            }

            if value > MAX_HTTP_TIMEOUT.as_secs() {
                return Err(ConfigError::InvalidHttpTimeout(format!(
                    "VALIDATION_HTTP_TIMEOUT_SECONDS must not exceed {} seconds, got {value}",
                    MAX_HTTP_TIMEOUT.as_secs()
                )));
            }

            config.http_timeout = Duration::from_secs(value);
        }

        if let Some(value) = vars.get("AUTHENTICATION_TYPE") {
            config.identity.authentication_type.clone_from(value);
        }
        if let Some(value) = vars.get("NAME_CLAIM_TYPE") {
            config.identity.name_claim_type.clone_from(value);
        }
        if let Some(value) = vars.get("ROLE_CLAIM_TYPE") {
            config.identity.role_claim_type.clone_from(value);
        }

        Ok(config)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn validate_authority(authority: &str) -> Result<(), ConfigError> {
    let url = Url::parse(authority)
        .map_err(|e| ConfigError::InvalidAuthority(format!("'{authority}': {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidAuthority(format!(
            "scheme must be http or https, got '{}'",
            url.scheme()
        )));
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(ConfigError::InvalidAuthority(
            "authority must not carry a query or fragment".to_string(),
        ));
    }

    Ok(())
}
