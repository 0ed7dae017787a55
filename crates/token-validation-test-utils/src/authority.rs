//! Mock validation authority.
//!
//! Wraps a wiremock server answering
//! `GET /connect/accesstokenvalidation?token=...`. Tokens registered with
//! [`MockAuthority::accept_token`] or [`MockAuthority::reject_token`] take
//! precedence over the catch-all installed by [`MockAuthority::reject_all`].

use std::time::Duration;
use token_validation::config::VALIDATION_ENDPOINT_PATH;
use token_validation::ValidatorConfig;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Catch-all priority; lower than wiremock's default so per-token mocks win.
const FALLBACK_PRIORITY: u8 = 10;

/// Mock authority for validator and middleware tests.
pub struct MockAuthority {
    server: MockServer,
}

impl MockAuthority {
    /// Start a mock authority on a random local port.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL of the authority.
    #[must_use]
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Validator config pointing at this authority, caching disabled.
    #[must_use]
    pub fn config(&self) -> ValidatorConfig {
        test_config(&self.uri())
    }

    /// Full path of the validation endpoint.
    #[must_use]
    pub fn validation_path() -> String {
        format!("/{VALIDATION_ENDPOINT_PATH}")
    }

    /// Answer 200 with `body` for `token`.
    pub async fn accept_token(&self, token: &str, body: serde_json::Value) {
        self.respond_to_token(token, ResponseTemplate::new(200).set_body_json(body))
            .await;
    }

    /// Answer 200 with `body` for `token` after `delay`.
    pub async fn accept_token_after(&self, token: &str, body: serde_json::Value, delay: Duration) {
        self.respond_to_token(
            token,
            ResponseTemplate::new(200).set_body_json(body).set_delay(delay),
        )
        .await;
    }

    /// Answer `status` for `token`.
    pub async fn reject_token(&self, token: &str, status: u16) {
        self.respond_to_token(token, ResponseTemplate::new(status))
            .await;
    }

    /// Answer 200 with a raw (possibly non-JSON) body for `token`.
    pub async fn respond_raw(&self, token: &str, body: &str) {
        self.respond_to_token(token, ResponseTemplate::new(200).set_body_string(body))
            .await;
    }

    /// Answer `status` for any token not registered otherwise.
    pub async fn reject_all(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(Self::validation_path()))
            .respond_with(ResponseTemplate::new(status))
            .with_priority(FALLBACK_PRIORITY)
            .mount(&self.server)
            .await;
    }

    /// Install a response for `token`.
    pub async fn respond_to_token(&self, token: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(Self::validation_path()))
            .and(query_param("token", token))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Number of validation calls received so far.
    pub async fn validation_requests(&self) -> usize {
        let validation_path = Self::validation_path();
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|req| req.url.path() == validation_path)
            .count()
    }

    /// Tokens received so far, decoded from the query, in arrival order.
    pub async fn received_tokens(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|req| {
                req.url
                    .query_pairs()
                    .find(|(key, _)| key == "token")
                    .map(|(_, value)| value.into_owned())
            })
            .collect()
    }
}

/// Validator config for `authority`, caching disabled, short timeouts.
#[must_use]
pub fn test_config(authority: &str) -> ValidatorConfig {
    ValidatorConfig::new(authority)
        .expect("test authority URL should be valid")
        .with_http_timeout(Duration::from_secs(2))
        .with_connect_timeout(Duration::from_secs(1))
}

/// URL of a local port with nothing listening on it.
#[must_use]
pub fn unreachable_authority() -> String {
    let listener =
        std::net::TcpListener::bind("127.0.0.1:0").expect("should bind an ephemeral port");
    let port = listener
        .local_addr()
        .expect("listener should have a local address")
        .port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_path() {
        assert_eq!(
            MockAuthority::validation_path(),
            "/connect/accesstokenvalidation"
        );
    }

    #[test]
    fn test_unreachable_authority_is_valid_config() {
        let config = test_config(&unreachable_authority());
        assert!(config.authority.starts_with("http://127.0.0.1:"));
    }
}
