//! Integration tests for the bearer middleware.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    middleware::from_fn_with_state,
    routing::get,
    Extension, Router,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use token_validation::middleware::{require_bearer, AuthState};
use token_validation::{AuthenticatedIdentity, RemoteTokenValidator};
use token_validation_test_utils::{test_config, unreachable_authority, MockAuthority};
use tower::ServiceExt;

async fn whoami(Extension(identity): Extension<AuthenticatedIdentity>) -> String {
    let roles: Vec<&str> = identity.roles().collect();
    format!("{}:{}", identity.name().unwrap_or("anonymous"), roles.join(","))
}

fn app(validator: RemoteTokenValidator) -> Router {
    let state = Arc::new(AuthState::new(Arc::new(validator)));
    Router::new()
        .route("/whoami", get(whoami))
        .layer(from_fn_with_state(state, require_bearer))
}

fn request(authorization: Option<&str>) -> Request {
    let mut builder = Request::builder().uri("/whoami");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_valid_token_reaches_handler_with_identity() -> anyhow::Result<()> {
    let authority = MockAuthority::start().await;
    authority
        .accept_token(
            "good-token",
            serde_json::json!({"sub": "u1", "name": "Alice", "role": ["admin", "user"]}),
        )
        .await;

    let validator = RemoteTokenValidator::builder(authority.config()).build()?;

    let response = app(validator)
        .oneshot(request(Some("Bearer good-token")))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "Alice:admin,user");
    Ok(())
}

#[tokio::test]
async fn test_missing_header_is_401_without_validation_call() {
    let authority = MockAuthority::start().await;
    authority.reject_all(401).await;

    let validator = RemoteTokenValidator::builder(authority.config())
        .build()
        .unwrap();

    let response = app(validator).oneshot(request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    assert_eq!(authority.validation_requests().await, 0);
}

#[tokio::test]
async fn test_rejected_token_is_401() {
    let authority = MockAuthority::start().await;
    authority.reject_token("bad-token", 401).await;

    let validator = RemoteTokenValidator::builder(authority.config())
        .build()
        .unwrap();

    let response = app(validator)
        .oneshot(request(Some("Bearer bad-token")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer error=\"invalid_token\""
    );
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_unreachable_authority_is_503() {
    let validator = RemoteTokenValidator::builder(test_config(&unreachable_authority()))
        .build()
        .unwrap();

    let response = app(validator)
        .oneshot(request(Some("Bearer some-token")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));

    let body = body_string(response).await;
    assert!(body.contains("SERVICE_UNAVAILABLE"));
    // Internal cause stays server-side
    assert!(!body.contains("127.0.0.1"));
}
