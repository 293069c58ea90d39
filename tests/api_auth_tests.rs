// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication and CORS tests.
//!
//! These tests verify that:
//! 1. Protected routes reject requests without valid tokens
//! 2. Protected routes accept tokens issued through assertion intake
//! 3. Logout revokes the presented token
//! 4. CORS preflight requests return correct headers

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use identity_gateway::config::Config;
use identity_gateway::models::IssuedCredentials;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

mod common;
use common::{body_json, create_test_app, create_test_app_with, json_post, signed_post, FailingStore};

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn logout_request(token: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Sign in through assertion intake and return the issued credentials.
async fn sign_in(app: &axum::Router, key: &[u8]) -> IssuedCredentials {
    let assertion = json!({
        "provider": "github",
        "provider_subject_id": "42",
        "email": "dev@example.com",
        "name": "Dev"
    });
    let response = app
        .clone()
        .oneshot(signed_post("/auth/assertions", &assertion, key))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_value(body_json(response).await).unwrap()
}

#[tokio::test]
async fn test_protected_route_without_token() {
    let (app, _) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/auth/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_credentials");
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let (app, _) = create_test_app();

    let response = app
        .oneshot(get_with_token("/auth/me", "invalid.token.here"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_credential_failures_are_indistinguishable() {
    let (app, state) = create_test_app();
    let issued = sign_in(&app, &state.config.assertion_signing_key).await;

    // A refresh token presented as an access token, and garbage.
    let mut bodies = Vec::new();
    for token in [issued.refresh_token.as_str(), "garbage"] {
        let response = app
            .clone()
            .oneshot(get_with_token("/auth/me", token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(body_json(response).await);
    }

    assert_eq!(bodies[0], bodies[1]);
    assert!(bodies[0].get("details").is_none());
}

#[tokio::test]
async fn test_protected_route_with_issued_token() {
    let (app, state) = create_test_app();
    let issued = sign_in(&app, &state.config.assertion_signing_key).await;

    let response = app
        .oneshot(get_with_token("/auth/me", &issued.access_token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], issued.user.id.to_string());
    assert_eq!(body["email"], "dev@example.com");
    assert_eq!(body["name"], "Dev");
}

#[tokio::test]
async fn test_logout_revokes_access_token() {
    let (app, state) = create_test_app();
    let issued = sign_in(&app, &state.config.assertion_signing_key).await;

    let response = app
        .clone()
        .oneshot(logout_request(
            &issued.access_token,
            Some(json!({ "refresh_token": issued.refresh_token })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(get_with_token("/auth/me", &issued.access_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(json_post(
            "/auth/refresh",
            &json!({ "refresh_token": issued.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_body() {
    let (app, state) = create_test_app();
    let issued = sign_in(&app, &state.config.assertion_signing_key).await;

    let response = app
        .oneshot(logout_request(&issued.access_token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_logout_failure_returns_service_unavailable() {
    let store = FailingStore::new();
    let app = create_test_app_with(Config::test_default(), Arc::new(store.clone()));
    let issued = sign_in(&app.router, &app.state.config.assertion_signing_key).await;

    FailingStore::set(&store.fail_blacklist_writes, true);
    let response = app
        .router
        .oneshot(logout_request(&issued.access_token, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"], "revocation_failed");
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_refresh_returns_new_pair() {
    let (app, state) = create_test_app();
    let issued = sign_in(&app, &state.config.assertion_signing_key).await;

    let response = app
        .clone()
        .oneshot(json_post(
            "/auth/refresh",
            &json!({ "refresh_token": issued.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let refreshed: IssuedCredentials = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(refreshed.user.id, issued.user.id);
    assert_ne!(refreshed.refresh_token, issued.refresh_token);

    // Rotation: the first refresh token is spent.
    let response = app
        .oneshot(json_post(
            "/auth/refresh",
            &json!({ "refresh_token": issued.refresh_token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_with_malformed_body() {
    let (app, _) = create_test_app();

    let response = app
        .oneshot(json_post("/auth/refresh", &json!({ "token": "x" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors_preflight() {
    let (app, _) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/auth/me")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // OPTIONS should return 200 (CORS preflight success)
    assert_eq!(response.status(), StatusCode::OK);

    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
}

#[tokio::test]
async fn test_public_route_no_auth_required() {
    let (app, _) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "identity-gateway");
}
