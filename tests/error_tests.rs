// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use identity_gateway::error::AppError;

#[test]
fn test_credential_failures_match() {
    for err in [
        AppError::ExpiredToken,
        AppError::InvalidSignature,
        AppError::MalformedToken,
        AppError::Revoked,
        AppError::UserNotFound,
        AppError::Unauthorized,
    ] {
        assert!(err.is_credential_failure(), "{} should be a credential failure", err);
        assert!(!err.is_retryable());
    }
}

#[test]
fn test_retryable_errors() {
    assert!(AppError::StoreUnavailable("down".to_string()).is_retryable());
    assert!(AppError::RevocationFailed("down".to_string()).is_retryable());
    assert!(AppError::Timeout("get_user").is_retryable());

    assert!(!AppError::InvalidAssertion("bad".to_string()).is_retryable());
    assert!(!AppError::BadRequest("bad".to_string()).is_retryable());
}

#[test]
fn test_status_codes() {
    let cases = [
        (AppError::Revoked, StatusCode::UNAUTHORIZED),
        (
            AppError::InvalidAssertion("x".to_string()),
            StatusCode::BAD_REQUEST,
        ),
        (
            AppError::StoreUnavailable("x".to_string()),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
        (
            AppError::RevocationFailed("x".to_string()),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
        (AppError::Conflict("x".to_string()), StatusCode::CONFLICT),
        (AppError::Timeout("x"), StatusCode::GATEWAY_TIMEOUT),
        (
            AppError::ProviderFailure("x".to_string()),
            StatusCode::BAD_GATEWAY,
        ),
    ];

    for (err, status) in cases {
        assert_eq!(err.into_response().status(), status);
    }
}
