// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! Every credential failure renders the same `invalid_credentials` body so
//! callers cannot tell an expired token from a forged one, a revoked one, or
//! one that names a user that no longer exists.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid assertion: {0}")]
    InvalidAssertion(String),

    #[error("Token expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Token revoked")]
    Revoked,

    #[error("User not found")]
    UserNotFound,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Revocation incomplete: {0}")]
    RevocationFailed(String),

    #[error("Identity provider error: {0}")]
    ProviderFailure(String),

    #[error("Storage conflict: {0}")]
    Conflict(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for every failure that must be reported as "invalid credentials".
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            AppError::ExpiredToken
                | AppError::InvalidSignature
                | AppError::MalformedToken
                | AppError::Revoked
                | AppError::UserNotFound
                | AppError::Unauthorized
        )
    }

    /// True for failures the caller may retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::StoreUnavailable(_)
                | AppError::RevocationFailed(_)
                | AppError::ProviderFailure(_)
                | AppError::Timeout(_)
        )
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_credential_failure() {
            tracing::debug!(reason = %self, "Rejected credentials");
            let body = ErrorResponse {
                error: "invalid_credentials".to_string(),
                details: None,
            };
            return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        }

        let (status, error, details) = match &self {
            AppError::InvalidAssertion(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_assertion",
                Some(msg.clone()),
            ),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::ProviderFailure(msg) => {
                tracing::warn!(error = %msg, "Identity provider failure");
                (StatusCode::BAD_GATEWAY, "provider_error", None)
            }
            AppError::StoreUnavailable(msg) => {
                tracing::error!(error = %msg, "Session store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", None)
            }
            AppError::RevocationFailed(msg) => {
                tracing::error!(error = %msg, "Revocation incomplete");
                (StatusCode::SERVICE_UNAVAILABLE, "revocation_failed", None)
            }
            AppError::Conflict(msg) => {
                tracing::warn!(error = %msg, "Unresolved storage conflict");
                (StatusCode::CONFLICT, "conflict", None)
            }
            AppError::Timeout(what) => {
                tracing::error!(operation = %what, "Operation timed out");
                (StatusCode::GATEWAY_TIMEOUT, "timeout", None)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            // Credential failures returned above.
            _ => (StatusCode::UNAUTHORIZED, "invalid_credentials", None),
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
