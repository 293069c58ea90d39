// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes: assertion intake, refresh, logout, current user.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{ExternalIdentityAssertion, IssuedCredentials, Provider, UserSummary};
use crate::services::providers::{self, ProviderCallback};
use crate::AppState;

/// Routes whose bodies must carry a valid assertion signature.
pub fn signed_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/assertions", post(accept_assertion))
        .route("/auth/callback/{provider}", post(provider_callback))
}

/// Routes open to any caller.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/refresh", post(refresh))
}

/// Routes that require a bearer access token.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Accept a normalized assertion from a trusted provider collaborator.
async fn accept_assertion(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<IssuedCredentials>> {
    let assertion: ExternalIdentityAssertion = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidAssertion(format!("Invalid assertion body: {}", e)))?;

    tracing::info!(provider = %assertion.provider.trim(), "Received identity assertion");

    let credentials = state.lifecycle.issue_for_assertion(assertion).await?;
    Ok(Json(credentials))
}

/// Accept a raw provider profile, normalize it, then issue credentials.
async fn provider_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Result<Json<IssuedCredentials>> {
    let provider: Provider = provider.parse()?;
    let callback: ProviderCallback = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid callback body: {}", e)))?;

    let assertion = providers::normalize(&provider, callback).map_err(|e| {
        tracing::warn!(provider = %provider, error = %e, "Provider profile rejected");
        e
    })?;

    let credentials = state.lifecycle.issue_for_assertion(assertion).await?;
    Ok(Json(credentials))
}

/// Exchange a refresh token for a new pair.
async fn refresh(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<IssuedCredentials>> {
    let request: RefreshRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid refresh body: {}", e)))?;

    let credentials = state.lifecycle.refresh(&request.refresh_token).await?;
    Ok(Json(credentials))
}

/// Revoke the caller's credentials. The body is optional.
async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    body: Bytes,
) -> Result<StatusCode> {
    let request: LogoutRequest = if body.iter().all(u8::is_ascii_whitespace) {
        LogoutRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid logout body: {}", e)))?
    };

    state
        .lifecycle
        .revoke(auth.user_id, &auth.token, request.refresh_token.as_deref())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Current user profile.
async fn me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<UserSummary>> {
    let user = state.lifecycle.current_user(auth.user_id).await?;
    Ok(Json(user.summary()))
}
