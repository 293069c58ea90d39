// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Signature check for assertion intake.
//!
//! Provider collaborators sign the raw request body with the shared
//! `ASSERTION_SIGNING_KEY` and send the hex HMAC-SHA256 in
//! `X-Assertion-Signature`. Unsigned or mis-signed bodies never reach the
//! resolver.

use crate::error::AppError;
use crate::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-assertion-signature";

/// Assertions are small JSON documents.
const MAX_ASSERTION_BYTES: usize = 64 * 1024;

/// Hex HMAC-SHA256 of `body` under `key`.
pub fn sign_body(key: &[u8], body: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature.
fn verify_signature(key: &[u8], body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Middleware that rejects assertion bodies without a valid signature.
pub async fn require_signed_assertion(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();

    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            tracing::warn!(path = %parts.uri.path(), "Assertion without signature");
            AppError::Unauthorized
        })?;

    let bytes = axum::body::to_bytes(body, MAX_ASSERTION_BYTES)
        .await
        .map_err(|e| AppError::BadRequest(format!("Unreadable body: {}", e)))?;

    if !verify_signature(&state.config.assertion_signing_key, &bytes, &signature) {
        tracing::warn!(path = %parts.uri.path(), "Assertion signature mismatch");
        return Err(AppError::Unauthorized);
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}
