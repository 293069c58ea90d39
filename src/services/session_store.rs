// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Revocation & session store interface.
//!
//! The store holds three kinds of entries, each with its own expiry:
//! - `token:<userId>`: last issued access/refresh pair
//! - `session:<userId>`: session payload (email, name)
//! - `blacklist:<token>`: tokens revoked before their natural expiry
//!
//! Implementations must make every operation idempotent. Whether a failure is
//! fatal is decided by the caller (see `services::policy`), not the store.

use crate::error::AppError;
use crate::models::{SessionPayload, TokenPair};
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// Key layout shared by all store implementations.
pub mod keys {
    use uuid::Uuid;

    pub fn token(user_id: Uuid) -> String {
        format!("token:{}", user_id)
    }

    pub fn session(user_id: Uuid) -> String {
        format!("session:{}", user_id)
    }

    pub fn blacklist(token: &str) -> String {
        format!("blacklist:{}", token)
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn cache_token_pair(
        &self,
        user_id: Uuid,
        pair: &TokenPair,
        ttl: Duration,
    ) -> Result<(), AppError>;

    async fn get_cached_token_pair(&self, user_id: Uuid) -> Result<Option<TokenPair>, AppError>;

    async fn delete_cached_token_pair(&self, user_id: Uuid) -> Result<(), AppError>;

    async fn set_session(
        &self,
        user_id: Uuid,
        payload: &SessionPayload,
        ttl: Duration,
    ) -> Result<(), AppError>;

    async fn get_session(&self, user_id: Uuid) -> Result<Option<SessionPayload>, AppError>;

    async fn delete_session(&self, user_id: Uuid) -> Result<(), AppError>;

    /// Mark `token` revoked for `ttl`. A zero `ttl` is a no-op.
    async fn blacklist(&self, token: &str, ttl: Duration) -> Result<(), AppError>;

    async fn is_blacklisted(&self, token: &str) -> Result<bool, AppError>;

    /// Mark a refresh token spent after it was exchanged. Unlike `blacklist`,
    /// a failed call must leave the token usable so the client can retry.
    async fn blacklist_rotated(&self, token: &str, ttl: Duration) -> Result<(), AppError> {
        self.blacklist(token, ttl).await
    }
}

/// Serialize a value for storage.
pub(crate) fn to_json<T: serde::Serialize>(key: &str, value: &T) -> Result<String, AppError> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode {}: {}", key, e)))
}

/// Decode a stored value; unreadable entries are treated as absent.
pub(crate) fn from_json<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Discarding unreadable store entry");
            None
        }
    }
}
