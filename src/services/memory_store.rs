// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process session store backed by a `DashMap`.
//!
//! Entries expire lazily on read; `purge_expired` drops the rest. Expiry uses
//! the tokio clock so paused-time tests can move past a TTL.

use crate::error::AppError;
use crate::models::{SessionPayload, TokenPair};
use crate::services::session_store::{from_json, keys, to_json, SessionStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct StoredEntry {
    value: String,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Single-instance store. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, key: String, value: String, ttl: Duration) {
        if ttl.is_zero() {
            self.entries.remove(&key);
            return;
        }
        self.entries.insert(
            key,
            StoredEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        // Expired (or absent): drop it without racing a fresh write.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    fn del(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Remaining lifetime of a live entry.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn cache_token_pair(
        &self,
        user_id: Uuid,
        pair: &TokenPair,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let key = keys::token(user_id);
        let value = to_json(&key, pair)?;
        self.set(key, value, ttl);
        Ok(())
    }

    async fn get_cached_token_pair(&self, user_id: Uuid) -> Result<Option<TokenPair>, AppError> {
        let key = keys::token(user_id);
        Ok(self.get(&key).and_then(|raw| from_json(&key, &raw)))
    }

    async fn delete_cached_token_pair(&self, user_id: Uuid) -> Result<(), AppError> {
        self.del(&keys::token(user_id));
        Ok(())
    }

    async fn set_session(
        &self,
        user_id: Uuid,
        payload: &SessionPayload,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let key = keys::session(user_id);
        let value = to_json(&key, payload)?;
        self.set(key, value, ttl);
        Ok(())
    }

    async fn get_session(&self, user_id: Uuid) -> Result<Option<SessionPayload>, AppError> {
        let key = keys::session(user_id);
        Ok(self.get(&key).and_then(|raw| from_json(&key, &raw)))
    }

    async fn delete_session(&self, user_id: Uuid) -> Result<(), AppError> {
        self.del(&keys::session(user_id));
        Ok(())
    }

    async fn blacklist(&self, token: &str, ttl: Duration) -> Result<(), AppError> {
        if ttl.is_zero() {
            return Ok(());
        }
        self.set(keys::blacklist(token), "true".to_string(), ttl);
        Ok(())
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool, AppError> {
        Ok(self.get(&keys::blacklist(token)).is_some())
    }
}
