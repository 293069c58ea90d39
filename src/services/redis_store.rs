// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Redis-backed session store for multi-instance deployments.
//!
//! Blacklist writes are mirrored into a local map. When Redis cannot be
//! reached, a blacklist lookup still reports revocations made by this
//! instance; anything else is reported as `StoreUnavailable` so the caller
//! can fail closed.

use crate::error::AppError;
use crate::models::{SessionPayload, TokenPair};
use crate::services::memory_store::MemoryStore;
use crate::services::session_store::{from_json, keys, to_json, SessionStore};
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Connection, Pool};
use std::time::Duration;
use uuid::Uuid;

/// Maximum pooled connections per instance.
const POOL_SIZE: usize = 16;

#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    /// Local copy of blacklist entries written by this instance
    local_blacklist: MemoryStore,
}

impl RedisStore {
    /// Build a pool for `url`. Connections are created lazily.
    pub fn connect(url: &str, timeout: Duration) -> Result<Self, AppError> {
        let mut redis_config = deadpool_redis::Config::from_url(url);
        let mut pool_config = deadpool_redis::PoolConfig::new(POOL_SIZE);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| AppError::StoreUnavailable(format!("Failed to create Redis pool: {}", e)))?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool,
            local_blacklist: MemoryStore::new(),
        }
    }

    /// Drop expired entries from the local blacklist mirror.
    pub fn purge_local(&self) -> usize {
        self.local_blacklist.purge_expired()
    }

    /// Entries currently held in the local blacklist mirror.
    pub fn local_len(&self) -> usize {
        self.local_blacklist.len()
    }

    /// Underlying pool, shared with the event publisher.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Check that a connection can be established (for health checks and startup).
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.conn().await?;
        let _: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(redis_error)?;
        Ok(())
    }

    async fn conn(&self) -> Result<Connection, AppError> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Redis pool: {}", e)))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError> {
        // SETEX rejects a zero expiry; round sub-second TTLs up.
        let secs = ttl.as_secs().max(1);
        let mut conn = self.conn().await?;
        let _: () = conn.set_ex(key, value, secs).await.map_err(redis_error)?;
        tracing::debug!(key = %redact(key), ttl_secs = secs, "Redis SETEX");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(redis_error)
    }

    async fn del(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key).await.map_err(redis_error)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.conn().await?;
        conn.exists(key).await.map_err(redis_error)
    }
}

fn redis_error(e: deadpool_redis::redis::RedisError) -> AppError {
    AppError::StoreUnavailable(format!("Redis: {}", e))
}

/// Keep raw tokens out of logs.
fn redact(key: &str) -> &str {
    if key.starts_with("blacklist:") {
        "blacklist:<redacted>"
    } else {
        key
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn cache_token_pair(
        &self,
        user_id: Uuid,
        pair: &TokenPair,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let key = keys::token(user_id);
        let value = to_json(&key, pair)?;
        self.set_ex(&key, &value, ttl).await
    }

    async fn get_cached_token_pair(&self, user_id: Uuid) -> Result<Option<TokenPair>, AppError> {
        let key = keys::token(user_id);
        Ok(self.get(&key).await?.and_then(|raw| from_json(&key, &raw)))
    }

    async fn delete_cached_token_pair(&self, user_id: Uuid) -> Result<(), AppError> {
        self.del(&keys::token(user_id)).await
    }

    async fn set_session(
        &self,
        user_id: Uuid,
        payload: &SessionPayload,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let key = keys::session(user_id);
        let value = to_json(&key, payload)?;
        self.set_ex(&key, &value, ttl).await
    }

    async fn get_session(&self, user_id: Uuid) -> Result<Option<SessionPayload>, AppError> {
        let key = keys::session(user_id);
        Ok(self.get(&key).await?.and_then(|raw| from_json(&key, &raw)))
    }

    async fn delete_session(&self, user_id: Uuid) -> Result<(), AppError> {
        self.del(&keys::session(user_id)).await
    }

    async fn blacklist(&self, token: &str, ttl: Duration) -> Result<(), AppError> {
        if ttl.is_zero() {
            return Ok(());
        }
        // Local first: even if Redis is down, this instance honors the revocation.
        self.local_blacklist.blacklist(token, ttl).await?;
        self.set_ex(&keys::blacklist(token), "true", ttl).await
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool, AppError> {
        if self.local_blacklist.is_blacklisted(token).await? {
            return Ok(true);
        }
        self.exists(&keys::blacklist(token)).await
    }

    async fn blacklist_rotated(&self, token: &str, ttl: Duration) -> Result<(), AppError> {
        if ttl.is_zero() {
            return Ok(());
        }
        // Redis first: a failed rotation fails the refresh, and the local
        // mirror must not reject the client's retry.
        self.set_ex(&keys::blacklist(token), "true", ttl).await?;
        self.local_blacklist.blacklist(token, ttl).await
    }
}
