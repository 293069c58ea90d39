// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Event notifier: announces user lifecycle changes to downstream services.
//!
//! Publishing is fire-and-continue. The lifecycle manager runs every publish
//! as a best-effort side effect, so an unavailable transport never blocks
//! issuance. Delivery guarantees belong to the transport.

use crate::error::AppError;
use crate::models::UserEvent;
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::Pool;
use tokio::sync::broadcast;

/// Logical exchange all user events belong to.
pub const USER_EVENTS_EXCHANGE: &str = "user_events";

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &UserEvent) -> Result<(), AppError>;
}

/// In-process fan-out to any number of subscribers.
///
/// Publishing with no subscribers is not an error; the event is dropped.
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<UserEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UserEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &UserEvent) -> Result<(), AppError> {
        match self.tx.send(event.clone()) {
            Ok(receivers) => {
                tracing::debug!(
                    routing_key = event.routing_key(),
                    receivers,
                    "Broadcast user event"
                );
            }
            Err(_) => {
                tracing::debug!(
                    routing_key = event.routing_key(),
                    "No subscribers for user event"
                );
            }
        }
        Ok(())
    }
}

/// Publishes each event as JSON on the Redis channel named by its routing key.
#[derive(Clone)]
pub struct RedisPublisher {
    pool: Pool,
}

impl RedisPublisher {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    async fn publish(&self, event: &UserEvent) -> Result<(), AppError> {
        let message = serde_json::to_string(event)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode event: {}", e)))?;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Redis pool: {}", e)))?;

        let receivers: i64 = conn
            .publish(event.routing_key(), &message)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("Redis publish: {}", e)))?;

        tracing::debug!(
            exchange = USER_EVENTS_EXCHANGE,
            routing_key = event.routing_key(),
            receivers,
            "Published user event"
        );
        Ok(())
    }
}

/// Writes events to the log only. Used when no transport is configured.
#[derive(Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &UserEvent) -> Result<(), AppError> {
        tracing::info!(
            exchange = USER_EVENTS_EXCHANGE,
            routing_key = event.routing_key(),
            user_id = %event.user_id,
            "User event"
        );
        Ok(())
    }
}
