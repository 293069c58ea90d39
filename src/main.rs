// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity Gateway API Server
//!
//! Accepts signed identity assertions from provider collaborators and issues
//! local access/refresh tokens for internal services.

use identity_gateway::{
    config::{Config, IdentityBackend},
    db::{FirestoreDb, IdentityRepository, MemoryRepository},
    services::{
        BroadcastPublisher, EventPublisher, LogPublisher, MemoryStore, RedisPublisher,
        RedisStore, SessionStore, TokenLifecycleManager,
    },
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired entries are swept from in-process maps.
const MEMORY_STORE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        port = config.port,
        refresh_policy = ?config.refresh_policy,
        "Starting Identity Gateway"
    );

    // Identity repository
    let repo: Arc<dyn IdentityRepository> = match config.identity_backend {
        IdentityBackend::Firestore => Arc::new(
            FirestoreDb::new(&config.gcp_project_id)
                .await
                .expect("Failed to connect to Firestore"),
        ),
        IdentityBackend::Memory => {
            tracing::warn!("Using in-memory identity repository (single instance only)");
            Arc::new(MemoryRepository::new())
        }
    };

    // Session store and event publisher
    let (store, events): (Arc<dyn SessionStore>, Arc<dyn EventPublisher>) =
        match &config.redis_url {
            Some(url) => {
                let redis = RedisStore::connect(url, config.store_timeout)
                    .expect("Failed to create Redis pool");
                if let Err(e) = redis.ping().await {
                    tracing::warn!(error = %e, "Redis not reachable at startup");
                }
                tracing::info!("Redis session store initialized");
                let mirror = redis.clone();
                spawn_purge_task("redis_local_blacklist", move || mirror.purge_local());
                let publisher = RedisPublisher::new(redis.pool().clone());
                (Arc::new(redis), Arc::new(publisher))
            }
            None => {
                tracing::warn!("REDIS_URL not set, using in-process session store");
                let memory = MemoryStore::new();
                let sweep = memory.clone();
                spawn_purge_task("memory_store", move || sweep.purge_expired());

                // Keep a subscriber attached so events are visible in the log.
                let broadcast = BroadcastPublisher::default();
                spawn_event_logger(broadcast.clone());
                (Arc::new(memory), Arc::new(broadcast))
            }
        };

    let lifecycle = TokenLifecycleManager::new(&config, repo, store, events);

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        lifecycle,
    });

    // Build router
    let app = identity_gateway::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically drop expired entries from an in-process map.
fn spawn_purge_task<F>(store: &'static str, purge: F)
where
    F: Fn() -> usize + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MEMORY_STORE_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = purge();
            if purged > 0 {
                tracing::debug!(store, purged, "Purged expired store entries");
            }
        }
    });
}

/// Forward in-process user events to the log publisher.
fn spawn_event_logger(broadcast: BroadcastPublisher) {
    let mut rx = broadcast.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let _ = LogPublisher.publish(&event).await;
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger lagged behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("identity_gateway=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
