// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use identity_gateway::config::Config;
use identity_gateway::db::{FirestoreDb, MemoryRepository};
use identity_gateway::error::AppError;
use identity_gateway::middleware::assertion_auth::{sign_body, SIGNATURE_HEADER};
use identity_gateway::models::{ExternalIdentityAssertion, SessionPayload, TokenPair};
use identity_gateway::routes::create_router;
use identity_gateway::services::{
    BroadcastPublisher, MemoryStore, SessionStore, TokenLifecycleManager,
};
use identity_gateway::AppState;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Build an assertion with only the required fields set.
#[allow(dead_code)]
pub fn assertion(provider: &str, subject: &str, email: &str) -> ExternalIdentityAssertion {
    ExternalIdentityAssertion {
        provider: provider.to_string(),
        provider_subject_id: subject.to_string(),
        email: email.to_string(),
        ..Default::default()
    }
}

/// Session store whose individual operations can be switched to fail.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct FailingStore {
    pub inner: MemoryStore,
    pub fail_cache_writes: Arc<AtomicBool>,
    pub fail_cache_reads: Arc<AtomicBool>,
    pub fail_blacklist_writes: Arc<AtomicBool>,
    pub fail_blacklist_reads: Arc<AtomicBool>,
    pub fail_session_deletes: Arc<AtomicBool>,
    /// Number of blacklist write attempts seen (failed or not)
    pub blacklist_write_attempts: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(flag: &AtomicBool, on: bool) {
        flag.store(on, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), AppError> {
        if flag.load(Ordering::SeqCst) {
            Err(AppError::StoreUnavailable(format!("injected {} failure", what)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for FailingStore {
    async fn cache_token_pair(
        &self,
        user_id: Uuid,
        pair: &TokenPair,
        ttl: Duration,
    ) -> Result<(), AppError> {
        Self::check(&self.fail_cache_writes, "cache")?;
        self.inner.cache_token_pair(user_id, pair, ttl).await
    }

    async fn get_cached_token_pair(&self, user_id: Uuid) -> Result<Option<TokenPair>, AppError> {
        Self::check(&self.fail_cache_reads, "cache read")?;
        self.inner.get_cached_token_pair(user_id).await
    }

    async fn delete_cached_token_pair(&self, user_id: Uuid) -> Result<(), AppError> {
        self.inner.delete_cached_token_pair(user_id).await
    }

    async fn set_session(
        &self,
        user_id: Uuid,
        payload: &SessionPayload,
        ttl: Duration,
    ) -> Result<(), AppError> {
        Self::check(&self.fail_cache_writes, "session")?;
        self.inner.set_session(user_id, payload, ttl).await
    }

    async fn get_session(&self, user_id: Uuid) -> Result<Option<SessionPayload>, AppError> {
        self.inner.get_session(user_id).await
    }

    async fn delete_session(&self, user_id: Uuid) -> Result<(), AppError> {
        Self::check(&self.fail_session_deletes, "session delete")?;
        self.inner.delete_session(user_id).await
    }

    async fn blacklist(&self, token: &str, ttl: Duration) -> Result<(), AppError> {
        self.blacklist_write_attempts.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_blacklist_writes, "blacklist write")?;
        self.inner.blacklist(token, ttl).await
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool, AppError> {
        Self::check(&self.fail_blacklist_reads, "blacklist read")?;
        self.inner.is_blacklisted(token).await
    }
}

/// Everything a test may want to inspect behind the router.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub repo: MemoryRepository,
    pub events: BroadcastPublisher,
}

/// Lifecycle manager over in-memory adapters and the given store.
#[allow(dead_code)]
pub fn test_manager(
    config: &Config,
    repo: &MemoryRepository,
    store: Arc<dyn SessionStore>,
    events: &BroadcastPublisher,
) -> TokenLifecycleManager {
    TokenLifecycleManager::new(
        config,
        Arc::new(repo.clone()),
        store,
        Arc::new(events.clone()),
    )
}

/// Create a test app over in-memory adapters.
#[allow(dead_code)]
pub fn create_test_app_with(config: Config, store: Arc<dyn SessionStore>) -> TestApp {
    let repo = MemoryRepository::new();
    let events = BroadcastPublisher::new(64);
    let lifecycle = test_manager(&config, &repo, store, &events);

    let state = Arc::new(AppState { config, lifecycle });

    TestApp {
        router: create_router(state.clone()),
        state,
        repo,
        events,
    }
}

/// Create a test app with default config and an in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let app = create_test_app_with(Config::test_default(), Arc::new(MemoryStore::new()));
    (app.router, app.state)
}

/// POST a correctly signed JSON body.
#[allow(dead_code)]
pub fn signed_post(uri: &str, body: &serde_json::Value, key: &[u8]) -> Request<Body> {
    let bytes = serde_json::to_vec(body).unwrap();
    let signature = sign_body(key, &bytes).unwrap();
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(bytes))
        .unwrap()
}

/// POST an unsigned JSON body.
#[allow(dead_code)]
pub fn json_post(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
