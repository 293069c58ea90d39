// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process identity repository for tests and single-instance deployments.
//!
//! All collections sit behind one `RwLock`, so each write (including
//! user-plus-link creation) is a single critical section and the unique
//! constraints are checked and applied atomically.

use crate::db::IdentityRepository;
use crate::error::AppError;
use crate::models::identity::link_key;
use crate::models::{IdentityLink, Provider, User};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Collections {
    users: HashMap<Uuid, User>,
    /// Normalized email -> owning user id
    user_emails: HashMap<String, Uuid>,
    /// `provider:subject` -> link
    identity_links: HashMap<String, IdentityLink>,
}

#[derive(Clone, Default)]
pub struct MemoryRepository {
    inner: Arc<RwLock<Collections>>,
    /// Artificial delay before every call, to widen race windows in tests
    latency: Option<Duration>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: Arc::default(),
            latency: Some(latency),
        }
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub async fn user_count(&self) -> usize {
        self.inner.read().await.users.len()
    }

    pub async fn link_count(&self) -> usize {
        self.inner.read().await.identity_links.len()
    }

    /// All links owned by `user_id`, ordered by creation time.
    pub async fn links_for_user(&self, user_id: Uuid) -> Vec<IdentityLink> {
        let inner = self.inner.read().await;
        let mut links: Vec<_> = inner
            .identity_links
            .values()
            .filter(|link| link.user_id == user_id)
            .cloned()
            .collect();
        links.sort_by_key(|link| link.created_at);
        links
    }
}

#[async_trait]
impl IdentityRepository for MemoryRepository {
    async fn find_link(
        &self,
        provider: &Provider,
        subject_id: &str,
    ) -> Result<Option<IdentityLink>, AppError> {
        self.delay().await;
        let inner = self.inner.read().await;
        Ok(inner
            .identity_links
            .get(&link_key(provider, subject_id))
            .cloned())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        self.delay().await;
        Ok(self.inner.read().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.delay().await;
        let inner = self.inner.read().await;
        Ok(inner
            .user_emails
            .get(email)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn update_user(&self, user: &User) -> Result<(), AppError> {
        self.delay().await;
        let mut inner = self.inner.write().await;

        let old_email = match inner.users.get(&user.id) {
            Some(existing) => existing.email.clone(),
            None => return Err(AppError::UserNotFound),
        };

        if old_email != user.email {
            if let Some(owner) = inner.user_emails.get(&user.email) {
                if *owner != user.id {
                    return Err(AppError::Conflict(format!(
                        "email already belongs to user {}",
                        owner
                    )));
                }
            }
            inner.user_emails.remove(&old_email);
            inner.user_emails.insert(user.email.clone(), user.id);
        }

        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn save_link(&self, link: &IdentityLink) -> Result<(), AppError> {
        self.delay().await;
        let mut inner = self.inner.write().await;
        inner.identity_links.insert(link.key(), link.clone());
        Ok(())
    }

    async fn insert_link(&self, link: &IdentityLink) -> Result<(), AppError> {
        self.delay().await;
        let mut inner = self.inner.write().await;
        let key = link.key();

        if inner.identity_links.contains_key(&key) {
            return Err(AppError::Conflict(format!("identity link {} exists", key)));
        }
        if !inner.users.contains_key(&link.user_id) {
            return Err(AppError::UserNotFound);
        }

        inner.identity_links.insert(key, link.clone());
        Ok(())
    }

    async fn create_user_with_link(
        &self,
        user: &User,
        link: &IdentityLink,
    ) -> Result<(), AppError> {
        self.delay().await;
        let mut inner = self.inner.write().await;
        let key = link.key();

        if inner.user_emails.contains_key(&user.email) {
            return Err(AppError::Conflict(format!(
                "email {} already registered",
                user.email
            )));
        }
        if inner.identity_links.contains_key(&key) {
            return Err(AppError::Conflict(format!("identity link {} exists", key)));
        }

        inner.user_emails.insert(user.email.clone(), user.id);
        inner.users.insert(user.id, user.clone());
        inner.identity_links.insert(key, link.clone());
        Ok(())
    }
}
