// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity resolver: maps an external assertion onto exactly one local user.
//!
//! Resolution order:
//! 1. Existing link for `provider:subject` → refresh link tokens and profile.
//! 2. Existing user with the same email → attach a new link.
//! 3. Otherwise → create user and link in one atomic write.
//!
//! Within one instance, resolutions touching the same link key or email are
//! serialized. Across instances the repository's unique constraints decide the
//! winner; the loser sees `Conflict` and re-runs the resolution.

use crate::db::IdentityRepository;
use crate::error::AppError;
use crate::models::user::ProfileUpdate;
use crate::models::{ExternalIdentityAssertion, IdentityLink, User, ValidatedAssertion};
use crate::services::key_locks::KeyLocks;
use crate::services::policy::with_timeout;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Attempts before a persistent `Conflict` is surfaced.
const MAX_RESOLVE_ATTEMPTS: u32 = 3;

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub user: User,
    pub is_new_user: bool,
}

#[derive(Clone)]
pub struct IdentityResolver {
    repo: Arc<dyn IdentityRepository>,
    locks: KeyLocks,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(repo: Arc<dyn IdentityRepository>, timeout: Duration) -> Self {
        Self {
            repo,
            locks: KeyLocks::new(),
            timeout,
        }
    }

    pub fn repository(&self) -> &Arc<dyn IdentityRepository> {
        &self.repo
    }

    /// Validate and resolve an inbound assertion.
    pub async fn resolve(&self, assertion: ExternalIdentityAssertion) -> Result<Resolution, AppError> {
        let assertion = assertion.into_validated()?;
        self.resolve_validated(&assertion).await
    }

    pub async fn resolve_validated(
        &self,
        assertion: &ValidatedAssertion,
    ) -> Result<Resolution, AppError> {
        let keys = [
            format!("link:{}", assertion.link_key()),
            format!("email:{}", assertion.email),
        ];
        let _guard = self.locks.lock_all(&keys).await;

        let mut attempt = 1;
        loop {
            match self.resolve_once(assertion, Utc::now()).await {
                Err(AppError::Conflict(detail)) if attempt < MAX_RESOLVE_ATTEMPTS => {
                    tracing::warn!(
                        provider = %assertion.provider,
                        attempt,
                        detail = %detail,
                        "Identity write lost a uniqueness race, re-resolving"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn resolve_once(
        &self,
        assertion: &ValidatedAssertion,
        now: DateTime<Utc>,
    ) -> Result<Resolution, AppError> {
        let existing_link = with_timeout(
            self.timeout,
            "find_link",
            self.repo
                .find_link(&assertion.provider, &assertion.provider_subject_id),
        )
        .await?;

        if let Some(link) = existing_link {
            return self.update_linked(link, assertion, now).await;
        }

        let by_email = with_timeout(
            self.timeout,
            "find_user_by_email",
            self.repo.find_user_by_email(&assertion.email),
        )
        .await?;

        match by_email {
            Some(user) => self.link_existing(user, assertion, now).await,
            None => self.create_new(assertion, now).await,
        }
    }

    /// Step 1: known external account.
    async fn update_linked(
        &self,
        mut link: IdentityLink,
        assertion: &ValidatedAssertion,
        now: DateTime<Utc>,
    ) -> Result<Resolution, AppError> {
        let mut user = with_timeout(self.timeout, "get_user", self.repo.get_user(link.user_id))
            .await?
            .ok_or_else(|| {
                AppError::Database(format!(
                    "identity link {} references missing user {}",
                    link.key(),
                    link.user_id
                ))
            })?;

        link.refresh_provider_tokens(assertion, now);
        with_timeout(self.timeout, "save_link", self.repo.save_link(&link)).await?;

        let mut email = Some(assertion.email.as_str());
        if assertion.email != user.email {
            let owner = with_timeout(
                self.timeout,
                "find_user_by_email",
                self.repo.find_user_by_email(&assertion.email),
            )
            .await?;
            if let Some(other) = owner.filter(|other| other.id != user.id) {
                tracing::warn!(
                    user_id = %user.id,
                    other_user_id = %other.id,
                    provider = %assertion.provider,
                    "Asserted email belongs to another user, keeping stored email"
                );
                email = None;
            }
        }

        let update = ProfileUpdate {
            email,
            name: assertion.name.as_deref(),
            avatar_url: assertion.avatar_url.as_deref(),
        };
        if user.apply_profile(&update, now) {
            with_timeout(self.timeout, "update_user", self.repo.update_user(&user)).await?;
            tracing::debug!(user_id = %user.id, "Updated user profile from assertion");
        }

        Ok(Resolution {
            user,
            is_new_user: false,
        })
    }

    /// Step 2: new external account, known email.
    async fn link_existing(
        &self,
        mut user: User,
        assertion: &ValidatedAssertion,
        now: DateTime<Utc>,
    ) -> Result<Resolution, AppError> {
        let link = IdentityLink::new(user.id, assertion, now);
        with_timeout(self.timeout, "insert_link", self.repo.insert_link(&link)).await?;

        tracing::info!(
            user_id = %user.id,
            provider = %assertion.provider,
            "Linked new identity to existing user by email"
        );

        let update = ProfileUpdate {
            email: None,
            name: assertion.name.as_deref(),
            avatar_url: assertion.avatar_url.as_deref(),
        };
        if user.apply_profile(&update, now) {
            with_timeout(self.timeout, "update_user", self.repo.update_user(&user)).await?;
        }

        Ok(Resolution {
            user,
            is_new_user: false,
        })
    }

    /// Step 3: never seen before.
    async fn create_new(
        &self,
        assertion: &ValidatedAssertion,
        now: DateTime<Utc>,
    ) -> Result<Resolution, AppError> {
        let user = User::new(
            &assertion.email,
            assertion.name.as_deref(),
            assertion.avatar_url.as_deref(),
            now,
        );
        let link = IdentityLink::new(user.id, assertion, now);

        with_timeout(
            self.timeout,
            "create_user_with_link",
            self.repo.create_user_with_link(&user, &link),
        )
        .await?;

        tracing::info!(
            user_id = %user.id,
            provider = %assertion.provider,
            "Created user for new identity"
        );

        Ok(Resolution {
            user,
            is_new_user: true,
        })
    }
}
