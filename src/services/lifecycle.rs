// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token lifecycle manager: issue, refresh, revoke and verify local credentials.
//!
//! `Unauthenticated → Issued → (Refreshed)* → Revoked`
//!
//! Every store and notifier call goes through [`SideEffectRunner`], so the
//! best-effort / must-succeed split lives in `services::policy` rather than in
//! ad-hoc error handling here.

use crate::config::{Config, RefreshPolicy};
use crate::db::IdentityRepository;
use crate::error::AppError;
use crate::models::{
    ExternalIdentityAssertion, IssuedCredentials, SessionPayload, TokenKind, TokenPair, User,
    UserAction, UserEvent, VerifiedToken,
};
use crate::services::codec::CredentialCodec;
use crate::services::events::EventPublisher;
use crate::services::key_locks::KeyLocks;
use crate::services::policy::{with_timeout, SideEffect, SideEffectRunner};
use crate::services::resolver::IdentityResolver;
use crate::services::session_store::SessionStore;
use crate::time_utils::remaining_lifetime;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct TokenLifecycleManager {
    resolver: IdentityResolver,
    codec: CredentialCodec,
    store: Arc<dyn SessionStore>,
    events: Arc<dyn EventPublisher>,
    runner: SideEffectRunner,
    store_timeout: Duration,
    token_cache_ttl: Duration,
    session_ttl: Duration,
    refresh_policy: RefreshPolicy,
    blacklist_fail_open: bool,
    /// Serializes concurrent refreshes of the same refresh token
    refresh_locks: KeyLocks,
}

impl TokenLifecycleManager {
    pub fn new(
        config: &Config,
        repo: Arc<dyn IdentityRepository>,
        store: Arc<dyn SessionStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            resolver: IdentityResolver::new(repo, config.store_timeout),
            codec: CredentialCodec::from_config(config),
            store,
            events,
            runner: SideEffectRunner::new(config.store_timeout),
            store_timeout: config.store_timeout,
            token_cache_ttl: config.token_cache_ttl,
            session_ttl: config.session_ttl,
            refresh_policy: config.refresh_policy,
            blacklist_fail_open: config.blacklist_fail_open,
            refresh_locks: KeyLocks::new(),
        }
    }

    pub fn codec(&self) -> &CredentialCodec {
        &self.codec
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        self.refresh_policy
    }

    // ─── Issue ───────────────────────────────────────────────────────

    /// Resolve an assertion to a user and issue a fresh credential pair.
    pub async fn issue_for_assertion(
        &self,
        assertion: ExternalIdentityAssertion,
    ) -> Result<IssuedCredentials, AppError> {
        let resolution = self.resolver.resolve(assertion).await?;
        let now = Utc::now();
        let credentials = self.issue_pair(&resolution.user, now).await?;

        let action = if resolution.is_new_user {
            UserAction::Created
        } else {
            UserAction::Updated
        };
        let event = UserEvent::for_user(&resolution.user, action, now);
        self.runner
            .run(SideEffect::PublishEvent, || self.events.publish(&event))
            .await?;

        tracing::info!(
            user_id = %resolution.user.id,
            is_new_user = resolution.is_new_user,
            "Issued credentials for assertion"
        );

        Ok(credentials)
    }

    /// Sign a pair for `user` and record it in the session store (best effort).
    async fn issue_pair(&self, user: &User, now: DateTime<Utc>) -> Result<IssuedCredentials, AppError> {
        let pair = TokenPair {
            access_token: self
                .codec
                .issue_at(user.id, &user.email, TokenKind::Access, now)?,
            refresh_token: self
                .codec
                .issue_at(user.id, &user.email, TokenKind::Refresh, now)?,
        };
        let session = SessionPayload {
            email: user.email.clone(),
            name: user.name.clone(),
        };

        self.runner
            .run(SideEffect::CacheTokenPair, || {
                self.store
                    .cache_token_pair(user.id, &pair, self.token_cache_ttl)
            })
            .await?;
        self.runner
            .run(SideEffect::WriteSession, || {
                self.store.set_session(user.id, &session, self.session_ttl)
            })
            .await?;

        Ok(IssuedCredentials {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: self.codec.ttl(TokenKind::Access).as_secs(),
            user: user.summary(),
        })
    }

    // ─── Refresh ─────────────────────────────────────────────────────

    /// Exchange a refresh token for a new pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedCredentials, AppError> {
        self.refresh_at(refresh_token, Utc::now()).await
    }

    pub async fn refresh_at(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedCredentials, AppError> {
        // Two concurrent refreshes of one token must not both win under Rotate.
        let _guard = self
            .refresh_locks
            .lock_all(&[token_fingerprint(refresh_token)])
            .await;

        self.ensure_not_blacklisted(refresh_token).await?;
        let verified = self.codec.verify_at(refresh_token, TokenKind::Refresh, now)?;

        let user = with_timeout(
            self.store_timeout,
            "get_user",
            self.resolver.repository().get_user(verified.user_id),
        )
        .await?
        .ok_or(AppError::UserNotFound)?;

        if self.refresh_policy == RefreshPolicy::Rotate {
            let ttl = remaining_lifetime(verified.expires_at, now);
            self.runner
                .run(SideEffect::RotateRefreshToken, || {
                    self.store.blacklist_rotated(refresh_token, ttl)
                })
                .await?;
        }

        let credentials = self.issue_pair(&user, now).await?;
        tracing::info!(user_id = %user.id, policy = ?self.refresh_policy, "Refreshed credentials");
        Ok(credentials)
    }

    // ─── Revoke ──────────────────────────────────────────────────────

    /// Log out `user_id`: revoke the access token, every refresh token we can
    /// find, and drop the session.
    pub async fn revoke(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), AppError> {
        self.revoke_at(user_id, access_token, refresh_token, Utc::now())
            .await
    }

    pub async fn revoke_at(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let access = self
            .codec
            .verify_ignoring_expiry(access_token, TokenKind::Access)?;
        if access.user_id != user_id {
            tracing::warn!(user_id = %user_id, "Revoke with access token of another user");
            return Err(AppError::Unauthorized);
        }

        // 1. Access token, for whatever lifetime it has left.
        let access_ttl = remaining_lifetime(access.expires_at, now);
        if !access_ttl.is_zero() {
            self.runner
                .run(SideEffect::BlacklistAccessToken, || {
                    self.store.blacklist(access_token, access_ttl)
                })
                .await?;
        }

        // 2. Refresh tokens: the cached pair's and whatever the caller presented.
        let cached = self
            .runner
            .run(SideEffect::ReadCachedPair, || {
                self.store.get_cached_token_pair(user_id)
            })
            .await?
            .flatten();

        let mut refresh_tokens: Vec<&str> = Vec::new();
        if let Some(pair) = &cached {
            refresh_tokens.push(&pair.refresh_token);
        }
        if let Some(presented) = refresh_token {
            if !refresh_tokens.contains(&presented) {
                refresh_tokens.push(presented);
            }
        }

        for token in refresh_tokens {
            let ttl = match self.codec.verify_ignoring_expiry(token, TokenKind::Refresh) {
                Ok(verified) if verified.user_id == user_id => {
                    remaining_lifetime(verified.expires_at, now)
                }
                Ok(_) => {
                    tracing::warn!(user_id = %user_id, "Ignoring refresh token of another user");
                    continue;
                }
                // Unverifiable tokens are useless to an attacker as well.
                Err(_) => continue,
            };
            if ttl.is_zero() {
                continue;
            }
            self.runner
                .run(SideEffect::BlacklistRefreshToken, || {
                    self.store.blacklist(token, ttl)
                })
                .await?;
        }

        // 3. Session state.
        self.runner
            .run(SideEffect::DeleteSession, || self.store.delete_session(user_id))
            .await?;
        self.runner
            .run(SideEffect::DeleteCachedPair, || {
                self.store.delete_cached_token_pair(user_id)
            })
            .await?;

        tracing::info!(user_id = %user_id, "Revoked credentials");
        Ok(())
    }

    // ─── Verify / Read ───────────────────────────────────────────────

    /// Verify an access token for a protected request.
    pub async fn authenticate(&self, access_token: &str) -> Result<VerifiedToken, AppError> {
        self.authenticate_at(access_token, Utc::now()).await
    }

    pub async fn authenticate_at(
        &self,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedToken, AppError> {
        self.ensure_not_blacklisted(access_token).await?;
        self.codec.verify_at(access_token, TokenKind::Access, now)
    }

    /// Load the current profile of `user_id`.
    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AppError> {
        with_timeout(
            self.store_timeout,
            "get_user",
            self.resolver.repository().get_user(user_id),
        )
        .await?
        .ok_or(AppError::UserNotFound)
    }

    /// `Revoked` if the token is blacklisted. Store failures fail closed
    /// unless fail-open was configured.
    async fn ensure_not_blacklisted(&self, token: &str) -> Result<(), AppError> {
        match self
            .runner
            .run(SideEffect::BlacklistCheck, || self.store.is_blacklisted(token))
            .await
        {
            Ok(Some(true)) => Err(AppError::Revoked),
            Ok(_) => Ok(()),
            Err(e) if self.blacklist_fail_open => {
                tracing::warn!(error = %e, "Blacklist check failed, continuing (fail-open)");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Blacklist check failed, rejecting token");
                Err(e)
            }
        }
    }
}

/// Lock key for a token that does not keep the token itself in memory.
fn token_fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
