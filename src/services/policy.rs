// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Failure policy for every side effect of the token lifecycle.
//!
//! | Side effect            | Operation          | Policy                       |
//! |------------------------|--------------------|------------------------------|
//! | `CacheTokenPair`       | issue, refresh     | best effort                  |
//! | `WriteSession`         | issue, refresh     | best effort                  |
//! | `PublishEvent`         | issue              | best effort                  |
//! | `BlacklistCheck`       | refresh, verify    | must succeed (fail closed)   |
//! | `RotateRefreshToken`   | refresh (rotate)   | must succeed                 |
//! | `BlacklistAccessToken` | revoke             | must succeed, retried        |
//! | `ReadCachedPair`       | revoke             | must succeed, retried        |
//! | `BlacklistRefreshToken`| revoke             | must succeed, retried        |
//! | `DeleteSession`        | revoke             | must succeed, retried        |
//! | `DeleteCachedPair`     | revoke             | must succeed, retried        |
//!
//! `BlacklistCheck` becomes fail-open only when `BLACKLIST_FAIL_OPEN` is set.

use crate::error::AppError;
use std::future::Future;
use std::time::Duration;

/// Attempts made for a retried must-succeed side effect.
pub const REVOCATION_ATTEMPTS: u32 = 3;

/// Pause before the second attempt; doubled for each later attempt.
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    CacheTokenPair,
    WriteSession,
    PublishEvent,
    BlacklistCheck,
    RotateRefreshToken,
    BlacklistAccessToken,
    ReadCachedPair,
    BlacklistRefreshToken,
    DeleteSession,
    DeleteCachedPair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and continue; the operation still succeeds.
    BestEffort,
    /// Surface the failure after a single attempt.
    MustSucceed,
    /// Retry, then surface the failure.
    MustSucceedWithRetry,
}

impl SideEffect {
    pub const fn policy(self) -> FailurePolicy {
        match self {
            SideEffect::CacheTokenPair | SideEffect::WriteSession | SideEffect::PublishEvent => {
                FailurePolicy::BestEffort
            }
            SideEffect::BlacklistCheck | SideEffect::RotateRefreshToken => {
                FailurePolicy::MustSucceed
            }
            SideEffect::BlacklistAccessToken
            | SideEffect::ReadCachedPair
            | SideEffect::BlacklistRefreshToken
            | SideEffect::DeleteSession
            | SideEffect::DeleteCachedPair => FailurePolicy::MustSucceedWithRetry,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SideEffect::CacheTokenPair => "cache_token_pair",
            SideEffect::WriteSession => "write_session",
            SideEffect::PublishEvent => "publish_event",
            SideEffect::BlacklistCheck => "blacklist_check",
            SideEffect::RotateRefreshToken => "rotate_refresh_token",
            SideEffect::BlacklistAccessToken => "blacklist_access_token",
            SideEffect::ReadCachedPair => "read_cached_pair",
            SideEffect::BlacklistRefreshToken => "blacklist_refresh_token",
            SideEffect::DeleteSession => "delete_session",
            SideEffect::DeleteCachedPair => "delete_cached_pair",
        }
    }
}

/// Run `op` under a timeout, converting elapsed time into `AppError::Timeout`.
pub async fn with_timeout<T, F>(timeout: Duration, what: &'static str, op: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(timeout, op)
        .await
        .map_err(|_| AppError::Timeout(what))?
}

/// Executes side effects according to their [`FailurePolicy`].
#[derive(Debug, Clone, Copy)]
pub struct SideEffectRunner {
    timeout: Duration,
}

impl SideEffectRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run a side effect.
    ///
    /// Best-effort failures are logged and turned into `Ok(None)`. Must-succeed
    /// failures are returned; retried effects report `RevocationFailed` once
    /// every attempt has failed.
    pub async fn run<T, F, Fut>(&self, effect: SideEffect, mut op: F) -> Result<Option<T>, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        match effect.policy() {
            FailurePolicy::BestEffort => {
                match with_timeout(self.timeout, effect.name(), op()).await {
                    Ok(value) => Ok(Some(value)),
                    Err(e) => {
                        tracing::warn!(
                            effect = effect.name(),
                            error = %e,
                            "Best-effort side effect failed, continuing"
                        );
                        Ok(None)
                    }
                }
            }
            FailurePolicy::MustSucceed => with_timeout(self.timeout, effect.name(), op())
                .await
                .map(Some),
            FailurePolicy::MustSucceedWithRetry => {
                let mut backoff = RETRY_BACKOFF;
                let mut last_error = None;

                for attempt in 1..=REVOCATION_ATTEMPTS {
                    match with_timeout(self.timeout, effect.name(), op()).await {
                        Ok(value) => return Ok(Some(value)),
                        Err(e) => {
                            tracing::warn!(
                                effect = effect.name(),
                                attempt,
                                error = %e,
                                "Security-critical side effect failed"
                            );
                            last_error = Some(e);
                        }
                    }
                    if attempt < REVOCATION_ATTEMPTS {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }

                let detail = last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no attempt made".to_string());
                Err(AppError::RevocationFailed(format!(
                    "{} failed after {} attempts: {}",
                    effect.name(),
                    REVOCATION_ATTEMPTS,
                    detail
                )))
            }
        }
    }
}
