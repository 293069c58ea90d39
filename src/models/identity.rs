// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! External identity assertions and the links that bind them to users.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// External identity provider tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Provider {
    Github,
    Google,
    /// Microsoft identity platform (MSAL / Graph)
    Msal,
    /// Any other provider, stored as its lowercase tag
    Other(String),
}

impl Provider {
    pub fn as_str(&self) -> &str {
        match self {
            Provider::Github => "github",
            Provider::Google => "google",
            Provider::Msal => "msal",
            Provider::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        match tag.as_str() {
            "" => Err(AppError::InvalidAssertion("provider is required".to_string())),
            "github" => Ok(Provider::Github),
            "google" => Ok(Provider::Google),
            "msal" | "microsoft" => Ok(Provider::Msal),
            _ if tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') =>
            {
                Ok(Provider::Other(tag))
            }
            _ => Err(AppError::InvalidAssertion(format!(
                "unsupported provider tag: {}",
                s.trim()
            ))),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Provider> for String {
    fn from(provider: Provider) -> Self {
        provider.as_str().to_string()
    }
}

/// Unique key of an external account: `provider:subject`.
pub fn link_key(provider: &Provider, subject: &str) -> String {
    format!("{}:{}", provider, subject)
}

/// Binding of one external provider account to one local user.
///
/// Holds the owning user's id only; the user is loaded separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityLink {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: Provider,
    pub provider_subject_id: String,
    /// Provider-issued tokens, cached for provider API calls (never for local auth)
    pub provider_access_token: Option<String>,
    pub provider_refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdentityLink {
    pub fn new(user_id: Uuid, assertion: &ValidatedAssertion, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            provider: assertion.provider.clone(),
            provider_subject_id: assertion.provider_subject_id.clone(),
            provider_access_token: assertion.provider_access_token.clone(),
            provider_refresh_token: assertion.provider_refresh_token.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> String {
        link_key(&self.provider, &self.provider_subject_id)
    }

    /// Overwrite cached provider tokens with whatever the latest login carried.
    pub fn refresh_provider_tokens(&mut self, assertion: &ValidatedAssertion, now: DateTime<Utc>) {
        self.provider_access_token = assertion.provider_access_token.clone();
        self.provider_refresh_token = assertion.provider_refresh_token.clone();
        self.updated_at = now;
    }
}

/// Inbound claim from a provider collaborator, as received on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ExternalIdentityAssertion {
    #[validate(length(min = 1, max = 64, message = "provider is required"))]
    pub provider: String,
    #[serde(alias = "provider_user_id")]
    #[validate(length(min = 1, max = 255, message = "provider_subject_id is required"))]
    pub provider_subject_id: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 2048))]
    pub avatar_url: Option<String>,
    #[serde(default, alias = "access_token")]
    pub provider_access_token: Option<String>,
    #[serde(default, alias = "refresh_token")]
    pub provider_refresh_token: Option<String>,
}

/// Assertion that passed validation; the only input the resolver accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAssertion {
    pub provider: Provider,
    pub provider_subject_id: String,
    /// Trimmed, lowercased email
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub provider_access_token: Option<String>,
    pub provider_refresh_token: Option<String>,
}

impl ValidatedAssertion {
    pub fn link_key(&self) -> String {
        link_key(&self.provider, &self.provider_subject_id)
    }
}

/// Canonical form of an email used as the dedup key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn trimmed_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ExternalIdentityAssertion {
    /// Normalize and validate the assertion.
    ///
    /// Missing provider, subject or email is rejected here, before any lookup.
    pub fn into_validated(self) -> Result<ValidatedAssertion, AppError> {
        let normalized = ExternalIdentityAssertion {
            provider: self.provider.trim().to_string(),
            provider_subject_id: self.provider_subject_id.trim().to_string(),
            email: normalize_email(&self.email),
            name: trimmed_opt(self.name),
            avatar_url: trimmed_opt(self.avatar_url),
            provider_access_token: trimmed_opt(self.provider_access_token),
            provider_refresh_token: trimmed_opt(self.provider_refresh_token),
        };

        if normalized.provider_subject_id.is_empty() {
            return Err(AppError::InvalidAssertion(
                "provider_subject_id is required".to_string(),
            ));
        }
        if normalized.email.is_empty() {
            return Err(AppError::InvalidAssertion("email is required".to_string()));
        }

        normalized
            .validate()
            .map_err(|e| AppError::InvalidAssertion(e.to_string()))?;

        Ok(ValidatedAssertion {
            provider: normalized.provider.parse()?,
            provider_subject_id: normalized.provider_subject_id,
            email: normalized.email,
            name: normalized.name,
            avatar_url: normalized.avatar_url,
            provider_access_token: normalized.provider_access_token,
            provider_refresh_token: normalized.provider_refresh_token,
        })
    }
}
