//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use uuid::Uuid;

/// Deduplicated local account stored in the `users` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier (also used as document ID)
    pub id: Uuid,
    /// Normalized email address, unique across users
    pub email: String,
    /// Display name
    pub name: String,
    /// Profile picture URL
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields an assertion may carry for an existing user.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate<'a> {
    pub email: Option<&'a str>,
    pub name: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
}

impl User {
    /// Build a brand-new user. An empty name falls back to the email local part.
    pub fn new(email: &str, name: Option<&str>, avatar_url: Option<&str>, now: DateTime<Utc>) -> Self {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .map(|n| n.trim().to_string())
            .unwrap_or_else(|| email_local_part(email).to_string());

        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name,
            avatar_url: avatar_url
                .filter(|a| !a.trim().is_empty())
                .map(|a| a.trim().to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply non-empty profile values that differ from the stored ones.
    ///
    /// Absent or blank values never clear a stored field. Returns whether
    /// anything changed.
    pub fn apply_profile(&mut self, update: &ProfileUpdate<'_>, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        if let Some(email) = non_empty(update.email) {
            if self.email != email {
                self.email = email.to_string();
                changed = true;
            }
        }
        if let Some(name) = non_empty(update.name) {
            if self.name != name {
                self.name = name.to_string();
                changed = true;
            }
        }
        if let Some(avatar) = non_empty(update.avatar_url) {
            if self.avatar_url.as_deref() != Some(avatar) {
                self.avatar_url = Some(avatar.to_string());
                changed = true;
            }
        }

        if changed {
            self.updated_at = now;
        }
        changed
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary::from(self)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// The part of an email address before `@`.
pub fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Public view of a user returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "bindings/")
)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}
