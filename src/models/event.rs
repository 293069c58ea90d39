//! Lifecycle events announced to downstream services.

use crate::models::user::User;
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAction {
    Created,
    Updated,
    Deleted,
}

impl UserAction {
    /// Topic routing key, e.g. `user.created`.
    pub fn routing_key(self) -> &'static str {
        match self {
            UserAction::Created => "user.created",
            UserAction::Updated => "user.updated",
            UserAction::Deleted => "user.deleted",
        }
    }
}

/// Event payload published on the `user_events` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    /// RFC3339 UTC timestamp
    pub timestamp: String,
    pub action: UserAction,
}

impl UserEvent {
    pub fn for_user(user: &User, action: UserAction, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
            timestamp: format_utc_rfc3339(now),
            action,
        }
    }

    pub fn routing_key(&self) -> &'static str {
        self.action.routing_key()
    }
}
