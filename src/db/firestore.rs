// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides the identity collections:
//! - `users` (keyed by user id)
//! - `user_emails` (unique email index, keyed by encoded email)
//! - `identity_links` (keyed by encoded `provider:subject`)
//!
//! Unique keys are written with an `Exists(false)` precondition inside a
//! transaction, so a concurrent writer on another instance makes the commit
//! fail instead of producing a duplicate.

use crate::db::{collections, document_id, IdentityRepository};
use crate::error::AppError;
use crate::models::identity::link_key;
use crate::models::{IdentityLink, Provider, User};
use async_trait::async_trait;
use firestore::FirestoreWritePrecondition;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document in the `user_emails` index.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmailIndexEntry {
    user_id: Uuid,
    email: String,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // Emulator: unauthenticated connection, no local credential lookup.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client for tests. Every operation returns an error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Unique Index Lookups ──────────────────────────────────────

    async fn email_owner(&self, email: &str) -> Result<Option<Uuid>, AppError> {
        let entry: Option<EmailIndexEntry> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USER_EMAILS)
            .obj()
            .one(&document_id(email))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(entry.map(|e| e.user_id))
    }

    async fn link_exists(&self, key: &str) -> Result<bool, AppError> {
        let link: Option<IdentityLink> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::IDENTITY_LINKS)
            .obj()
            .one(&document_id(key))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(link.is_some())
    }

    /// Decide whether a failed write lost a uniqueness race or hit a real error.
    async fn classify_write_failure(
        &self,
        error: String,
        email: Option<(&str, Uuid)>,
        link: Option<&str>,
    ) -> AppError {
        if let Some((email, user_id)) = email {
            if let Ok(Some(owner)) = self.email_owner(email).await {
                if owner != user_id {
                    return AppError::Conflict(format!("email {} already registered", email));
                }
            }
        }
        if let Some(key) = link {
            if let Ok(true) = self.link_exists(key).await {
                return AppError::Conflict(format!("identity link {} exists", key));
            }
        }
        AppError::Database(error)
    }
}

#[async_trait]
impl IdentityRepository for FirestoreDb {
    async fn find_link(
        &self,
        provider: &Provider,
        subject_id: &str,
    ) -> Result<Option<IdentityLink>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::IDENTITY_LINKS)
            .obj()
            .one(&document_id(&link_key(provider, subject_id)))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(&user_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        match self.email_owner(email).await? {
            Some(user_id) => self.get_user(user_id).await,
            None => Ok(None),
        }
    }

    async fn update_user(&self, user: &User) -> Result<(), AppError> {
        let existing = self.get_user(user.id).await?.ok_or(AppError::UserNotFound)?;
        let client = self.get_client()?;

        if existing.email == user.email {
            let _: () = client
                .fluent()
                .update()
                .in_col(collections::USERS)
                .document_id(user.id.to_string())
                .object(user)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Ok(());
        }

        // Email change: move the index entry in the same transaction.
        if let Some(owner) = self.email_owner(&user.email).await? {
            if owner != user.id {
                return Err(AppError::Conflict(format!(
                    "email already belongs to user {}",
                    owner
                )));
            }
        }

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let entry = EmailIndexEntry {
            user_id: user.id,
            email: user.email.clone(),
        };

        client
            .fluent()
            .update()
            .in_col(collections::USER_EMAILS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(document_id(&user.email))
            .object(&entry)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add email index: {}", e)))?;

        client
            .fluent()
            .delete()
            .from(collections::USER_EMAILS)
            .document_id(document_id(&existing.email))
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add index deletion: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(user.id.to_string())
            .object(user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add user update: {}", e)))?;

        if let Err(e) = transaction.commit().await {
            return Err(self
                .classify_write_failure(
                    format!("Transaction commit failed: {}", e),
                    Some((&user.email, user.id)),
                    None,
                )
                .await);
        }

        tracing::info!(user_id = %user.id, "User email changed");
        Ok(())
    }

    async fn save_link(&self, link: &IdentityLink) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::IDENTITY_LINKS)
            .document_id(document_id(&link.key()))
            .object(link)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn insert_link(&self, link: &IdentityLink) -> Result<(), AppError> {
        let key = link.key();
        if self.link_exists(&key).await? {
            return Err(AppError::Conflict(format!("identity link {} exists", key)));
        }

        let result: Result<(), _> = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::IDENTITY_LINKS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(document_id(&key))
            .object(link)
            .execute()
            .await;

        if let Err(e) = result {
            return Err(self
                .classify_write_failure(e.to_string(), None, Some(&key))
                .await);
        }
        Ok(())
    }

    async fn create_user_with_link(
        &self,
        user: &User,
        link: &IdentityLink,
    ) -> Result<(), AppError> {
        let key = link.key();

        // Cheap pre-checks; the preconditions below are what actually guard the race.
        if self.email_owner(&user.email).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "email {} already registered",
                user.email
            )));
        }
        if self.link_exists(&key).await? {
            return Err(AppError::Conflict(format!("identity link {} exists", key)));
        }

        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(user.id.to_string())
            .object(user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add user to transaction: {}", e)))?;

        let entry = EmailIndexEntry {
            user_id: user.id,
            email: user.email.clone(),
        };
        client
            .fluent()
            .update()
            .in_col(collections::USER_EMAILS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(document_id(&user.email))
            .object(&entry)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add email index: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::IDENTITY_LINKS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(document_id(&key))
            .object(link)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add link to transaction: {}", e)))?;

        if let Err(e) = transaction.commit().await {
            return Err(self
                .classify_write_failure(
                    format!("Transaction commit failed: {}", e),
                    Some((&user.email, user.id)),
                    Some(&key),
                )
                .await);
        }

        tracing::info!(user_id = %user.id, provider = %link.provider, "User created atomically");
        Ok(())
    }
}
