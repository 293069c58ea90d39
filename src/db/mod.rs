//! Identity storage layer.
//!
//! Users and identity links live in separate collections keyed by id; a link
//! refers to its user by id only. The email index enforces one user per email.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryRepository;

use crate::error::AppError;
use crate::models::{IdentityLink, Provider, User};
use async_trait::async_trait;
use uuid::Uuid;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Unique email index (keyed by url-encoded normalized email)
    pub const USER_EMAILS: &str = "user_emails";
    /// Identity links (keyed by url-encoded `provider:subject`)
    pub const IDENTITY_LINKS: &str = "identity_links";
}

/// Persistence boundary used by the identity resolver.
///
/// Implementations enforce the unique constraints (email, link key) and report
/// a violation as `AppError::Conflict` so the resolver can retry.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_link(
        &self,
        provider: &Provider,
        subject_id: &str,
    ) -> Result<Option<IdentityLink>, AppError>;

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Persist profile changes. Moving to an email owned by another user is a `Conflict`.
    async fn update_user(&self, user: &User) -> Result<(), AppError>;

    /// Overwrite an existing link (provider tokens, timestamps).
    async fn save_link(&self, link: &IdentityLink) -> Result<(), AppError>;

    /// Attach a new link to an existing user. `Conflict` if the key is taken.
    async fn insert_link(&self, link: &IdentityLink) -> Result<(), AppError>;

    /// Create a user and its first link in one atomic write.
    async fn create_user_with_link(&self, user: &User, link: &IdentityLink)
        -> Result<(), AppError>;
}

/// Firestore document id for a unique key (`/` is not allowed in ids).
pub(crate) fn document_id(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_escapes_separators() {
        assert_eq!(document_id("github:42"), "github%3A42");
        assert_eq!(document_id("a/b@x.com"), "a%2Fb%40x.com");
    }
}
