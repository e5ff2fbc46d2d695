use async_trait::async_trait;

use crate::intake::RepositoryError;

use super::domain::{Admin, AdminId};

/// Storage abstraction for admin accounts.
#[async_trait]
pub trait AdminRepository: Send + Sync {
    /// Persist a new admin. Fails with `Conflict` when the username or email is taken.
    async fn insert(&self, admin: Admin) -> Result<Admin, RepositoryError>;

    /// Replace an existing admin, enforcing the same uniqueness rules as `insert`.
    async fn update(&self, admin: Admin) -> Result<Admin, RepositoryError>;

    async fn fetch(&self, id: AdminId) -> Result<Option<Admin>, RepositoryError>;

    async fn fetch_by_username(&self, username: &str) -> Result<Option<Admin>, RepositoryError>;

    /// Case-insensitive lookup; emails are stored lowercased.
    async fn fetch_by_email(&self, email: &str) -> Result<Option<Admin>, RepositoryError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|admin| admin.email.eq_ignore_ascii_case(email)))
    }

    /// All admins, newest first.
    async fn list(&self) -> Result<Vec<Admin>, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.list().await?.len() as u64)
    }
}
