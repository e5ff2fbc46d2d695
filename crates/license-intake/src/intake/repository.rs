use async_trait::async_trait;

use super::domain::{RecordId, StatusHistoryEntry, Submission, SubmissionId, SubmissionStats};
use super::query::SubmissionQuery;

/// One page of submissions plus the size of the filtered set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub submissions: Vec<Submission>,
    pub total: u64,
}

/// Storage abstraction for submissions so the lifecycle can be exercised in isolation.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Persist a new record. Fails with `Conflict` when the public id is taken.
    async fn insert(&self, submission: Submission) -> Result<Submission, RepositoryError>;

    async fn fetch(&self, id: RecordId) -> Result<Option<Submission>, RepositoryError>;

    async fn fetch_by_submission_id(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Option<Submission>, RepositoryError>;

    async fn submission_id_exists(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.fetch_by_submission_id(submission_id).await?.is_some())
    }

    /// Append a history entry and refresh the review fields in a single write.
    async fn append_status(
        &self,
        id: RecordId,
        entry: StatusHistoryEntry,
    ) -> Result<Submission, RepositoryError>;

    /// Remove a record, returning whether it existed.
    async fn delete(&self, id: RecordId) -> Result<bool, RepositoryError>;

    async fn search(&self, query: &SubmissionQuery) -> Result<SearchResult, RepositoryError>;

    async fn status_counts(&self) -> Result<SubmissionStats, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
