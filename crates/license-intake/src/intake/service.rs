use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::access::AdminSession;

use super::documents::{
    validate_uploads, DocumentStore, DocumentUploads, StorageError, ValidatedUpload,
    ValidatedUploads,
};
use super::domain::{
    RecordId, StatusCheckView, StatusHistoryEntry, StoredDocument, Submission,
    SubmissionDocuments, SubmissionId, SubmissionStats, SubmissionStatus,
};
use super::notifications::{dispatch_best_effort, NotificationDispatcher};
use super::query::{Pagination, SubmissionPage, SubmissionQuery};
use super::repository::{RepositoryError, SubmissionRepository};
use super::validation::{normalize_notes, validate_personal_details, SubmissionForm, ValidationErrors};

const SUBMISSION_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUBMISSION_ID_SUFFIX_LEN: usize = 6;

/// Timeouts and retry bounds for the intake flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakeSettings {
    pub storage_timeout: Duration,
    pub notification_timeout: Duration,
    pub id_attempts: u32,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(20),
            notification_timeout: Duration::from_secs(10),
            id_attempts: 5,
        }
    }
}

/// Generate a public id of the form `LL-YYYYMMDD-XXXXXX`.
pub fn generate_submission_id(at: DateTime<Utc>) -> SubmissionId {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUBMISSION_ID_SUFFIX_LEN)
        .map(|_| {
            let index = rng.gen_range(0..SUBMISSION_ID_ALPHABET.len());
            char::from(SUBMISSION_ID_ALPHABET[index])
        })
        .collect();
    SubmissionId(format!("LL-{}-{suffix}", at.format("%Y%m%d")))
}

/// Owns the submission lifecycle: intake, review transitions, queries, and removal.
pub struct SubmissionService {
    repository: Arc<dyn SubmissionRepository>,
    documents: Arc<dyn DocumentStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    settings: IntakeSettings,
}

impl SubmissionService {
    pub fn new(
        repository: Arc<dyn SubmissionRepository>,
        documents: Arc<dyn DocumentStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        settings: IntakeSettings,
    ) -> Self {
        Self {
            repository,
            documents,
            notifier,
            settings,
        }
    }

    /// Validate, store the three documents, persist, then notify staff and applicant.
    pub async fn create(
        &self,
        form: SubmissionForm,
        uploads: DocumentUploads,
    ) -> Result<Submission, IntakeError> {
        let now = Utc::now();
        let (personal, validated) = match (
            validate_personal_details(&form, now.date_naive()),
            validate_uploads(&uploads),
        ) {
            (Ok(personal), Ok(validated)) => (personal, validated),
            (personal, validated) => {
                let mut errors = ValidationErrors::default();
                if let Err(field_errors) = personal {
                    errors.extend(field_errors);
                }
                if let Err(file_errors) = validated {
                    errors.extend(file_errors);
                }
                return Err(IntakeError::Validation(errors));
            }
        };

        let attempts = self.settings.id_attempts.max(1);
        let mut attempt = 0;
        let stored = loop {
            attempt += 1;
            let submission_id = self.allocate_submission_id(now).await?;
            let documents = self.store_documents(&validated, &submission_id).await?;
            let storage_keys = documents.storage_keys();

            let submission = Submission::new(
                RecordId::generate(),
                submission_id,
                personal.clone(),
                documents,
                now,
            );

            match self.repository.insert(submission).await {
                Ok(stored) => break stored,
                Err(RepositoryError::Conflict) if attempt < attempts => {
                    // Another request claimed the id between the existence check and the insert.
                    warn!(attempt, "submission id taken at insert; retrying with a new id");
                    self.discard_documents(storage_keys).await;
                }
                Err(RepositoryError::Conflict) => {
                    self.discard_documents(storage_keys).await;
                    return Err(IntakeError::Internal(
                        "could not allocate a unique submission id".to_string(),
                    ));
                }
                Err(error) => {
                    self.discard_documents(storage_keys).await;
                    return Err(error.into());
                }
            }
        };

        info!(
            submission_id = %stored.submission_id,
            record_id = %stored.id,
            "submission received"
        );

        let timeout = self.settings.notification_timeout;
        let _ = tokio::join!(
            dispatch_best_effort(
                "admin_new_submission",
                &stored.submission_id,
                timeout,
                self.notifier.notify_admin_of_new_submission(&stored),
            ),
            dispatch_best_effort(
                "applicant_confirmation",
                &stored.submission_id,
                timeout,
                self.notifier.notify_applicant_of_submission(&stored),
            ),
        );

        Ok(stored)
    }

    /// Move a submission to `status`, appending one audit entry.
    ///
    /// `key` may be the record id or the public submission id.
    pub async fn transition_status(
        &self,
        key: &str,
        status: &str,
        actor: &str,
        notes: Option<String>,
    ) -> Result<Submission, IntakeError> {
        let mut errors = ValidationErrors::default();
        let status = match status.parse::<SubmissionStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                errors.push("status", "Status must be pending, approved, or rejected");
                None
            }
        };
        let notes = match normalize_notes("internalNotes", notes) {
            Ok(notes) => notes,
            Err(note_errors) => {
                errors.extend(note_errors);
                None
            }
        };
        let Some(status) = status.filter(|_| errors.is_empty()) else {
            return Err(IntakeError::Validation(errors));
        };

        let current = self.resolve(key).await?;
        let entry = StatusHistoryEntry {
            status,
            changed_at: Utc::now(),
            changed_by: Some(actor.to_string()),
            notes: notes.clone(),
        };

        let updated = match self.repository.append_status(current.id, entry).await {
            Ok(updated) => updated,
            Err(RepositoryError::NotFound) => return Err(IntakeError::NotFound),
            Err(other) => return Err(other.into()),
        };

        info!(
            submission_id = %updated.submission_id,
            status = %status,
            reviewed_by = actor,
            "submission status changed"
        );

        dispatch_best_effort(
            "applicant_status_update",
            &updated.submission_id,
            self.settings.notification_timeout,
            self.notifier
                .notify_applicant_of_status_change(&updated, status, notes.as_deref()),
        )
        .await;

        Ok(updated)
    }

    /// Remove a submission and its documents. Restricted to super admins.
    pub async fn delete(&self, id: RecordId, session: &AdminSession) -> Result<(), IntakeError> {
        if !session.role.can_delete_submissions() {
            return Err(IntakeError::Forbidden(
                "only super admins can delete submissions".to_string(),
            ));
        }

        let submission = self.repository.fetch(id).await?.ok_or(IntakeError::NotFound)?;
        self.discard_documents(submission.documents.storage_keys())
            .await;

        if !self.repository.delete(id).await? {
            return Err(IntakeError::NotFound);
        }

        info!(
            submission_id = %submission.submission_id,
            deleted_by = %session.username,
            "submission deleted"
        );
        Ok(())
    }

    pub async fn query(&self, query: &SubmissionQuery) -> Result<SubmissionPage, IntakeError> {
        let result = self.repository.search(query).await?;
        Ok(SubmissionPage {
            submissions: result.submissions.iter().map(Submission::summary).collect(),
            pagination: Pagination::new(query.page, query.limit, result.total),
        })
    }

    pub async fn stats(&self) -> Result<SubmissionStats, IntakeError> {
        Ok(self.repository.status_counts().await?)
    }

    pub async fn get(&self, id: RecordId) -> Result<Submission, IntakeError> {
        self.repository.fetch(id).await?.ok_or(IntakeError::NotFound)
    }

    /// Public status lookup; never exposes documents or internal notes.
    pub async fn status_check(&self, submission_id: &str) -> Result<StatusCheckView, IntakeError> {
        let submission_id = SubmissionId(submission_id.trim().to_string());
        self.repository
            .fetch_by_submission_id(&submission_id)
            .await?
            .map(|submission| submission.status_view())
            .ok_or(IntakeError::NotFound)
    }

    /// Most recent submissions by submission time.
    pub async fn recent(&self, limit: u32) -> Result<SubmissionPage, IntakeError> {
        let query = SubmissionQuery {
            limit,
            ..SubmissionQuery::default()
        };
        self.query(&query).await
    }

    async fn resolve(&self, key: &str) -> Result<Submission, IntakeError> {
        let found = match key.parse::<RecordId>() {
            Ok(id) => self.repository.fetch(id).await?,
            Err(_) => {
                self.repository
                    .fetch_by_submission_id(&SubmissionId(key.trim().to_string()))
                    .await?
            }
        };
        found.ok_or(IntakeError::NotFound)
    }

    async fn allocate_submission_id(&self, at: DateTime<Utc>) -> Result<SubmissionId, IntakeError> {
        for _ in 0..self.settings.id_attempts.max(1) {
            let candidate = generate_submission_id(at);
            if !self.repository.submission_id_exists(&candidate).await? {
                return Ok(candidate);
            }
            warn!(submission_id = %candidate, "generated submission id already taken");
        }
        Err(IntakeError::Internal(
            "could not allocate a unique submission id".to_string(),
        ))
    }

    async fn store_one(
        &self,
        upload: &ValidatedUpload,
        submission_id: &SubmissionId,
    ) -> Result<StoredDocument, StorageError> {
        let timeout = self.settings.storage_timeout;
        let result = match tokio::time::timeout(timeout, self.documents.store(upload, submission_id))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(timeout)),
        };
        if let Err(error) = &result {
            warn!(
                %submission_id,
                slot = upload.slot.field_name(),
                %error,
                "document upload failed"
            );
        }
        result
    }

    async fn store_documents(
        &self,
        uploads: &ValidatedUploads,
        submission_id: &SubmissionId,
    ) -> Result<SubmissionDocuments, IntakeError> {
        let (identity_proof, photograph, signature) = tokio::join!(
            self.store_one(&uploads.identity_proof, submission_id),
            self.store_one(&uploads.photograph, submission_id),
            self.store_one(&uploads.signature, submission_id),
        );

        match (identity_proof, photograph, signature) {
            (Ok(identity_proof), Ok(photograph), Ok(signature)) => Ok(SubmissionDocuments {
                identity_proof,
                photograph,
                signature,
            }),
            (identity_proof, photograph, signature) => {
                let stored: Vec<String> = [&identity_proof, &photograph, &signature]
                    .into_iter()
                    .filter_map(|result| result.as_ref().ok())
                    .map(|document| document.storage_key.clone())
                    .collect();
                self.discard_documents(stored).await;

                let failure = identity_proof
                    .err()
                    .or(photograph.err())
                    .or(signature.err())
                    .unwrap_or_else(|| StorageError::Backend("document upload failed".to_string()));
                Err(IntakeError::Storage(failure))
            }
        }
    }

    /// Delete stored documents concurrently; failures are logged and ignored.
    async fn discard_documents(&self, storage_keys: Vec<String>) {
        let timeout = self.settings.storage_timeout;
        let mut pending = JoinSet::new();
        for key in storage_keys {
            let store = Arc::clone(&self.documents);
            pending.spawn(async move {
                let outcome = match tokio::time::timeout(timeout, store.delete(&key)).await {
                    Ok(result) => result,
                    Err(_) => Err(StorageError::Timeout(timeout)),
                };
                (key, outcome)
            });
        }

        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((key, Err(error))) => {
                    warn!(storage_key = %key, %error, "document cleanup failed");
                }
                Err(join_error) => {
                    warn!(%join_error, "document cleanup task aborted");
                }
            }
        }
    }
}

/// Error raised by the submission service.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("submission not found")]
    NotFound,
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        match self {
            IntakeError::Validation(errors) => {
                let payload = json!({
                    "error": "Validation failed",
                    "errors": errors.errors(),
                });
                (StatusCode::BAD_REQUEST, Json(payload)).into_response()
            }
            IntakeError::NotFound | IntakeError::Repository(RepositoryError::NotFound) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Submission not found" })),
            )
                .into_response(),
            IntakeError::Forbidden(message) => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": message }))).into_response()
            }
            IntakeError::Storage(storage) => {
                error!(%storage, "document storage failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "Failed to upload documents" })),
                )
                    .into_response()
            }
            other => {
                error!(error = %other, "submission request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
