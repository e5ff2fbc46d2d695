//! Learner's license submission intake and review.
//!
//! A submission is created once its personal details and all three documents
//! pass validation. After that it only changes through status transitions,
//! each of which appends to an audit trail whose last entry always matches the
//! current status.

pub mod documents;
pub mod domain;
pub mod notifications;
pub mod query;
pub mod repository;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use documents::{
    validate_uploads, DocumentStore, DocumentUpload, DocumentUploads, StorageError,
    ValidatedUpload, ValidatedUploads, MAX_DOCUMENT_BYTES,
};
pub use domain::{
    Address, DocumentSlot, PersonalDetails, RecordId, StatusCheckView, StatusHistoryEntry,
    StoredDocument, Submission, SubmissionDocuments, SubmissionId, SubmissionReceipt,
    SubmissionStats, SubmissionStatus, SubmissionSummary,
};
pub use notifications::{
    dispatch_best_effort, DispatchOutcome, EmailMessage, EmailNotifier, Mailer,
    NotificationDispatcher, NotificationError,
};
pub use query::{
    Pagination, SortField, SortOrder, SubmissionPage, SubmissionQuery, SubmissionQueryParams,
};
pub use repository::{RepositoryError, SearchResult, SubmissionRepository};
pub use router::{review_router, submission_router};
pub use service::{IntakeError, IntakeSettings, SubmissionService};
pub use validation::{FieldError, SubmissionForm, ValidationErrors};
