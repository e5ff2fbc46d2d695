use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;

use crate::access::{AdminId, AdminRole, AdminSession};
use crate::adapters::{InMemoryDocumentStore, InMemorySubmissionRepository, OutboxMailer};
use crate::intake::{
    DocumentSlot, DocumentStore, DocumentUpload, DocumentUploads, EmailNotifier, IntakeSettings,
    NotificationDispatcher, NotificationError, RecordId, RepositoryError, SearchResult,
    StatusHistoryEntry, StorageError, StoredDocument, Submission, SubmissionForm, SubmissionId,
    SubmissionQuery, SubmissionRepository, SubmissionService, SubmissionStats, SubmissionStatus,
    ValidatedUpload,
};

pub(super) const ADMIN_INBOX: &str = "admin@learnerlicense.com";

pub(super) fn form() -> SubmissionForm {
    let mut form = SubmissionForm::default();
    for (name, value) in form_fields() {
        form.set(name, value.to_string());
    }
    form
}

pub(super) fn form_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("fullName", "Jane Doe"),
        ("phoneNumber", "9876543210"),
        ("email", "Jane@Example.com"),
        ("dateOfBirth", "1995-06-15"),
        ("address[street]", "12 MG Road, Indiranagar"),
        ("address[city]", "Bengaluru"),
        ("address[state]", "Karnataka"),
        ("address[pincode]", "560038"),
    ]
}

pub(super) fn upload(name: &str, content_type: &str, size: usize) -> DocumentUpload {
    DocumentUpload::new(name, Some(content_type.to_string()), vec![1u8; size])
}

pub(super) fn uploads() -> DocumentUploads {
    DocumentUploads::default()
        .with(
            DocumentSlot::IdentityProof,
            upload("aadhaar.pdf", "application/pdf", 2048),
        )
        .with(
            DocumentSlot::Photograph,
            upload("photo.jpg", "image/jpeg", 1024),
        )
        .with(
            DocumentSlot::Signature,
            upload("signature.png", "image/png", 512),
        )
}

pub(super) fn session(username: &str, role: AdminRole) -> AdminSession {
    AdminSession {
        admin_id: AdminId::generate(),
        username: username.to_string(),
        role,
    }
}

pub(super) fn fast_settings() -> IntakeSettings {
    IntakeSettings {
        storage_timeout: Duration::from_millis(500),
        notification_timeout: Duration::from_millis(50),
        id_attempts: 5,
    }
}

/// Service wired to in-memory doubles that tests can inspect afterwards.
pub(super) struct Harness {
    pub(super) service: Arc<SubmissionService>,
    pub(super) repository: InMemorySubmissionRepository,
    pub(super) documents: InMemoryDocumentStore,
    pub(super) outbox: OutboxMailer,
}

pub(super) fn harness() -> Harness {
    let repository = InMemorySubmissionRepository::default();
    let documents = InMemoryDocumentStore::default();
    let outbox = OutboxMailer::default();
    let notifier = EmailNotifier::new(outbox.clone(), ADMIN_INBOX);
    let service = Arc::new(SubmissionService::new(
        Arc::new(repository.clone()),
        Arc::new(documents.clone()),
        Arc::new(notifier),
        fast_settings(),
    ));
    Harness {
        service,
        repository,
        documents,
        outbox,
    }
}

pub(super) fn service_with(
    repository: Arc<dyn SubmissionRepository>,
    documents: Arc<dyn DocumentStore>,
    notifier: Arc<dyn NotificationDispatcher>,
) -> SubmissionService {
    SubmissionService::new(repository, documents, notifier, fast_settings())
}

pub(super) async fn create_jane(harness: &Harness) -> Submission {
    harness
        .service
        .create(form(), uploads())
        .await
        .expect("submission created")
}

/// Store that refuses one slot while delegating the rest.
pub(super) struct FailingSlotStore {
    pub(super) inner: InMemoryDocumentStore,
    pub(super) failing: DocumentSlot,
}

#[async_trait]
impl DocumentStore for FailingSlotStore {
    async fn store(
        &self,
        upload: &ValidatedUpload,
        submission_id: &SubmissionId,
    ) -> Result<StoredDocument, StorageError> {
        if upload.slot == self.failing {
            return Err(StorageError::Backend("upload rejected".to_string()));
        }
        self.inner.store(upload, submission_id).await
    }

    async fn delete(&self, storage_key: &str) -> Result<(), StorageError> {
        self.inner.delete(storage_key).await
    }
}

/// Store whose uploads never finish.
pub(super) struct StalledStore;

#[async_trait]
impl DocumentStore for StalledStore {
    async fn store(
        &self,
        _upload: &ValidatedUpload,
        _submission_id: &SubmissionId,
    ) -> Result<StoredDocument, StorageError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(StorageError::Backend("unreachable".to_string()))
    }

    async fn delete(&self, _storage_key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Repository that accepts reads but fails every insert.
#[derive(Default)]
pub(super) struct InsertFailingRepository {
    pub(super) inner: InMemorySubmissionRepository,
}

#[async_trait]
impl SubmissionRepository for InsertFailingRepository {
    async fn insert(&self, _submission: Submission) -> Result<Submission, RepositoryError> {
        Err(RepositoryError::Unavailable("primary down".to_string()))
    }

    async fn fetch(&self, id: RecordId) -> Result<Option<Submission>, RepositoryError> {
        self.inner.fetch(id).await
    }

    async fn fetch_by_submission_id(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Option<Submission>, RepositoryError> {
        self.inner.fetch_by_submission_id(submission_id).await
    }

    async fn append_status(
        &self,
        id: RecordId,
        entry: StatusHistoryEntry,
    ) -> Result<Submission, RepositoryError> {
        self.inner.append_status(id, entry).await
    }

    async fn delete(&self, id: RecordId) -> Result<bool, RepositoryError> {
        self.inner.delete(id).await
    }

    async fn search(&self, query: &SubmissionQuery) -> Result<SearchResult, RepositoryError> {
        self.inner.search(query).await
    }

    async fn status_counts(&self) -> Result<SubmissionStats, RepositoryError> {
        self.inner.status_counts().await
    }
}

/// Repository whose first `conflicts` inserts lose the race for their submission id.
pub(super) struct ContendedRepository {
    pub(super) inner: InMemorySubmissionRepository,
    conflicts: AtomicU32,
    pub(super) attempts: AtomicU32,
}

impl ContendedRepository {
    pub(super) fn new(conflicts: u32) -> Self {
        Self {
            inner: InMemorySubmissionRepository::default(),
            conflicts: AtomicU32::new(conflicts),
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SubmissionRepository for ContendedRepository {
    async fn insert(&self, submission: Submission) -> Result<Submission, RepositoryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let lost = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if lost {
            return Err(RepositoryError::Conflict);
        }
        self.inner.insert(submission).await
    }

    async fn fetch(&self, id: RecordId) -> Result<Option<Submission>, RepositoryError> {
        self.inner.fetch(id).await
    }

    async fn fetch_by_submission_id(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Option<Submission>, RepositoryError> {
        self.inner.fetch_by_submission_id(submission_id).await
    }

    async fn append_status(
        &self,
        id: RecordId,
        entry: StatusHistoryEntry,
    ) -> Result<Submission, RepositoryError> {
        self.inner.append_status(id, entry).await
    }

    async fn delete(&self, id: RecordId) -> Result<bool, RepositoryError> {
        self.inner.delete(id).await
    }

    async fn search(&self, query: &SubmissionQuery) -> Result<SearchResult, RepositoryError> {
        self.inner.search(query).await
    }

    async fn status_counts(&self) -> Result<SubmissionStats, RepositoryError> {
        self.inner.status_counts().await
    }
}

pub(super) struct UnavailableRepository;

#[async_trait]
impl SubmissionRepository for UnavailableRepository {
    async fn insert(&self, _submission: Submission) -> Result<Submission, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    async fn fetch(&self, _id: RecordId) -> Result<Option<Submission>, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    async fn fetch_by_submission_id(
        &self,
        _submission_id: &SubmissionId,
    ) -> Result<Option<Submission>, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    async fn append_status(
        &self,
        _id: RecordId,
        _entry: StatusHistoryEntry,
    ) -> Result<Submission, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    async fn delete(&self, _id: RecordId) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    async fn search(&self, _query: &SubmissionQuery) -> Result<SearchResult, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    async fn status_counts(&self) -> Result<SubmissionStats, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }
}

/// Dispatcher whose every call fails or hangs, depending on `hang`.
pub(super) struct BrokenNotifier {
    pub(super) hang: bool,
}

impl BrokenNotifier {
    async fn fail(&self) -> Result<(), NotificationError> {
        if self.hang {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Err(NotificationError::Transport("smtp relay refused".to_string()))
    }
}

#[async_trait]
impl NotificationDispatcher for BrokenNotifier {
    async fn notify_admin_of_new_submission(
        &self,
        _submission: &Submission,
    ) -> Result<(), NotificationError> {
        self.fail().await
    }

    async fn notify_applicant_of_submission(
        &self,
        _submission: &Submission,
    ) -> Result<(), NotificationError> {
        self.fail().await
    }

    async fn notify_applicant_of_status_change(
        &self,
        _submission: &Submission,
        _status: SubmissionStatus,
        _notes: Option<&str>,
    ) -> Result<(), NotificationError> {
        self.fail().await
    }
}

pub(super) const BOUNDARY: &str = "license-intake-test-boundary";

pub(super) struct FilePart {
    pub(super) name: &'static str,
    pub(super) file_name: &'static str,
    pub(super) content_type: &'static str,
    pub(super) size: usize,
}

pub(super) fn standard_files() -> Vec<FilePart> {
    vec![
        FilePart {
            name: "aadhaar",
            file_name: "aadhaar.pdf",
            content_type: "application/pdf",
            size: 2048,
        },
        FilePart {
            name: "photograph",
            file_name: "photo.jpg",
            content_type: "image/jpeg",
            size: 1024,
        },
        FilePart {
            name: "signature",
            file_name: "signature.png",
            content_type: "image/png",
            size: 512,
        },
    ]
}

pub(super) fn multipart_body(fields: &[(&str, &str)], files: &[FilePart]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for file in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                file.name, file.file_name, file.content_type
            )
            .as_bytes(),
        );
        body.extend(std::iter::repeat(7u8).take(file.size));
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}
