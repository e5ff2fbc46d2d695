use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::access::{Admin, AdminId, AdminRepository};
use crate::intake::documents::storage_key;
use crate::intake::{
    DocumentStore, EmailMessage, Mailer, NotificationError, RecordId, RepositoryError,
    SearchResult, StatusHistoryEntry, StorageError, StoredDocument, Submission, SubmissionId,
    SubmissionQuery, SubmissionRepository, SubmissionStats, ValidatedUpload,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store lock poisoned".to_string()))
}

/// Submission store backed by a mutex-guarded map.
#[derive(Default, Clone)]
pub struct InMemorySubmissionRepository {
    records: Arc<Mutex<HashMap<RecordId, Submission>>>,
}

impl InMemorySubmissionRepository {
    pub fn len(&self) -> usize {
        self.records.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SubmissionRepository for InMemorySubmissionRepository {
    async fn insert(&self, submission: Submission) -> Result<Submission, RepositoryError> {
        let mut guard = lock(&self.records)?;
        let duplicate = guard.contains_key(&submission.id)
            || guard
                .values()
                .any(|existing| existing.submission_id == submission.submission_id);
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn fetch(&self, id: RecordId) -> Result<Option<Submission>, RepositoryError> {
        Ok(lock(&self.records)?.get(&id).cloned())
    }

    async fn fetch_by_submission_id(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Option<Submission>, RepositoryError> {
        Ok(lock(&self.records)?
            .values()
            .find(|submission| &submission.submission_id == submission_id)
            .cloned())
    }

    async fn append_status(
        &self,
        id: RecordId,
        entry: StatusHistoryEntry,
    ) -> Result<Submission, RepositoryError> {
        let mut guard = lock(&self.records)?;
        let submission = guard.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        submission.apply_transition(entry);
        Ok(submission.clone())
    }

    async fn delete(&self, id: RecordId) -> Result<bool, RepositoryError> {
        Ok(lock(&self.records)?.remove(&id).is_some())
    }

    async fn search(&self, query: &SubmissionQuery) -> Result<SearchResult, RepositoryError> {
        let snapshot: Vec<Submission> = lock(&self.records)?.values().cloned().collect();
        let (submissions, total) = query.apply(snapshot);
        Ok(SearchResult { submissions, total })
    }

    async fn status_counts(&self) -> Result<SubmissionStats, RepositoryError> {
        Ok(SubmissionStats::tally(
            lock(&self.records)?.values().map(Submission::status),
        ))
    }
}

/// Admin store enforcing unique usernames and emails.
#[derive(Default, Clone)]
pub struct InMemoryAdminRepository {
    admins: Arc<Mutex<HashMap<AdminId, Admin>>>,
}

fn clashes(existing: &Admin, candidate: &Admin) -> bool {
    existing.id != candidate.id
        && (existing.username == candidate.username
            || existing.email.eq_ignore_ascii_case(&candidate.email))
}

#[async_trait]
impl AdminRepository for InMemoryAdminRepository {
    async fn insert(&self, admin: Admin) -> Result<Admin, RepositoryError> {
        let mut guard = lock(&self.admins)?;
        if guard.contains_key(&admin.id) || guard.values().any(|existing| clashes(existing, &admin))
        {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(admin.id, admin.clone());
        Ok(admin)
    }

    async fn update(&self, admin: Admin) -> Result<Admin, RepositoryError> {
        let mut guard = lock(&self.admins)?;
        if !guard.contains_key(&admin.id) {
            return Err(RepositoryError::NotFound);
        }
        if guard.values().any(|existing| clashes(existing, &admin)) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(admin.id, admin.clone());
        Ok(admin)
    }

    async fn fetch(&self, id: AdminId) -> Result<Option<Admin>, RepositoryError> {
        Ok(lock(&self.admins)?.get(&id).cloned())
    }

    async fn fetch_by_username(&self, username: &str) -> Result<Option<Admin>, RepositoryError> {
        Ok(lock(&self.admins)?
            .values()
            .find(|admin| admin.username == username)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Admin>, RepositoryError> {
        let mut admins: Vec<Admin> = lock(&self.admins)?.values().cloned().collect();
        admins.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(admins)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(lock(&self.admins)?.len() as u64)
    }
}

/// Document store that keeps bytes in memory and hands out `memory://` URLs.
#[derive(Default, Clone)]
pub struct InMemoryDocumentStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryDocumentStore {
    pub fn contains(&self, storage_key: &str) -> bool {
        self.objects
            .lock()
            .map(|guard| guard.contains_key(storage_key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StorageError {
    StorageError::Backend("in-memory document store lock poisoned".to_string())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn store(
        &self,
        upload: &ValidatedUpload,
        submission_id: &SubmissionId,
    ) -> Result<StoredDocument, StorageError> {
        let uploaded_at = Utc::now();
        let key = storage_key(
            submission_id,
            upload.slot,
            &upload.original_name,
            uploaded_at,
        );
        self.objects
            .lock()
            .map_err(|_| poisoned())?
            .insert(key.clone(), upload.bytes.to_vec());

        Ok(StoredDocument {
            url: format!("memory://{key}"),
            storage_key: key,
            original_name: upload.original_name.clone(),
            size: upload.size(),
            mime_type: upload.mime_type.clone(),
            uploaded_at,
        })
    }

    async fn delete(&self, storage_key: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .map_err(|_| poisoned())?
            .remove(storage_key);
        Ok(())
    }
}

/// Mailer that records messages instead of sending them.
#[derive(Default, Clone)]
pub struct OutboxMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl OutboxMailer {
    pub fn messages(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .map_err(|_| NotificationError::Transport("outbox lock poisoned".to_string()))?
            .push(message);
        Ok(())
    }
}
