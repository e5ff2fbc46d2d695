use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Note attached to the history entry synthesized when a submission is created.
pub const INITIAL_HISTORY_NOTE: &str = "Application submitted";

/// Storage-assigned primary key used by the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(raw.trim()).map(Self)
    }
}

/// Public identifier handed to applicants for status lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub String);

impl SubmissionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Review state of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 3] = [Self::Pending, Self::Approved, Self::Rejected];

    pub const fn label(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    /// Wording used in applicant-facing messages.
    pub const fn headline(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "Under Review",
            SubmissionStatus::Approved => "Approved",
            SubmissionStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("status must be one of pending, approved, rejected (found '{0}')")]
pub struct UnknownStatus(pub String);

impl FromStr for SubmissionStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(UnknownStatus(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

/// Applicant data after field validation and normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalDetails {
    pub full_name: String,
    pub phone_number: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
    pub address: Address,
}

/// The three document slots every application must fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentSlot {
    IdentityProof,
    Photograph,
    Signature,
}

const IDENTITY_PROOF_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];
const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png"];

impl DocumentSlot {
    pub const ALL: [DocumentSlot; 3] = [Self::IdentityProof, Self::Photograph, Self::Signature];

    pub const fn field_name(self) -> &'static str {
        match self {
            DocumentSlot::IdentityProof => "identityProof",
            DocumentSlot::Photograph => "photograph",
            DocumentSlot::Signature => "signature",
        }
    }

    /// Resolve a multipart part name, accepting the legacy `aadhaar` alias.
    pub fn from_field_name(name: &str) -> Option<Self> {
        match name.trim() {
            "identityProof" | "identity_proof" | "aadhaar" => Some(Self::IdentityProof),
            "photograph" => Some(Self::Photograph),
            "signature" => Some(Self::Signature),
            _ => None,
        }
    }

    pub const fn allowed_mime_types(self) -> &'static [&'static str] {
        match self {
            DocumentSlot::IdentityProof => IDENTITY_PROOF_TYPES,
            DocumentSlot::Photograph | DocumentSlot::Signature => IMAGE_TYPES,
        }
    }

    pub const fn allowed_label(self) -> &'static str {
        match self {
            DocumentSlot::IdentityProof => "PDF, JPEG, or PNG",
            DocumentSlot::Photograph | DocumentSlot::Signature => "JPEG or PNG",
        }
    }

    pub fn accepts(self, mime_type: &str) -> bool {
        self.allowed_mime_types().contains(&mime_type)
    }
}

/// Reference to a document held by the file stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub url: String,
    pub storage_key: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

impl StoredDocument {
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            url: self.url.clone(),
            original_name: self.original_name.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
            uploaded_at: self.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDocuments {
    pub identity_proof: StoredDocument,
    pub photograph: StoredDocument,
    pub signature: StoredDocument,
}

impl SubmissionDocuments {
    pub fn get(&self, slot: DocumentSlot) -> &StoredDocument {
        match slot {
            DocumentSlot::IdentityProof => &self.identity_proof,
            DocumentSlot::Photograph => &self.photograph,
            DocumentSlot::Signature => &self.signature,
        }
    }

    pub fn storage_keys(&self) -> Vec<String> {
        DocumentSlot::ALL
            .iter()
            .map(|slot| self.get(*slot).storage_key.clone())
            .collect()
    }
}

/// Document metadata exposed in list views; the storage key stays internal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub url: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummaries {
    pub identity_proof: DocumentSummary,
    pub photograph: DocumentSummary,
    pub signature: DocumentSummary,
}

/// One entry of the append-only audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub status: SubmissionStatus,
    pub changed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A learner's license application.
///
/// `status`, `reviewed_at`, `reviewed_by`, and `internal_notes` mirror the last
/// history entry and are only changed through [`Submission::apply_transition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: RecordId,
    pub submission_id: SubmissionId,
    #[serde(flatten)]
    pub personal: PersonalDetails,
    pub documents: SubmissionDocuments,
    status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    internal_notes: Option<String>,
    status_history: Vec<StatusHistoryEntry>,
}

impl Submission {
    pub fn new(
        id: RecordId,
        submission_id: SubmissionId,
        personal: PersonalDetails,
        documents: SubmissionDocuments,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            submission_id,
            personal,
            documents,
            status: SubmissionStatus::Pending,
            submitted_at,
            reviewed_at: None,
            reviewed_by: None,
            internal_notes: None,
            status_history: vec![StatusHistoryEntry {
                status: SubmissionStatus::Pending,
                changed_at: submitted_at,
                changed_by: None,
                notes: Some(INITIAL_HISTORY_NOTE.to_string()),
            }],
        }
    }

    pub fn status(&self) -> SubmissionStatus {
        self.status
    }

    pub fn status_history(&self) -> &[StatusHistoryEntry] {
        &self.status_history
    }

    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.reviewed_at
    }

    pub fn reviewed_by(&self) -> Option<&str> {
        self.reviewed_by.as_deref()
    }

    pub fn internal_notes(&self) -> Option<&str> {
        self.internal_notes.as_deref()
    }

    /// Append a history entry and refresh the review fields from it.
    pub fn apply_transition(&mut self, entry: StatusHistoryEntry) {
        self.status = entry.status;
        self.reviewed_at = Some(entry.changed_at);
        self.reviewed_by = entry.changed_by.clone();
        if let Some(notes) = &entry.notes {
            self.internal_notes = Some(notes.clone());
        }
        self.status_history.push(entry);
    }

    /// Case-insensitive substring match over name, email, public id, and phone.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [
            self.personal.full_name.as_str(),
            self.personal.email.as_str(),
            self.submission_id.as_str(),
            self.personal.phone_number.as_str(),
        ]
        .iter()
        .any(|haystack| haystack.to_lowercase().contains(&needle))
    }

    pub fn receipt(&self) -> SubmissionReceipt {
        SubmissionReceipt {
            submission_id: self.submission_id.clone(),
            status: self.status,
            submitted_at: self.submitted_at,
        }
    }

    pub fn status_view(&self) -> StatusCheckView {
        StatusCheckView {
            submission_id: self.submission_id.clone(),
            status: self.status,
            submitted_at: self.submitted_at,
            reviewed_at: self.reviewed_at,
            applicant_name: self.personal.full_name.clone(),
        }
    }

    pub fn summary(&self) -> SubmissionSummary {
        SubmissionSummary {
            id: self.id,
            submission_id: self.submission_id.clone(),
            personal: self.personal.clone(),
            documents: DocumentSummaries {
                identity_proof: self.documents.identity_proof.summary(),
                photograph: self.documents.photograph.summary(),
                signature: self.documents.signature.summary(),
            },
            status: self.status,
            submitted_at: self.submitted_at,
            reviewed_at: self.reviewed_at,
            reviewed_by: self.reviewed_by.clone(),
            internal_notes: self.internal_notes.clone(),
            status_history: self.status_history.clone(),
        }
    }
}

/// Body returned to the applicant after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub submission_id: SubmissionId,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
}

/// Public status view: no documents and no internal notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCheckView {
    pub submission_id: SubmissionId,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    pub applicant_name: String,
}

/// Projection used by the admin list view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSummary {
    pub id: RecordId,
    pub submission_id: SubmissionId,
    #[serde(flatten)]
    pub personal: PersonalDetails,
    pub documents: DocumentSummaries,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_notes: Option<String>,
    pub status_history: Vec<StatusHistoryEntry>,
}

/// Aggregate counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionStats {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

impl SubmissionStats {
    pub fn record(&mut self, status: SubmissionStatus) {
        self.total += 1;
        match status {
            SubmissionStatus::Pending => self.pending += 1,
            SubmissionStatus::Approved => self.approved += 1,
            SubmissionStatus::Rejected => self.rejected += 1,
        }
    }

    pub fn tally<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = SubmissionStatus>,
    {
        let mut stats = Self::default();
        for status in statuses {
            stats.record(status);
        }
        stats
    }
}
