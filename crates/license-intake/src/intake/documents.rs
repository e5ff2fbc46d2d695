use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::{DateTime, Utc};

use super::domain::{DocumentSlot, StoredDocument, SubmissionId};
use super::validation::ValidationErrors;

/// Largest accepted upload per slot, inclusive.
pub const MAX_DOCUMENT_BYTES: usize = 2 * 1024 * 1024;

const STORAGE_FOLDER: &str = "learners_license";

/// A file part received from the client, not yet validated.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub original_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl DocumentUpload {
    pub fn new(
        original_name: impl Into<String>,
        content_type: Option<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            content_type,
            bytes: bytes.into(),
        }
    }
}

/// Uploads keyed by slot as they arrive from the multipart stream.
#[derive(Debug, Clone, Default)]
pub struct DocumentUploads {
    parts: BTreeMap<DocumentSlot, DocumentUpload>,
    duplicates: Vec<DocumentSlot>,
}

impl DocumentUploads {
    pub fn insert(&mut self, slot: DocumentSlot, upload: DocumentUpload) {
        if self.parts.contains_key(&slot) {
            self.duplicates.push(slot);
        } else {
            self.parts.insert(slot, upload);
        }
    }

    pub fn with(mut self, slot: DocumentSlot, upload: DocumentUpload) -> Self {
        self.insert(slot, upload);
        self
    }

    pub fn get(&self, slot: DocumentSlot) -> Option<&DocumentUpload> {
        self.parts.get(&slot)
    }
}

/// An upload that passed boundary checks, with its resolved MIME type.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub slot: DocumentSlot,
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl ValidatedUpload {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone)]
pub struct ValidatedUploads {
    pub identity_proof: ValidatedUpload,
    pub photograph: ValidatedUpload,
    pub signature: ValidatedUpload,
}

/// Resolve the effective MIME type of an upload.
///
/// Parameters are dropped, `image/jpg` becomes `image/jpeg`, and generic or
/// missing types fall back to a guess from the file extension.
pub fn resolve_mime_type(content_type: Option<&str>, original_name: &str) -> Option<String> {
    let declared = content_type
        .and_then(|raw| raw.split(';').next())
        .map(|essence| essence.trim().to_ascii_lowercase())
        .filter(|essence| !essence.is_empty() && essence != "application/octet-stream");

    let resolved = match declared {
        Some(essence) => essence,
        None => mime_guess::from_path(original_name)
            .first()
            .map(|guess| guess.essence_str().to_ascii_lowercase())?,
    };

    if resolved == "image/jpg" {
        Some(mime::IMAGE_JPEG.essence_str().to_string())
    } else {
        Some(resolved)
    }
}

fn validate_slot(
    errors: &mut ValidationErrors,
    slot: DocumentSlot,
    upload: Option<&DocumentUpload>,
) -> Option<ValidatedUpload> {
    let field = slot.field_name();
    let Some(upload) = upload else {
        errors.push(field, format!("{field} file is required"));
        return None;
    };

    if upload.bytes.is_empty() {
        errors.push(field, format!("{field} file is empty"));
        return None;
    }

    if upload.bytes.len() > MAX_DOCUMENT_BYTES {
        errors.push(field, format!("{field} file must not exceed 2MB"));
        return None;
    }

    let mime_type = resolve_mime_type(upload.content_type.as_deref(), &upload.original_name)
        .filter(|mime_type| slot.accepts(mime_type));
    let Some(mime_type) = mime_type else {
        errors.push(
            field,
            format!("{field} must be a {} file", slot.allowed_label()),
        );
        return None;
    };

    Some(ValidatedUpload {
        slot,
        original_name: upload.original_name.clone(),
        mime_type,
        bytes: upload.bytes.clone(),
    })
}

/// Check that every slot is present once, non-empty, within size, and of an allowed type.
pub fn validate_uploads(uploads: &DocumentUploads) -> Result<ValidatedUploads, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    for slot in &uploads.duplicates {
        let field = slot.field_name();
        errors.push(field, format!("{field} must be uploaded only once"));
    }

    let identity_proof = validate_slot(
        &mut errors,
        DocumentSlot::IdentityProof,
        uploads.get(DocumentSlot::IdentityProof),
    );
    let photograph = validate_slot(
        &mut errors,
        DocumentSlot::Photograph,
        uploads.get(DocumentSlot::Photograph),
    );
    let signature = validate_slot(
        &mut errors,
        DocumentSlot::Signature,
        uploads.get(DocumentSlot::Signature),
    );

    match (identity_proof, photograph, signature) {
        (Some(identity_proof), Some(photograph), Some(signature)) if errors.is_empty() => {
            Ok(ValidatedUploads {
                identity_proof,
                photograph,
                signature,
            })
        }
        _ => Err(errors),
    }
}

/// Replace anything outside `[A-Za-z0-9._-]` so names are safe as path segments.
pub fn sanitize_file_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn storage_key(
    submission_id: &SubmissionId,
    slot: DocumentSlot,
    original_name: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{STORAGE_FOLDER}/{submission_id}/{}_{}_{}",
        slot.field_name(),
        at.timestamp_millis(),
        sanitize_file_name(original_name)
    )
}

/// Binary document storage used by the intake flow.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn store(
        &self,
        upload: &ValidatedUpload,
        submission_id: &SubmissionId,
    ) -> Result<StoredDocument, StorageError>;

    async fn delete(&self, storage_key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("document store rejected the request: {0}")]
    Backend(String),
    #[error("document store timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("document store io failure: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, content_type: Option<&str>, size: usize) -> DocumentUpload {
        DocumentUpload::new(name, content_type.map(str::to_string), vec![7u8; size])
    }

    fn complete(identity: DocumentUpload) -> DocumentUploads {
        DocumentUploads::default()
            .with(DocumentSlot::IdentityProof, identity)
            .with(
                DocumentSlot::Photograph,
                upload("face.jpg", Some("image/jpeg"), 64),
            )
            .with(
                DocumentSlot::Signature,
                upload("sign.png", Some("image/png"), 64),
            )
    }

    #[test]
    fn resolves_jpg_alias_and_strips_parameters() {
        assert_eq!(
            resolve_mime_type(Some("image/jpg"), "a.jpg").as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(
            resolve_mime_type(Some("Application/PDF; charset=binary"), "a.pdf").as_deref(),
            Some("application/pdf")
        );
    }

    #[test]
    fn guesses_from_extension_for_generic_types() {
        assert_eq!(
            resolve_mime_type(Some("application/octet-stream"), "scan.PDF").as_deref(),
            Some("application/pdf")
        );
        assert_eq!(resolve_mime_type(None, "photo.png").as_deref(), Some("image/png"));
        assert_eq!(resolve_mime_type(None, "no-extension"), None);
    }

    #[test]
    fn size_limit_is_inclusive() {
        let at_limit = complete(upload("id.pdf", Some("application/pdf"), MAX_DOCUMENT_BYTES));
        assert!(validate_uploads(&at_limit).is_ok());

        let over = complete(upload(
            "id.pdf",
            Some("application/pdf"),
            MAX_DOCUMENT_BYTES + 1,
        ));
        let errors = validate_uploads(&over).expect_err("oversized upload rejected");
        assert!(errors.mentions("identityProof"));
    }

    #[test]
    fn pdf_is_only_accepted_for_identity_proof() {
        let uploads = DocumentUploads::default()
            .with(
                DocumentSlot::IdentityProof,
                upload("id.pdf", Some("application/pdf"), 10),
            )
            .with(
                DocumentSlot::Photograph,
                upload("face.pdf", Some("application/pdf"), 10),
            )
            .with(
                DocumentSlot::Signature,
                upload("sign.png", Some("image/png"), 10),
            );

        let errors = validate_uploads(&uploads).expect_err("pdf photograph rejected");
        assert!(errors.mentions("photograph"));
        assert!(!errors.mentions("identityProof"));
        assert_eq!(errors.errors().len(), 1);
    }

    #[test]
    fn missing_empty_and_duplicate_parts_are_reported_together() {
        let mut uploads = DocumentUploads::default();
        uploads.insert(
            DocumentSlot::Photograph,
            upload("face.jpg", Some("image/jpeg"), 0),
        );
        uploads.insert(
            DocumentSlot::Signature,
            upload("sign.png", Some("image/png"), 10),
        );
        uploads.insert(
            DocumentSlot::Signature,
            upload("sign2.png", Some("image/png"), 10),
        );

        let errors = validate_uploads(&uploads).expect_err("invalid set");
        assert!(errors.mentions("identityProof"));
        assert!(errors.mentions("photograph"));
        assert!(errors.mentions("signature"));
    }

    #[test]
    fn storage_key_uses_sanitized_name() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).expect("valid timestamp");
        let key = storage_key(
            &SubmissionId("LL-20240101-ABC123".into()),
            DocumentSlot::Photograph,
            "../my photo (1).jpg",
            at,
        );
        assert_eq!(
            key,
            "learners_license/LL-20240101-ABC123/photograph_1700000000123_my_photo__1_.jpg"
        );
    }
}
