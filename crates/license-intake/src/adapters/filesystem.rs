use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::intake::documents::storage_key;
use crate::intake::{DocumentStore, StorageError, StoredDocument, SubmissionId, ValidatedUpload};

/// Writes documents beneath `root` and serves them from `public_base_url`.
#[derive(Debug, Clone)]
pub struct FilesystemDocumentStore {
    root: PathBuf,
    public_base_url: String,
}

impl FilesystemDocumentStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, storage_key: &str) -> Result<PathBuf, StorageError> {
        if storage_key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(StorageError::Backend(format!(
                "refusing unsafe storage key '{storage_key}'"
            )));
        }
        Ok(self.root.join(storage_key))
    }
}

#[async_trait]
impl DocumentStore for FilesystemDocumentStore {
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
        let path = self.path_for(&key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &upload.bytes).await?;
        debug!(path = %path.display(), size = upload.size(), "document written");

        Ok(StoredDocument {
            url: format!("{}/{key}", self.public_base_url),
            storage_key: key,
            original_name: upload.original_name.clone(),
            size: upload.size(),
            mime_type: upload.mime_type.clone(),
            uploaded_at,
        })
    }

    async fn delete(&self, storage_key: &str) -> Result<(), StorageError> {
        let path = self.path_for(storage_key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::DocumentSlot;
    use axum::body::Bytes;

    fn upload() -> ValidatedUpload {
        ValidatedUpload {
            slot: DocumentSlot::Signature,
            original_name: "my sign.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes: Bytes::from_static(b"\x89PNG signature"),
        }
    }

    #[tokio::test]
    async fn stores_under_root_and_deletes_idempotently() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FilesystemDocumentStore::new(dir.path(), "http://localhost:3000/uploads/");
        let submission_id = SubmissionId("LL-20250101-AB12CD".to_string());

        let stored = store.store(&upload(), &submission_id).await.expect("stored");
        assert!(stored
            .storage_key
            .starts_with("learners_license/LL-20250101-AB12CD/signature_"));
        assert!(stored.storage_key.ends_with("_my_sign.png"));
        assert_eq!(
            stored.url,
            format!("http://localhost:3000/uploads/{}", stored.storage_key)
        );
        assert_eq!(stored.size, 14);

        let on_disk = dir.path().join(&stored.storage_key);
        let contents = tokio::fs::read(&on_disk).await.expect("file exists");
        assert_eq!(contents, b"\x89PNG signature");

        store.delete(&stored.storage_key).await.expect("deleted");
        assert!(!on_disk.exists());
        store
            .delete(&stored.storage_key)
            .await
            .expect("missing file is not an error");
    }

    #[tokio::test]
    async fn rejects_keys_that_escape_the_root() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FilesystemDocumentStore::new(dir.path(), "http://localhost/uploads");
        let error = store
            .delete("learners_license/../../etc/passwd")
            .await
            .expect_err("unsafe key");
        assert!(matches!(error, StorageError::Backend(_)));
    }
}
