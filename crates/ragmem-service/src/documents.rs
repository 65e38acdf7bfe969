//! Document registration, listing, and deletion.
//!
//! [`DocumentService`] is the boundary an upload handler calls after the
//! file has been written to disk. Ingestion itself happens on the worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use ragmem_core::defaults::{ALLOWED_EXTENSIONS, DOCUMENT_LIST_LIMIT, MAX_UPLOAD_SIZE_BYTES};
use ragmem_core::{
    Document, DocumentRepository, DocumentStats, DocumentStatus, Error, NewDocument, Result,
    RetrievalIndex,
};
use ragmem_jobs::WorkerHandle;

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Limits applied to uploads.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSettings {
    pub max_size_bytes: u64,
    /// Lowercase extensions without the dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_size_bytes: MAX_UPLOAD_SIZE_BYTES,
            allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl UploadSettings {
    /// Check name and size, returning the normalized extension.
    pub fn check(&self, file_name: &str, file_size: u64) -> Result<String> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| {
                Error::InvalidInput(format!("file has no extension: {}", file_name))
            })?;
        if !self.allowed_extensions.iter().any(|a| a == &extension) {
            return Err(Error::InvalidInput(format!(
                "file type .{} is not allowed (allowed: {})",
                extension,
                self.allowed_extensions.join(", ")
            )));
        }
        if file_size > self.max_size_bytes {
            return Err(Error::InvalidInput(format!(
                "file is {} bytes, max {}",
                file_size, self.max_size_bytes
            )));
        }
        Ok(extension)
    }
}

/// A file already stored on disk, awaiting registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub path: PathBuf,
    /// Name as supplied by the client.
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: Option<String>,
}

impl UploadedFile {
    /// Describe a local file, taking its name and size from the filesystem.
    pub async fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .ok_or_else(|| Error::InvalidInput(format!("invalid file name: {}", path.display())))?;
        Ok(Self {
            path,
            file_name,
            file_size: metadata.len(),
            mime_type: None,
        })
    }
}

/// SHA-256 of a file, hex encoded, read in fixed-size blocks.
pub async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Upload registration and document management.
pub struct DocumentService {
    documents: Arc<dyn DocumentRepository>,
    index: Arc<dyn RetrievalIndex>,
    worker: Arc<WorkerHandle>,
    settings: UploadSettings,
}

impl DocumentService {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        index: Arc<dyn RetrievalIndex>,
        worker: Arc<WorkerHandle>,
    ) -> Self {
        Self {
            documents,
            index,
            worker,
            settings: UploadSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: UploadSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Register an uploaded file and queue it for ingestion.
    ///
    /// Returns immediately with status `processing`. A file whose content
    /// the user has already uploaded returns the existing document instead,
    /// unless that document failed: then it is reset and ingested again.
    #[instrument(skip(self, upload), fields(
        subsystem = "service",
        component = "documents",
        op = "register_upload",
        user_id = %user_id,
        file_name = %upload.file_name,
    ))]
    pub async fn register_upload(&self, user_id: Uuid, upload: UploadedFile) -> Result<Document> {
        self.settings.check(&upload.file_name, upload.file_size)?;
        let file_hash = hash_file(&upload.path).await?;

        if let Some(existing) = self.documents.find_by_hash(user_id, &file_hash).await? {
            if existing.status != DocumentStatus::Failed {
                info!(
                    document_id = %existing.id,
                    status = %existing.status,
                    "Duplicate upload, returning existing document"
                );
                return Ok(existing);
            }
            return self.retry_failed(existing, &upload).await;
        }

        let file_size = i64::try_from(upload.file_size)
            .map_err(|_| Error::InvalidInput("file size out of range".into()))?;
        let new = NewDocument::from_file_name(
            user_id,
            &upload.file_name,
            upload.path.to_string_lossy(),
            file_size,
            file_hash,
        )
        .with_mime_type(upload.mime_type);
        let document = self.documents.insert(&new).await?;

        self.enqueue(document).await
    }

    async fn retry_failed(&self, failed: Document, upload: &UploadedFile) -> Result<Document> {
        // Partial chunks from the failed run would duplicate the new ones.
        let stale = self.index.delete_by_document(failed.id).await?;
        let path = upload.path.to_string_lossy();
        let Some(document) = self
            .documents
            .reset_failed(failed.id, failed.user_id, &path)
            .await?
        else {
            // Another upload reset it first.
            return self.get(failed.id, failed.user_id).await;
        };
        info!(
            document_id = %document.id,
            previous_error = failed.error_message.as_deref().unwrap_or(""),
            stale_chunks = stale,
            "Re-ingesting previously failed document"
        );
        self.enqueue(document).await
    }

    async fn enqueue(&self, document: Document) -> Result<Document> {
        if let Err(e) = self.worker.submit(document.clone()).await {
            self.documents.mark_failed(document.id, &e.to_string()).await?;
            return Err(e);
        }
        info!(
            document_id = %document.id,
            file_type = %document.file_type,
            file_size = document.file_size,
            "Document queued for ingestion"
        );
        Ok(document)
    }

    /// Fetch a document owned by `user_id`.
    pub async fn get(&self, document_id: Uuid, user_id: Uuid) -> Result<Document> {
        self.documents
            .get(document_id, user_id)
            .await?
            .ok_or(Error::DocumentNotFound(document_id))
    }

    /// Newest first, optionally filtered by status.
    pub async fn list(
        &self,
        user_id: Uuid,
        status: Option<DocumentStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        self.documents
            .list(user_id, status, limit.unwrap_or(DOCUMENT_LIST_LIMIT))
            .await
    }

    /// Remove a document's chunks, stored file, and record.
    ///
    /// Returns false when the document is missing or owned by someone else.
    #[instrument(skip(self), fields(subsystem = "service", component = "documents", op = "delete"))]
    pub async fn delete(&self, document_id: Uuid, user_id: Uuid) -> Result<bool> {
        let Some(document) = self.documents.get(document_id, user_id).await? else {
            return Ok(false);
        };

        let removed_chunks = self.index.delete_by_document(document_id).await?;
        match tokio::fs::remove_file(&document.file_path).await {
            Ok(()) => debug!(path = %document.file_path, "Stored file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %document.file_path, error = %e, "Failed to remove stored file"),
        }
        let deleted = self.documents.delete(document_id, user_id).await?;

        info!(removed_chunks, deleted, "Document deleted");
        Ok(deleted)
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<DocumentStats> {
        self.documents.stats(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_upload_settings_check() {
        let settings = UploadSettings::default();
        assert_eq!(settings.check("Report.PDF", 10).unwrap(), "pdf");
        assert_eq!(settings.check("notes.md", 0).unwrap(), "md");
        assert!(matches!(
            settings.check("slides.pptx", 10),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            settings.check("README", 10),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            settings.check("big.txt", MAX_UPLOAD_SIZE_BYTES + 1),
            Err(Error::InvalidInput(m)) if m.contains("max")
        ));
    }

    #[tokio::test]
    async fn test_hash_file_matches_one_shot_digest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let body = "abc".repeat(50_000);
        file.write_all(body.as_bytes()).unwrap();

        let streamed = hash_file(file.path()).await.unwrap();
        assert_eq!(streamed, hex::encode(Sha256::digest(body.as_bytes())));
        assert_eq!(streamed.len(), 64);
    }

    #[tokio::test]
    async fn test_uploaded_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.txt");
        std::fs::write(&path, "twelve bytes").unwrap();

        let upload = UploadedFile::from_path(&path).await.unwrap();
        assert_eq!(upload.file_name, "policy.txt");
        assert_eq!(upload.file_size, 12);
        assert!(UploadedFile::from_path(dir.path().join("missing.txt")).await.is_err());
    }
}
