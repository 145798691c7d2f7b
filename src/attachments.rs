//! Best-effort file attachment of submission uploads to a created job.
//!
//! Each file goes through size check -> metadata record -> binary upload on
//! its own; one file failing never stops its siblings.

use crate::errors::AppError;
use crate::models::AttachmentCreate;
use crate::sm8_client::ServiceM8Client;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// 10 MiB.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Metadata of a stored upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: String,
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
}

/// Resolves submission file identifiers to stored uploads.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// `None` when the identifier does not resolve to a file.
    async fn load(&self, id: &str) -> Option<StoredFile>;

    async fn read(&self, file: &StoredFile) -> Result<Vec<u8>, AppError>;
}

/// Uploads stored as plain files under one directory; the identifier is the
/// file name.
#[derive(Debug, Clone)]
pub struct DirectoryFileStore {
    root: PathBuf,
}

impl DirectoryFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, id: &str) -> Option<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            tracing::warn!("Rejected file identifier {:?}", id);
            return None;
        }
        Some(self.root.join(id))
    }
}

#[async_trait]
impl FileStore for DirectoryFileStore {
    async fn load(&self, id: &str) -> Option<StoredFile> {
        let path = self.path_for(id)?;
        let metadata = tokio::fs::metadata(&path).await.ok()?;
        if !metadata.is_file() {
            return None;
        }

        Some(StoredFile {
            id: id.to_string(),
            filename: id.to_string(),
            size: metadata.len(),
            mime_type: mime_type_for(id).to_string(),
        })
    }

    async fn read(&self, file: &StoredFile) -> Result<Vec<u8>, AppError> {
        let path = self
            .path_for(&file.id)
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", file.id)))?;
        tokio::fs::read(&path).await.map_err(|e| {
            AppError::Internal(format!("File not readable: {}: {}", path.display(), e))
        })
    }
}

/// `.` + lower-cased extension, or empty when the name has none.
pub fn file_type_for(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

pub fn mime_type_for(filename: &str) -> &'static str {
    match file_type_for(filename).as_str() {
        ".pdf" => "application/pdf",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".heic" => "image/heic",
        ".txt" => "text/plain",
        ".csv" => "text/csv",
        ".doc" => "application/msword",
        ".docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".xls" => "application/vnd.ms-excel",
        ".xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// What happened to one file.
#[derive(Debug, Clone)]
pub enum AttachmentOutcome {
    Uploaded {
        file_id: String,
        attachment_id: String,
    },
    Skipped {
        file_id: String,
        reason: String,
    },
    Failed {
        file_id: String,
        error: AppError,
    },
}

impl AttachmentOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, AttachmentOutcome::Uploaded { .. })
    }
}

/// Attaches every referenced file to the job.
pub async fn upload_attachments(
    client: &ServiceM8Client,
    store: &dyn FileStore,
    job_id: &str,
    file_ids: &[String],
) -> Vec<AttachmentOutcome> {
    let mut outcomes = Vec::with_capacity(file_ids.len());

    for file_id in file_ids {
        let outcome = upload_one(client, store, job_id, file_id).await;
        match &outcome {
            AttachmentOutcome::Uploaded { attachment_id, .. } => {
                tracing::info!("✓ Uploaded file {} as attachment {}", file_id, attachment_id);
            }
            AttachmentOutcome::Skipped { reason, .. } => {
                tracing::warn!("Skipped file {}: {}", file_id, reason);
            }
            AttachmentOutcome::Failed { error, .. } => {
                tracing::error!("Failed to upload {}: {}", file_id, error);
            }
        }
        outcomes.push(outcome);
    }

    outcomes
}

async fn upload_one(
    client: &ServiceM8Client,
    store: &dyn FileStore,
    job_id: &str,
    file_id: &str,
) -> AttachmentOutcome {
    let skipped = |reason: String| AttachmentOutcome::Skipped {
        file_id: file_id.to_string(),
        reason,
    };
    let failed = |error: AppError| AttachmentOutcome::Failed {
        file_id: file_id.to_string(),
        error,
    };

    let Some(file) = store.load(file_id).await else {
        return skipped("file not found".to_string());
    };

    if file.size > MAX_FILE_SIZE {
        return skipped(format!(
            "{} exceeds size limit ({} > {} bytes)",
            file.filename, file.size, MAX_FILE_SIZE
        ));
    }

    let record = AttachmentCreate {
        related_object: "job".to_string(),
        related_object_uuid: job_id.to_string(),
        attachment_name: file.filename.clone(),
        file_type: file_type_for(&file.filename),
        active: true,
    };

    let attachment_id = match client.create_attachment(&record).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            return failed(AppError::InvalidResponse(format!(
                "No attachment id returned for {}",
                file.filename
            )))
        }
        Err(e) => return failed(e),
    };

    let bytes = match store.read(&file).await {
        Ok(bytes) => bytes,
        Err(e) => return failed(e),
    };

    match client
        .upload_attachment_file(&attachment_id, &file.filename, &file.mime_type, bytes)
        .await
    {
        Ok(()) => AttachmentOutcome::Uploaded {
            file_id: file_id.to_string(),
            attachment_id,
        },
        Err(e) => failed(e),
    }
}
