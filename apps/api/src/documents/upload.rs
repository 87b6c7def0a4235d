use std::path::{Path, PathBuf};

use axum::extract::{multipart::MultipartError, Multipart};
use axum::http::StatusCode;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use super::extract::extract_text_blocking;
use super::{clean_text, DocumentKind};
use crate::errors::AppError;

/// Name of the multipart field carrying the document.
pub const FILE_FIELD: &str = "file";

/// An uploaded document persisted under the upload directory.
#[derive(Debug)]
pub struct StoredUpload {
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub original_name: Option<String>,
    data: Bytes,
}

impl StoredUpload {
    /// Value stored in the `file_url` column.
    pub fn file_url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Extracts and normalises the document text.
    pub async fn cleaned_text(&self) -> Result<String, AppError> {
        let raw = extract_text_blocking(self.kind, self.data.clone()).await?;
        Ok(clean_text(&raw))
    }

    /// Removes the file when uploads are not retained. Failures are logged only.
    pub async fn finish(self, remove: bool) {
        if !remove {
            return;
        }
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!("Failed to delete uploaded file {}: {e}", self.path.display());
        }
    }
}

/// Reads the `file` field of a multipart body, validates its type and
/// writes it to `upload_dir/<uuid>-<millis><ext>`.
pub async fn receive_document(
    multipart: &mut Multipart,
    upload_dir: &Path,
) -> Result<StoredUpload, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = field.file_name().map(str::to_string);
        let kind = DocumentKind::detect(field.content_type(), original_name.as_deref())?;
        let data = field.bytes().await.map_err(multipart_error)?;
        if data.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }

        let path = save_to_disk(upload_dir, kind, &data).await?;
        info!(
            "Stored upload {} ({} bytes) at {}",
            original_name.as_deref().unwrap_or("<unnamed>"),
            data.len(),
            path.display()
        );

        return Ok(StoredUpload {
            path,
            kind,
            original_name,
            data,
        });
    }

    Err(AppError::Validation("No file uploaded".to_string()))
}

async fn save_to_disk(upload_dir: &Path, kind: DocumentKind, data: &[u8]) -> Result<PathBuf, AppError> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Cannot create upload dir: {e}")))?;

    let file_name = format!(
        "{}-{}{}",
        Uuid::new_v4(),
        chrono::Utc::now().timestamp_millis(),
        kind.extension()
    );
    let path = upload_dir.join(file_name);
    tokio::fs::write(&path, data)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Cannot write upload: {e}")))?;
    Ok(path)
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::Validation(format!("Invalid upload: {}", e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_to_disk_names_file_with_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_to_disk(dir.path(), DocumentKind::Pdf, b"%PDF-1.4").await.unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(path.to_string_lossy().ends_with(".pdf"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"%PDF-1.4");
    }

    #[tokio::test]
    async fn test_save_to_disk_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested/uploads");
        let path = save_to_disk(&nested, DocumentKind::Docx, b"PK").await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_finish_removes_file_only_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_to_disk(dir.path(), DocumentKind::Pdf, b"%PDF").await.unwrap();

        let kept = StoredUpload {
            path: path.clone(),
            kind: DocumentKind::Pdf,
            original_name: None,
            data: Bytes::from_static(b"%PDF"),
        };
        kept.finish(false).await;
        assert!(path.exists());

        let removed = StoredUpload {
            path: path.clone(),
            kind: DocumentKind::Pdf,
            original_name: None,
            data: Bytes::from_static(b"%PDF"),
        };
        removed.finish(true).await;
        assert!(!path.exists());
    }
}
