use axum::extract::Multipart;
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::AppError;

/// Decoded `multipart/form-data` body of a CV import.
#[derive(Debug, Default)]
pub struct ImportUpload {
    pub text: String,
    pub filename: Option<String>,
    pub draft_id: Option<Uuid>,
}

fn looks_like_pdf(filename: Option<&str>, content_type: Option<&str>, data: &[u8]) -> bool {
    content_type == Some("application/pdf")
        || filename.is_some_and(|f| f.to_ascii_lowercase().ends_with(".pdf"))
        || data.starts_with(b"%PDF")
}

fn unreadable_pdf() -> AppError {
    AppError::Validation("Não foi possível ler o texto do PDF".into())
}

/// Text layer of a PDF. Parsing is CPU-bound and runs on the blocking pool.
pub async fn pdf_text(data: Bytes) -> Result<String, AppError> {
    let len = data.len();
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&data))
        .await
        .map_err(|e| {
            // pdf-extract panics on some malformed files.
            if e.is_panic() {
                warn!("PDF extraction panicked");
                unreadable_pdf()
            } else {
                AppError::Internal(anyhow::anyhow!("PDF extraction task failed: {e}"))
            }
        })?
        .map_err(|e| {
            warn!("PDF extraction failed: {e}");
            unreadable_pdf()
        })?;
    debug!("Extracted {} chars from a {len} byte PDF", text.len());
    Ok(text)
}

/// Reads the `file`, `text` and `draft_id` fields. Unknown fields are skipped.
pub async fn read_import(mut multipart: Multipart) -> Result<ImportUpload, AppError> {
    let mut upload = ImportUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read upload: {e}")))?;
                upload.text = if looks_like_pdf(filename.as_deref(), content_type.as_deref(), &data)
                {
                    pdf_text(data).await?
                } else {
                    String::from_utf8_lossy(&data).into_owned()
                };
                upload.filename = filename;
            }
            "text" if upload.text.is_empty() => {
                upload.text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read text: {e}")))?;
            }
            "draft_id" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read draft_id: {e}")))?;
                let id = Uuid::parse_str(raw.trim())
                    .map_err(|_| AppError::Validation(format!("draft_id is not a UUID: {raw}")))?;
                upload.draft_id = Some(id);
            }
            other => debug!("Skipping multipart field '{other}'"),
        }
    }

    Ok(upload)
}
