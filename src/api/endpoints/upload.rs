//! `POST /upload/doc`: reference document text for planning.

use axum::extract::Multipart;
use axum::Json;
use serde::Serialize;

use super::blocking;
use crate::api::error::ApiError;
use crate::extract::{extract_text, DocumentKind, ExtractError};

#[derive(Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub extracted_text: String,
}

/// Reads the multipart `file` field and returns its text.
pub async fn upload_doc(mut multipart: Multipart) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Upload failed: {e}")))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("Missing file field".into()))?;
    if DocumentKind::from_filename(&filename).is_none() {
        return Err(ApiError::BadRequest("Unsupported file type".into()));
    }

    let name = filename.clone();
    let text = blocking(move || match extract_text(&name, &bytes) {
        Ok(text) => Ok(text),
        Err(ExtractError::UnsupportedType(_)) => {
            Err(ApiError::BadRequest("Unsupported file type".into()))
        }
        Err(e) => {
            tracing::warn!(filename = %name, error = %e, "Document extraction failed");
            Ok(String::new())
        }
    })
    .await?;

    if text.trim().is_empty() {
        return Err(ApiError::BadRequest("Could not extract text".into()));
    }
    Ok(Json(UploadResponse {
        filename,
        extracted_text: text,
    }))
}
