//! Multipart image uploads

use axum::extract::Multipart;

use crate::inference::image::{decode, DecodedImage};
use crate::{AppError, AppResult};

/// Form field carrying the image
const FIELD: &str = "file";

/// Read the `file` field and decode it
pub async fn read_image(mut multipart: Multipart) -> AppResult<DecodedImage> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(FIELD) {
            continue;
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read upload: {}", e)))?;

        let bytes = bytes.to_vec();
        // Decoding is CPU work; keep it off the async workers
        let decoded = tokio::task::spawn_blocking(move || decode(bytes)).await??;
        return Ok(decoded);
    }

    Err(AppError::InvalidInput("Missing 'file' field".to_string()))
}
