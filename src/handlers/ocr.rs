//! OCR handler

use axum::{extract::{Multipart, State}, Json};
use uuid::Uuid;

use super::upload::read_image;
use crate::models::OcrResponse;
use crate::{AppResult, AppState};

/// Extract text from an uploaded image
pub async fn extract(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<OcrResponse>> {
    let request_id = Uuid::new_v4();
    let image = read_image(multipart).await?;

    let response = state.ocr.extract(request_id, &image).await;
    tracing::info!(%request_id, escalated = response.escalated, "OCR complete");

    Ok(Json(response))
}
