//! Food recognition handler

use axum::{extract::{Multipart, State}, Json};
use uuid::Uuid;

use super::upload::read_image;
use crate::models::RecognitionResponse;
use crate::{AppResult, AppState};

/// Recognize food in an uploaded image
pub async fn recognize(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<RecognitionResponse>> {
    let request_id = Uuid::new_v4();
    let image = read_image(multipart).await?;

    tracing::info!(
        %request_id,
        width = image.width(),
        height = image.height(),
        "Recognition request"
    );

    let response = state.recognition.recognize(request_id, image).await?;
    Ok(Json(response))
}
