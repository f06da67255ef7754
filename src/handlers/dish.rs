//! Dish deconstruction handler

use axum::{extract::State, Json};
use uuid::Uuid;
use validator::Validate;

use crate::models::{DeconstructRequest, DeconstructResponse};
use crate::{AppResult, AppState};

pub async fn deconstruct(
    State(state): State<AppState>,
    Json(req): Json<DeconstructRequest>,
) -> AppResult<Json<DeconstructResponse>> {
    req.validate()?;

    let request_id = Uuid::new_v4();
    tracing::info!(%request_id, food_name = %req.food_name, "Deconstruction request");

    let response = state.dish.deconstruct(request_id, &req.food_name).await;
    Ok(Json(response))
}
