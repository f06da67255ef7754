//! Nutrition database pass-through handlers

use axum::{extract::{Query, State}, Json};
use serde::Deserialize;
use serde_json::Value;

use crate::{AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub search_expression: String,
}

#[derive(Debug, Deserialize)]
pub struct FoodQuery {
    pub food_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BarcodeQuery {
    pub barcode: String,
}

#[derive(Debug, Deserialize)]
pub struct QrQuery {
    pub qr_code: String,
}

/// Search foods by free text
pub async fn search_foods(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.nutrition.search_foods(&query.search_expression).await?))
}

/// Food details by id
pub async fn get_food(
    State(state): State<AppState>,
    Query(query): Query<FoodQuery>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.nutrition.get_food(&query.food_id).await?))
}

pub async fn barcode(
    State(state): State<AppState>,
    Query(query): Query<BarcodeQuery>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.nutrition.find_by_barcode(&query.barcode).await?))
}

pub async fn qr(
    State(state): State<AppState>,
    Query(query): Query<QrQuery>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.nutrition.find_by_qr(&query.qr_code).await?))
}
