//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
    models_loaded: Vec<&'static str>,
    providers_configured: Vec<String>,
    nutrition_configured: bool,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
        models_loaded: state.recognition.loaded_models(),
        providers_configured: state.chain.configured(),
        nutrition_configured: state.nutrition.is_configured(),
    })
}
