//! HTTP handlers

pub mod health;
pub mod recognize;
pub mod ocr;
pub mod dish;
pub mod fatsecret;
mod upload;

use axum::http::Uri;

use crate::AppError;

/// Fallback for unmatched paths
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}
