//! OCR models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Literal returned when no text could be read
pub const NO_TEXT_FOUND: &str = "No text found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrSource {
    Local,
    RemotePrimary,
    RemoteSecondary,
}

/// `/ocr/extract` response body
#[derive(Debug, Serialize, Deserialize)]
pub struct OcrResponse {
    pub success: bool,
    pub request_id: Uuid,
    pub text: String,
    /// Mean token confidence (0-100); remote text carries none
    pub confidence: Option<f32>,
    pub source: Option<OcrSource>,
    pub escalated: bool,
}
