//! Remote tasks
//!
//! Each task owns its fixed instruction text and the strict parser for the
//! provider's answer. A parse failure is a provider failure.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::provider::{ProviderError, RemoteRequest, ResponseFormat};
use crate::inference::image::ImagePayload;
use crate::models::{rank_top_k, Deconstruction, Prediction, RemoteResult, Source, NO_TEXT_FOUND};

/// Bumped whenever an instruction or its expected schema changes
pub const PROMPT_REVISION: u32 = 1;

fn prediction_instruction(top_k: usize) -> String {
    format!(
        "You are a food recognition expert specialising in Filipino and international cuisine. \
Identify the dish in this image. Respond with JSON only, shaped as \
{{\"predictions\": [{{\"name\": string, \"confidence\": number between 0.0 and 0.99, \
\"reasoning\": string}}]}}, most likely dish first, at most {} entries. If no food is visible \
return {{\"predictions\": []}}.",
        top_k
    )
}

const OCR_INSTRUCTION: &str = "Extract all readable text from this image exactly as written, \
preserving line breaks. Respond with the text only, no commentary. If there is no readable \
text respond with exactly: No text found";

const DECONSTRUCT_INSTRUCTION: &str = "You are a culinary assistant. For the food named below, \
decide whether it is a composite dish or a single ingredient. Respond with JSON only, shaped as \
{\"is_dish\": boolean, \"ingredients\": [string], \"suggested_recipes\": [string], \
\"reasoning\": string}. List main ingredients only and at most 5 recipe names.\n\nFood: ";

/// A unit of work the fallback chain can offer to any provider
pub trait RemoteTask: Send + Sync {
    type Output: Send;

    fn kind(&self) -> &'static str;

    fn request(&self) -> RemoteRequest;

    /// Validate a provider's raw answer
    fn parse(&self, raw: &str, source: Source) -> Result<Self::Output, ProviderError>;
}

fn parse_json(raw: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(raw.trim()).map_err(|e| ProviderError::InvalidJson(e.to_string()))
}

// ============================================================================
// DISH PREDICTION
// ============================================================================

#[derive(Debug, Deserialize)]
struct PredictionEnvelope {
    predictions: Vec<RemoteEntry>,
}

#[derive(Debug, Deserialize)]
struct RemoteEntry {
    name: String,
    confidence: f32,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Identify the dish in an image
pub struct PredictionTask {
    pub image: Arc<ImagePayload>,
    pub top_k: usize,
}

impl RemoteTask for PredictionTask {
    type Output = RemoteResult;

    fn kind(&self) -> &'static str {
        "prediction"
    }

    fn request(&self) -> RemoteRequest {
        RemoteRequest {
            instruction: prediction_instruction(self.top_k),
            image: Some(self.image.clone()),
            format: ResponseFormat::Json,
        }
    }

    fn parse(&self, raw: &str, source: Source) -> Result<RemoteResult, ProviderError> {
        let envelope: PredictionEnvelope = serde_json::from_value(parse_json(raw)?)
            .map_err(|e| ProviderError::Schema(e.to_string()))?;

        let reasoning = envelope.predictions.first()
            .and_then(|e| e.extra.get("reasoning"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let predictions = envelope.predictions
            .into_iter()
            .map(|e| Prediction::new(e.name, e.confidence, source))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProviderError::Schema(e.to_string()))?;

        Ok(RemoteResult {
            provider: source,
            predictions: rank_top_k(predictions, self.top_k),
            reasoning,
        })
    }
}

// ============================================================================
// OCR
// ============================================================================

/// Text read by a remote provider
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteText {
    Found(String),
    NoText,
}

pub struct OcrTask {
    pub image: Arc<ImagePayload>,
}

impl RemoteTask for OcrTask {
    type Output = RemoteText;

    fn kind(&self) -> &'static str {
        "ocr"
    }

    fn request(&self) -> RemoteRequest {
        RemoteRequest {
            instruction: OCR_INSTRUCTION.to_string(),
            image: Some(self.image.clone()),
            format: ResponseFormat::Text,
        }
    }

    fn parse(&self, raw: &str, _source: Source) -> Result<RemoteText, ProviderError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        let sentinel = text.trim_end_matches('.');
        if sentinel.eq_ignore_ascii_case(NO_TEXT_FOUND) {
            return Ok(RemoteText::NoText);
        }
        Ok(RemoteText::Found(text.to_string()))
    }
}

// ============================================================================
// DISH DECONSTRUCTION
// ============================================================================

pub struct DeconstructTask {
    pub food_name: String,
}

impl RemoteTask for DeconstructTask {
    type Output = Deconstruction;

    fn kind(&self) -> &'static str {
        "deconstruct"
    }

    fn request(&self) -> RemoteRequest {
        RemoteRequest {
            instruction: format!("{}{}", DECONSTRUCT_INSTRUCTION, self.food_name),
            image: None,
            format: ResponseFormat::Json,
        }
    }

    fn parse(&self, raw: &str, _source: Source) -> Result<Deconstruction, ProviderError> {
        let mut result: Deconstruction = serde_json::from_value(parse_json(raw)?)
            .map_err(|e| ProviderError::Schema(e.to_string()))?;

        let clean = |items: Vec<String>| -> Vec<String> {
            items.into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };
        result.ingredients = clean(result.ingredients);
        result.suggested_recipes = clean(result.suggested_recipes);

        Ok(result)
    }
}
