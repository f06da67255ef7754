//! Recognition models

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::prediction::{Prediction, Source};

/// Highest-confidence local dish prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPrediction {
    pub name: String,
    pub confidence: f32,
    pub source: Source,
}

/// Answer from whichever remote provider succeeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResult {
    pub provider: Source,
    pub predictions: Vec<Prediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Adapter output of every local model for one image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalPredictions {
    pub detections: Vec<Prediction>,
    pub food101: Vec<Prediction>,
    pub filipino: Vec<Prediction>,
    pub ingredients: Vec<Prediction>,
}

impl LocalPredictions {
    /// Whole-dish classifier lists, in invocation order
    pub fn dish_classifiers(&self) -> [(Source, &[Prediction]); 2] {
        [(Source::ClassifierA, &self.food101), (Source::ClassifierB, &self.filipino)]
    }
}

/// Merged per-request outcome
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResult {
    pub local: LocalPredictions,
    /// Decided from local classifiers only, before any remote call
    pub best: Option<BestPrediction>,
    pub escalated: bool,
    pub remote: Option<RemoteResult>,
    pub elapsed: Duration,
}

/// `/recognize-food` response body
#[derive(Debug, Serialize, Deserialize)]
pub struct RecognitionResponse {
    pub success: bool,
    pub request_id: Uuid,
    pub detections: Vec<Prediction>,
    pub food101_predictions: Vec<Prediction>,
    pub filipino_predictions: Vec<Prediction>,
    pub ingredient_predictions: Vec<Prediction>,
    pub detection_count: usize,
    pub best: Option<BestPrediction>,
    pub escalated: bool,
    pub remote: Option<RemoteResult>,
    pub elapsed_ms: u64,
}
