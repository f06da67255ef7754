//! Response assembler
//!
//! Turns an [`AggregatedResult`] into the wire response. This step cannot
//! fail: anything that does not hold up is dropped to an empty value.

use uuid::Uuid;

use crate::config::Config;
use crate::models::{
    rank_top_k, AggregatedResult, BestPrediction, Prediction, RecognitionResponse, RemoteResult,
};

/// Per-list truncation applied to the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub dish_top_k: usize,
    pub ingredient_top_k: usize,
    pub max_detections: usize,
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        Self {
            dish_top_k: config.dish_top_k,
            ingredient_top_k: config.ingredient_top_k,
            max_detections: config.max_detections,
        }
    }
}

pub fn assemble(request_id: Uuid, result: AggregatedResult, limits: &Limits) -> RecognitionResponse {
    let local = result.local;

    let detections = clean(local.detections, limits.max_detections);
    let food101_predictions = clean(local.food101, limits.dish_top_k);
    let filipino_predictions = clean(local.filipino, limits.dish_top_k);
    let ingredient_predictions = clean(local.ingredients, limits.ingredient_top_k);

    let remote = result.remote.and_then(|remote| clean_remote(remote, limits.dish_top_k));
    let best = result.best.filter(valid_best);

    RecognitionResponse {
        success: true,
        request_id,
        detection_count: detections.len(),
        detections,
        food101_predictions,
        filipino_predictions,
        ingredient_predictions,
        best,
        escalated: result.escalated,
        remote,
        elapsed_ms: result.elapsed.as_millis().try_into().unwrap_or(u64::MAX),
    }
}

fn valid_prediction(p: &Prediction) -> bool {
    !p.name.trim().is_empty() && p.confidence.is_finite() && (0.0..=1.0).contains(&p.confidence)
}

fn valid_best(best: &BestPrediction) -> bool {
    !best.name.trim().is_empty() && best.confidence.is_finite()
}

fn clean(predictions: Vec<Prediction>, k: usize) -> Vec<Prediction> {
    let total = predictions.len();
    let kept: Vec<Prediction> = predictions.into_iter().filter(valid_prediction).collect();
    if kept.len() < total {
        tracing::warn!("Dropped {} invalid predictions while assembling response", total - kept.len());
    }
    rank_top_k(kept, k)
}

fn clean_remote(remote: RemoteResult, k: usize) -> Option<RemoteResult> {
    let predictions = clean(remote.predictions, k);
    if predictions.is_empty() {
        return None;
    }
    Some(RemoteResult { predictions, ..remote })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::{LocalPredictions, Source};

    fn pred(name: &str, confidence: f32, source: Source) -> Prediction {
        Prediction::new(name, confidence, source).unwrap()
    }

    fn limits() -> Limits {
        Limits { dish_top_k: 2, ingredient_top_k: 3, max_detections: 100 }
    }

    #[test]
    fn test_assemble_sorts_and_truncates() {
        let result = AggregatedResult {
            local: LocalPredictions {
                food101: vec![
                    pred("ramen", 0.1, Source::ClassifierA),
                    pred("pho", 0.6, Source::ClassifierA),
                    pred("udon", 0.3, Source::ClassifierA),
                ],
                ..Default::default()
            },
            best: None,
            escalated: false,
            remote: None,
            elapsed: Duration::from_millis(42),
        };

        let response = assemble(Uuid::new_v4(), result, &limits());
        let names: Vec<&str> = response.food101_predictions.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["pho", "udon"]);
        assert_eq!(response.elapsed_ms, 42);
        assert!(response.success);
    }

    #[test]
    fn test_assemble_drops_anomalies() {
        // Built directly to bypass the constructor checks
        let broken = Prediction { name: "nan".to_string(), confidence: f32::NAN, bbox: None, source: None };
        let result = AggregatedResult {
            local: LocalPredictions {
                detections: vec![broken.clone(), pred("egg", 0.8, Source::Detector)],
                ..Default::default()
            },
            best: Some(BestPrediction { name: "x".to_string(), confidence: f32::INFINITY, source: Source::ClassifierA }),
            escalated: true,
            remote: Some(RemoteResult { provider: Source::RemotePrimary, predictions: vec![broken], reasoning: None }),
            elapsed: Duration::ZERO,
        };

        let response = assemble(Uuid::new_v4(), result, &limits());
        assert_eq!(response.detection_count, 1);
        assert!(response.best.is_none());
        assert!(response.remote.is_none());
        assert!(response.escalated);
    }

    #[test]
    fn test_no_food_remote_answer_is_null() {
        let result = AggregatedResult {
            local: LocalPredictions::default(),
            best: None,
            escalated: true,
            remote: Some(RemoteResult { provider: Source::RemotePrimary, predictions: Vec::new(), reasoning: None }),
            elapsed: Duration::ZERO,
        };

        let response = assemble(Uuid::new_v4(), result, &limits());
        assert!(response.escalated);
        assert!(response.remote.is_none());
    }
}
