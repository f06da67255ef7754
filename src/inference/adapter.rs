//! Model adapter
//!
//! The only place raw model output is inspected. Detector and classifier
//! results are validated into [`Prediction`]s here; anything that does not
//! conform is logged and becomes an empty list.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use image::RgbImage;

use super::{LocalModel, ModelError, RawBox, RawOutput};
use crate::models::{rank_top_k, BoundingBox, Prediction, Source};

/// Invoke a model slot, turning an empty slot or a panic into an error
pub fn invoke(slot: Option<&Arc<dyn LocalModel>>, image: &RgbImage) -> Result<RawOutput, ModelError> {
    let model = slot.ok_or(ModelError::NotLoaded)?;
    catch_unwind(AssertUnwindSafe(|| model.infer(image))).unwrap_or(Err(ModelError::Panicked))
}

/// One prediction per detected box, no extra suppression
pub fn detections(source: Source, result: Result<RawOutput, ModelError>) -> Vec<Prediction> {
    let boxes = match result {
        Ok(RawOutput::Boxes(boxes)) => boxes,
        Ok(RawOutput::Probabilities { .. }) => {
            tracing::warn!("{}: expected boxes, model returned class probabilities", source);
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!("{}: inference failed: {}", source, e);
            return Vec::new();
        }
    };

    let total = boxes.len();
    let predictions: Vec<Prediction> = boxes
        .into_iter()
        .filter_map(|b| box_to_prediction(source, b))
        .collect();

    if predictions.len() < total {
        tracing::warn!("{}: dropped {} malformed boxes", source, total - predictions.len());
    }
    predictions
}

fn box_to_prediction(source: Source, raw: RawBox) -> Option<Prediction> {
    let bbox = BoundingBox::new(raw.x1.round(), raw.y1.round(), raw.x2.round(), raw.y2.round()).ok()?;
    Prediction::new(raw.class_name, raw.confidence, source)
        .ok()
        .map(|p| p.with_bbox(bbox))
}

/// Top-k classes by score
pub fn top_k(source: Source, result: Result<RawOutput, ModelError>, k: usize) -> Vec<Prediction> {
    let (probs, names) = match result {
        Ok(RawOutput::Probabilities { probs, names }) => (probs, names),
        Ok(RawOutput::Boxes(_)) => {
            tracing::warn!("{}: model result has no class probabilities", source);
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!("{}: inference failed: {}", source, e);
            return Vec::new();
        }
    };

    if probs.is_empty() {
        tracing::warn!("{}: no results from model", source);
        return Vec::new();
    }
    if probs.len() != names.len() {
        tracing::warn!(
            "{}: {} scores but {} class names, discarding output",
            source, probs.len(), names.len()
        );
        return Vec::new();
    }
    if probs.iter().any(|p| !p.is_finite()) {
        tracing::warn!("{}: non-finite score in output, discarding output", source);
        return Vec::new();
    }

    let predictions: Vec<Prediction> = probs
        .iter()
        .zip(names.iter())
        .filter_map(|(&score, name)| Prediction::new(name.as_str(), score, source).ok())
        .collect();

    rank_top_k(predictions, k)
}
