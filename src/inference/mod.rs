//! Local inference
//!
//! On-process models that turn an RGB image into boxes or class
//! probabilities. Everything here is synchronous and CPU-bound; callers run
//! it on the blocking pool.

pub mod adapter;
pub mod image;
pub mod ocr;
pub mod onnx;

use std::sync::Arc;

use ::image::RgbImage;

use crate::config::Config;
use crate::models::BoundingBox;

/// One box as the detector reports it, in source-image pixels
#[derive(Debug, Clone, PartialEq)]
pub struct RawBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

impl RawBox {
    /// Corners as-is; degenerate boxes are rejected later by the adapter
    pub fn corners(&self) -> BoundingBox {
        BoundingBox { x1: self.x1, y1: self.y1, x2: self.x2, y2: self.y2 }
    }
}

/// Unvalidated model output
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    /// Detector-style
    Boxes(Vec<RawBox>),
    /// Classifier-style: one score per class plus the name table
    Probabilities { probs: Vec<f32>, names: Arc<[String]> },
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model is not loaded")]
    NotLoaded,
    #[error("model file not found: {0}")]
    FileNotFound(String),
    #[error("failed to read labels: {0}")]
    Labels(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("malformed output: {0}")]
    Malformed(String),
    #[error("model panicked during inference")]
    Panicked,
}

impl ModelError {
    pub fn runtime(err: impl std::fmt::Display) -> Self {
        ModelError::Runtime(err.to_string())
    }
}

/// An on-process detector or classifier
pub trait LocalModel: Send + Sync {
    fn name(&self) -> &str;

    fn infer(&self, image: &RgbImage) -> Result<RawOutput, ModelError>;
}

/// The four local model slots; an empty slot behaves like a failing model
#[derive(Clone, Default)]
pub struct LocalModels {
    pub detector: Option<Arc<dyn LocalModel>>,
    pub food101: Option<Arc<dyn LocalModel>>,
    pub filipino: Option<Arc<dyn LocalModel>>,
    pub ingredients: Option<Arc<dyn LocalModel>>,
}

impl LocalModels {
    /// Load every configured ONNX model; missing files leave the slot empty
    pub fn load(config: &Config) -> Self {
        let detector = onnx::OnnxDetector::load(
            "detector",
            &config.detector,
            config.detector_confidence,
            config.detector_iou,
            config.max_detections,
        );
        let food101 = onnx::OnnxClassifier::load("food101", &config.food101);
        let filipino = onnx::OnnxClassifier::load("filipino", &config.filipino);
        let ingredients = onnx::OnnxClassifier::load("ingredients", &config.ingredients);

        Self {
            detector: into_slot("detector", detector),
            food101: into_slot("food101", food101),
            filipino: into_slot("filipino", filipino),
            ingredients: into_slot("ingredients", ingredients),
        }
    }

    /// Names of the slots that hold a model
    pub fn loaded(&self) -> Vec<&'static str> {
        [
            ("detector", &self.detector),
            ("food101", &self.food101),
            ("filipino", &self.filipino),
            ("ingredients", &self.ingredients),
        ]
        .into_iter()
        .filter(|(_, slot)| slot.is_some())
        .map(|(name, _)| name)
        .collect()
    }
}

fn into_slot<M: LocalModel + 'static>(
    slot: &str,
    loaded: Result<M, ModelError>,
) -> Option<Arc<dyn LocalModel>> {
    match loaded {
        Ok(model) => {
            tracing::info!("Loaded {} model", slot);
            Some(Arc::new(model))
        }
        Err(e) => {
            tracing::warn!("{} model unavailable: {}", slot, e);
            None
        }
    }
}
