//! Prediction model

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Which model or provider produced a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Detector,
    ClassifierA,
    ClassifierB,
    IngredientDetector,
    RemotePrimary,
    RemoteSecondary,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Detector => "detector",
            Source::ClassifierA => "classifier_a",
            Source::ClassifierB => "classifier_b",
            Source::IngredientDetector => "ingredient_detector",
            Source::RemotePrimary => "remote_primary",
            Source::RemoteSecondary => "remote_secondary",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictionError {
    #[error("prediction name is empty")]
    EmptyName,
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f32),
    #[error("bounding box ({0}, {1}, {2}, {3}) is degenerate")]
    DegenerateBox(f32, f32, f32, f32),
}

/// Pixel-space box, serialized as `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f32; 4]", try_from = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Corners must be finite with `x1 < x2` and `y1 < y2`
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self, PredictionError> {
        let finite = [x1, y1, x2, y2].iter().all(|v| v.is_finite());
        if !finite || x1 >= x2 || y1 >= y2 {
            return Err(PredictionError::DegenerateBox(x1, y1, x2, y2));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    /// Intersection over union
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);
        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

impl TryFrom<[f32; 4]> for BoundingBox {
    type Error = PredictionError;

    fn try_from(v: [f32; 4]) -> Result<Self, Self::Error> {
        BoundingBox::new(v[0], v[1], v[2], v[3])
    }
}

/// One candidate identification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub name: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

impl Prediction {
    /// Build a prediction, rejecting empty names and out-of-range confidences
    pub fn new(name: impl Into<String>, confidence: f32, source: Source) -> Result<Self, PredictionError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(PredictionError::EmptyName);
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(PredictionError::ConfidenceOutOfRange(confidence));
        }
        Ok(Self {
            name,
            confidence,
            bbox: None,
            source: Some(source),
        })
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }
}

/// Descending confidence; stable, so equal scores keep model order
pub fn by_confidence_desc(a: &Prediction, b: &Prediction) -> Ordering {
    b.confidence.total_cmp(&a.confidence)
}

/// Sort descending by confidence and keep the first `k`
pub fn rank_top_k(mut predictions: Vec<Prediction>, k: usize) -> Vec<Prediction> {
    predictions.sort_by(by_confidence_desc);
    predictions.truncate(k);
    predictions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_rejects_bad_input() {
        assert_eq!(
            Prediction::new("  ", 0.5, Source::ClassifierA),
            Err(PredictionError::EmptyName)
        );
        assert!(Prediction::new("adobo", 1.2, Source::ClassifierA).is_err());
        assert!(Prediction::new("adobo", f32::NAN, Source::ClassifierA).is_err());
        assert!(Prediction::new("adobo", 0.0, Source::ClassifierA).is_ok());
    }

    #[test]
    fn test_degenerate_box_rejected() {
        assert!(BoundingBox::new(10.0, 10.0, 10.0, 20.0).is_err());
        assert!(BoundingBox::new(10.0, 30.0, 20.0, 20.0).is_err());
        assert!(BoundingBox::new(0.0, 0.0, f32::INFINITY, 1.0).is_err());
    }

    #[test]
    fn test_rank_top_k_orders_and_truncates() {
        let preds = vec![
            Prediction::new("a", 0.1, Source::ClassifierA).unwrap(),
            Prediction::new("b", 0.7, Source::ClassifierA).unwrap(),
            Prediction::new("c", 0.4, Source::ClassifierA).unwrap(),
            Prediction::new("d", 0.9, Source::ClassifierA).unwrap(),
        ];

        let ranked = rank_top_k(preds, 2);
        let names: Vec<&str> = ranked.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["d", "b"]);
    }

    #[test]
    fn test_json_round_trip_keeps_name_and_confidence() {
        let original = Prediction::new("Sinigang na Baboy", 0.873_214_5, Source::RemoteSecondary)
            .unwrap()
            .with_bbox(BoundingBox::new(12.0, 8.0, 240.0, 199.0).unwrap());

        let json = serde_json::to_string(&original).unwrap();
        let parsed: Prediction = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.name, original.name);
        assert!((parsed.confidence - original.confidence).abs() < f32::EPSILON);
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_bbox_serializes_as_array() {
        let pred = Prediction::new("rice", 0.5, Source::Detector)
            .unwrap()
            .with_bbox(BoundingBox::new(1.0, 2.0, 3.0, 4.0).unwrap());

        let value = serde_json::to_value(&pred).unwrap();
        assert_eq!(value["bbox"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(value["source"], "detector");

        let bad = serde_json::json!({"name": "rice", "confidence": 0.5, "bbox": [3.0, 2.0, 1.0, 4.0]});
        assert!(serde_json::from_value::<Prediction>(bad).is_err());
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap();
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0).unwrap();
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }
}
