//! ONNX Runtime models
//!
//! Runs YOLO-style detection and classification exports through `ort`.
//! Sessions need `&mut` to run, so each one sits behind a mutex; requests
//! using the same model take turns.

use std::fs;
use std::sync::Arc;

use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;

use super::{LocalModel, ModelError, RawBox, RawOutput};
use crate::config::ModelFile;

// ============================================================================
// SESSION
// ============================================================================

struct OnnxSession {
    session: Mutex<Session>,
    output_name: String,
    input_size: u32,
    labels: Arc<[String]>,
}

impl OnnxSession {
    fn open(model: &ModelFile) -> Result<Self, ModelError> {
        if !model.path.exists() {
            return Err(ModelError::FileNotFound(model.path.display().to_string()));
        }

        let labels = load_labels(model)?;

        let session = Session::builder()
            .map_err(ModelError::runtime)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ModelError::runtime)?
            .commit_from_file(&model.path)
            .map_err(ModelError::runtime)?;

        let output_name = session.outputs.first()
            .map(|o| o.name.clone())
            .ok_or_else(|| ModelError::Malformed("model defines no outputs".to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            input_size: model.input_size,
            labels,
        })
    }

    /// Run one NCHW tensor and return (shape, flat data) of the first output
    fn run(&self, input: Array4<f32>) -> Result<(Vec<usize>, Vec<f32>), ModelError> {
        let tensor = Value::from_array(input).map_err(ModelError::runtime)?;

        let mut session = self.session.lock();
        let outputs = session.run(ort::inputs![tensor]).map_err(ModelError::runtime)?;

        let output = outputs.get(&self.output_name)
            .ok_or_else(|| ModelError::Malformed(format!("missing output '{}'", self.output_name)))?;

        let (shape, data) = output.try_extract_tensor::<f32>().map_err(ModelError::runtime)?;
        let dims = shape.iter().map(|d| (*d).max(0) as usize).collect();

        Ok((dims, data.to_vec()))
    }
}

/// Class names, one per line, next to the model file
fn load_labels(model: &ModelFile) -> Result<Arc<[String]>, ModelError> {
    let path = model.labels_path();
    let content = fs::read_to_string(&path)
        .map_err(|e| ModelError::Labels(format!("{}: {}", path.display(), e)))?;

    let labels: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if labels.is_empty() {
        return Err(ModelError::Labels(format!("{} is empty", path.display())));
    }
    Ok(labels.into())
}

/// Stretch-resize to a square input and scale to [0, 1], NCHW
fn to_tensor(image: &RgbImage, size: u32) -> Array4<f32> {
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let side = size as usize;

    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

// ============================================================================
// DETECTOR
// ============================================================================

/// YOLO detection export (`[1, 4 + classes, anchors]`)
pub struct OnnxDetector {
    name: String,
    inner: OnnxSession,
    confidence_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
}

impl OnnxDetector {
    pub fn load(
        name: &str,
        model: &ModelFile,
        confidence_threshold: f32,
        iou_threshold: f32,
        max_detections: usize,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            name: name.to_string(),
            inner: OnnxSession::open(model)?,
            confidence_threshold,
            iou_threshold,
            max_detections,
        })
    }
}

impl LocalModel for OnnxDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&self, image: &RgbImage) -> Result<RawOutput, ModelError> {
        let size = self.inner.input_size;
        let (dims, data) = self.inner.run(to_tensor(image, size))?;

        let scale_x = image.width() as f32 / size as f32;
        let scale_y = image.height() as f32 / size as f32;

        let boxes = decode_boxes(&dims, &data, &self.inner.labels, self.confidence_threshold)?
            .into_iter()
            .map(|mut b| {
                b.x1 *= scale_x;
                b.x2 *= scale_x;
                b.y1 *= scale_y;
                b.y2 *= scale_y;
                b
            })
            .collect();

        Ok(RawOutput::Boxes(non_max_suppression(boxes, self.iou_threshold, self.max_detections)))
    }
}

/// Decode raw anchors into boxes in model-input pixels
fn decode_boxes(
    dims: &[usize],
    data: &[f32],
    labels: &[String],
    confidence_threshold: f32,
) -> Result<Vec<RawBox>, ModelError> {
    if dims.len() != 3 || dims[0] != 1 {
        return Err(ModelError::Malformed(format!("unexpected detector output shape {:?}", dims)));
    }

    // Some exports are transposed to [1, anchors, 4 + classes]
    let expected_channels = 4 + labels.len();
    let (channels, anchors, transposed) = if dims[1] != expected_channels && dims[2] == expected_channels {
        (dims[2], dims[1], true)
    } else {
        (dims[1], dims[2], false)
    };

    if channels <= 4 || data.len() != channels * anchors {
        return Err(ModelError::Malformed(format!("unexpected detector output shape {:?}", dims)));
    }

    let at = |channel: usize, anchor: usize| -> f32 {
        if transposed {
            data[anchor * channels + channel]
        } else {
            data[channel * anchors + anchor]
        }
    };

    let mut boxes = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (4..channels)
            .map(|c| (c - 4, at(c, anchor)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if score < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        let class_name = labels.get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id));

        boxes.push(RawBox {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            confidence: score,
            class_id,
            class_name,
        });
    }
    Ok(boxes)
}

/// Class-aware greedy suppression, highest score first
fn non_max_suppression(mut boxes: Vec<RawBox>, iou_threshold: f32, max_detections: usize) -> Vec<RawBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawBox> = Vec::new();
    for candidate in boxes {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.corners().iou(&candidate.corners()) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
            if kept.len() >= max_detections {
                break;
            }
        }
    }
    kept
}

// ============================================================================
// CLASSIFIER
// ============================================================================

/// YOLO classification export (`[1, classes]`)
pub struct OnnxClassifier {
    name: String,
    inner: OnnxSession,
}

impl OnnxClassifier {
    pub fn load(name: &str, model: &ModelFile) -> Result<Self, ModelError> {
        Ok(Self {
            name: name.to_string(),
            inner: OnnxSession::open(model)?,
        })
    }
}

impl LocalModel for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&self, image: &RgbImage) -> Result<RawOutput, ModelError> {
        let (dims, data) = self.inner.run(to_tensor(image, self.inner.input_size))?;

        if dims.len() != 2 || dims[0] != 1 {
            return Err(ModelError::Malformed(format!("unexpected classifier output shape {:?}", dims)));
        }

        Ok(RawOutput::Probabilities {
            probs: as_probabilities(data),
            names: self.inner.labels.clone(),
        })
    }
}

/// Scores already in [0, 1] pass through untouched; raw logits get a softmax
fn as_probabilities(scores: Vec<f32>) -> Vec<f32> {
    if scores.iter().all(|s| (0.0..=1.0).contains(s)) {
        return scores;
    }

    let max = scores.iter().copied().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["rice".to_string(), "egg".to_string()]
    }

    #[test]
    fn test_decode_boxes_channel_major() {
        // 2 anchors, 6 channels: cx, cy, w, h, rice, egg
        let data = vec![
            100.0, 300.0, // cx
            100.0, 300.0, // cy
            50.0, 20.0, // w
            40.0, 20.0, // h
            0.9, 0.1, // rice
            0.05, 0.2, // egg
        ];

        let boxes = decode_boxes(&[1, 6, 2], &data, &labels(), 0.25).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].class_name, "rice");
        assert_eq!((boxes[0].x1, boxes[0].y1, boxes[0].x2, boxes[0].y2), (75.0, 80.0, 125.0, 120.0));
    }

    #[test]
    fn test_decode_boxes_transposed() {
        let data = vec![
            10.0, 10.0, 4.0, 4.0, 0.1, 0.8, // anchor 0 -> egg
        ];
        let boxes = decode_boxes(&[1, 1, 6], &data, &labels(), 0.25).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].class_name, "egg");
    }

    #[test]
    fn test_decode_boxes_rejects_bad_shape() {
        assert!(decode_boxes(&[1, 6], &[0.0; 6], &labels(), 0.25).is_err());
        assert!(decode_boxes(&[1, 6, 2], &[0.0; 5], &labels(), 0.25).is_err());
    }

    #[test]
    fn test_nms_suppresses_same_class_only() {
        let mk = |x1: f32, conf: f32, class_id: usize| RawBox {
            x1, y1: 0.0, x2: x1 + 100.0, y2: 100.0,
            confidence: conf, class_id, class_name: String::new(),
        };

        let kept = non_max_suppression(vec![mk(0.0, 0.6, 0), mk(5.0, 0.9, 0), mk(5.0, 0.5, 1)], 0.45, 100);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, 1);
    }

    #[test]
    fn test_softmax_applied_to_logits_only() {
        let probs = vec![0.7, 0.2, 0.1];
        assert_eq!(as_probabilities(probs.clone()), probs);

        // Sigmoid heads do not sum to one
        let sigmoid = vec![0.9, 0.8, 0.1];
        assert_eq!(as_probabilities(sigmoid.clone()), sigmoid);
        assert_eq!(as_probabilities(Vec::new()), Vec::<f32>::new());

        let logits = as_probabilities(vec![2.0, 1.0, -1.0]);
        assert!((logits.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(logits[0] > logits[1] && logits[1] > logits[2]);
    }

    #[test]
    fn test_to_tensor_shape() {
        let image = RgbImage::from_pixel(30, 10, image::Rgb([255, 0, 0]));
        let tensor = to_tensor(&image, 8);
        assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
        assert!((tensor[[0, 0, 4, 4]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 1, 4, 4]], 0.0);
    }
}
