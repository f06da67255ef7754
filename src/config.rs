//! Configuration module

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::remote::rate_limit;

/// One local ONNX model on disk
#[derive(Debug, Clone)]
pub struct ModelFile {
    /// Path to the `.onnx` export
    pub path: PathBuf,

    /// Square input resolution the export expects
    pub input_size: u32,
}

impl ModelFile {
    fn new(dir: &str, file: String, input_size: u32) -> Self {
        Self {
            path: PathBuf::from(dir).join(file),
            input_size,
        }
    }

    /// Class names live next to the model, one per line
    pub fn labels_path(&self) -> PathBuf {
        self.path.with_extension("names")
    }
}

/// Credentials and endpoint for one remote vision-language provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,

    pub detector: ModelFile,
    pub food101: ModelFile,
    pub filipino: ModelFile,
    pub ingredients: ModelFile,

    /// Minimum box score kept by the detector
    pub detector_confidence: f32,

    /// IoU above which the detector suppresses overlapping boxes
    pub detector_iou: f32,

    /// Most boxes reported per image
    pub max_detections: usize,

    /// Top-k for whole-dish classifiers
    pub dish_top_k: usize,

    /// Top-k for the ingredient model
    pub ingredient_top_k: usize,

    /// Escalate to the remote tier when the best local confidence is below this
    pub escalation_threshold: f32,

    /// Admissions per 60 seconds for the rate-gated primary provider
    pub remote_rate_limit: usize,

    /// Upper bound on one remote call
    pub remote_timeout: Duration,

    pub gemini: ProviderConfig,
    pub openai: ProviderConfig,

    /// Tesseract executable
    pub tesseract_cmd: String,

    pub fatsecret_client_id: Option<String>,
    pub fatsecret_client_secret: Option<String>,
    pub fatsecret_token_url: String,
    pub fatsecret_api_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let model_dir = var("MODEL_DIR", "models");

        Self {
            host: var("HOST", "0.0.0.0"),

            port: parse_or(lookup("PORT"), 8000),

            max_upload_bytes: parse_or(lookup("MAX_UPLOAD_BYTES"), 10 * 1024 * 1024),

            detector: ModelFile::new(&model_dir, var("DETECTOR_MODEL", "best.onnx"), 640),
            food101: ModelFile::new(&model_dir, var("FOOD101_MODEL", "food101_cls_best.onnx"), 224),
            filipino: ModelFile::new(&model_dir, var("FILIPINO_MODEL", "filipino_cls_best.onnx"), 224),
            ingredients: ModelFile::new(&model_dir, var("INGREDIENTS_MODEL", "ingredients_best.onnx"), 224),

            detector_confidence: finite_or("DETECTOR_CONFIDENCE", lookup("DETECTOR_CONFIDENCE"), 0.25),
            detector_iou: finite_or("DETECTOR_IOU", lookup("DETECTOR_IOU"), 0.45),
            max_detections: parse_or(lookup("MAX_DETECTIONS"), 100),

            dish_top_k: parse_or(lookup("DISH_TOP_K"), 5),
            ingredient_top_k: parse_or(lookup("INGREDIENT_TOP_K"), 10),

            // 1.0 means "always escalate"; kept as the default to match deployed behaviour
            escalation_threshold: finite_or("ESCALATION_THRESHOLD", lookup("ESCALATION_THRESHOLD"), 1.0),

            remote_rate_limit: parse_or(lookup("REMOTE_RATE_LIMIT"), rate_limit::DEFAULT_LIMIT),
            remote_timeout: Duration::from_secs(parse_or(lookup("REMOTE_TIMEOUT_SECS"), 20)),

            gemini: ProviderConfig {
                api_key: non_empty("GEMINI_API_KEY"),
                model: var("GEMINI_MODEL", "gemini-2.0-flash"),
                base_url: var("GEMINI_BASE_URL", "https://generativelanguage.googleapis.com/v1beta"),
            },
            openai: ProviderConfig {
                api_key: non_empty("OPENAI_API_KEY"),
                model: var("OPENAI_MODEL", "gpt-4o-mini"),
                base_url: var("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            },

            tesseract_cmd: var("TESSERACT_CMD", "tesseract"),

            fatsecret_client_id: non_empty("FATSECRET_CLIENT_ID"),
            fatsecret_client_secret: non_empty("FATSECRET_CLIENT_SECRET"),
            fatsecret_token_url: var("FATSECRET_TOKEN_URL", "https://oauth.fatsecret.com/connect/token"),
            fatsecret_api_url: var("FATSECRET_API_URL", "https://platform.fatsecret.com/rest/server.api"),
        }
    }

    /// Whether the threshold escalates every request
    pub fn escalates_always(&self) -> bool {
        self.escalation_threshold >= 1.0
    }
}

/// `LOG_FORMAT=json`, read before the rest of the config so its warnings are visible
pub fn json_logs_from_env() -> bool {
    env::var("LOG_FORMAT")
        .map(|f| f.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Like `parse_or`, but NaN and infinities fall back too
fn finite_or(key: &str, raw: Option<String>, default: f32) -> f32 {
    let value = parse_or(raw, default);
    if value.is_finite() {
        return value;
    }
    tracing::warn!("{} is not a finite number, using default {}", key, default);
    default
}
