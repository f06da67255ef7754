//! Recipe Vision Server
//!
//! Food recognition service that merges several local models and escalates
//! to remote vision-language models when local confidence is low.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        RECIPE VISION                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌──────────────────┐   ┌─────────────────┐  │
//! │  │  API      │   │  Local models    │   │  Fallback chain │  │
//! │  │  (Axum)   │──▶│  detector, A, B, │──▶│  gemini (gated) │  │
//! │  │           │   │  ingredients     │   │  → openai       │  │
//! │  └─────┬─────┘   └──────────────────┘   └─────────────────┘  │
//! │        │                                                     │
//! │        ├──▶ OCR (tesseract → fallback chain)                 │
//! │        └──▶ FatSecret pass-through                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod clock;
mod config;
mod error;
mod handlers;
mod inference;
mod models;
mod nutrition;
mod remote;
mod services;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

use config::Config;
use inference::{ocr::TesseractCli, LocalModels};
use nutrition::FatSecretClient;
use remote::chain::FallbackChain;
use services::{
    Aggregator, DishService, Limits, LocalPipeline, OcrService, RawConfidencePolicy,
    RecognitionService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "recipe_vision=debug,tower_http=debug".into()),
    );
    if config::json_logs_from_env() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Load configuration
    let config = Config::from_env();

    tracing::info!("Recipe Vision server starting...");
    if config.escalates_always() {
        tracing::warn!(
            "ESCALATION_THRESHOLD is {}: every recognition request will call the remote tier",
            config.escalation_threshold
        );
    }

    // Build application state
    let models = LocalModels::load(&config);
    let state = build_state(config.clone(), models)?;

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub chain: Arc<FallbackChain>,
    pub recognition: Arc<RecognitionService>,
    pub ocr: Arc<OcrService>,
    pub dish: Arc<DishService>,
    pub nutrition: Arc<FatSecretClient>,
}

fn build_state(config: Config, models: LocalModels) -> anyhow::Result<AppState> {
    let chain = Arc::new(remote::build_chain(&config).context("failed to build remote chain")?);
    let nutrition_http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let ocr_engine = Arc::new(TesseractCli::new(config.tesseract_cmd.clone()));

    Ok(assemble_state(config, models, chain, ocr_engine, nutrition_http))
}

/// Wire services around an already-built chain and OCR engine
fn assemble_state(
    config: Config,
    models: LocalModels,
    chain: Arc<FallbackChain>,
    ocr_engine: Arc<dyn inference::ocr::OcrEngine>,
    nutrition_http: reqwest::Client,
) -> AppState {
    let policy = Arc::new(RawConfidencePolicy::new(config.escalation_threshold));
    let aggregator = Aggregator::new(policy, chain.clone(), config.dish_top_k);
    let pipeline = LocalPipeline::new(models, Limits::from(&config));

    AppState {
        recognition: Arc::new(RecognitionService::new(pipeline, aggregator)),
        ocr: Arc::new(OcrService::new(ocr_engine, chain.clone())),
        dish: Arc::new(DishService::new(chain.clone())),
        nutrition: Arc::new(FatSecretClient::from_config(&config, nutrition_http)),
        chain,
        config: Arc::new(config),
    }
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    let recognition_routes = Router::new()
        .route("/recognize-food", post(handlers::recognize::recognize))
        .route("/recognize-food-combined", post(handlers::recognize::recognize))
        .route("/ocr/extract", post(handlers::ocr::extract))
        .layer(DefaultBodyLimit::max(upload_limit));

    let nutrition_routes = Router::new()
        .route("/fatsecret/foods/search", get(handlers::fatsecret::search_foods))
        .route("/fatsecret/food", get(handlers::fatsecret::get_food))
        .route("/fatsecret/barcode", get(handlers::fatsecret::barcode))
        .route("/fatsecret/qr", get(handlers::fatsecret::qr));

    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/deconstruct-dish", post(handlers::dish::deconstruct))
        .merge(recognition_routes)
        .merge(nutrition_routes)
        .fallback(handlers::not_found)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::inference::image::tests::sample_png;
    use crate::inference::ocr::OcrOutput;
    use crate::models::Source;
    use crate::remote::chain::testing::{link, StubProvider};
    use crate::remote::rate_limit::RateLimiter;
    use crate::services::ocr::tests::FixedOcr;
    use crate::services::recognition::tests::FixedModel;

    const BOUNDARY: &str = "recipe-vision-test-boundary";
    const SINIGANG: &str = r#"{"predictions": [{"name": "Sinigang", "confidence": 0.8}]}"#;

    fn test_config() -> Config {
        let mut config = Config::from_lookup(|_| None);
        config.escalation_threshold = 0.9;
        config
    }

    /// Primary denied by its rate limiter, secondary answers Sinigang
    fn test_app(models: LocalModels) -> (Router, Arc<StubProvider>) {
        let primary = Arc::new(StubProvider::answering("gemini", SINIGANG));
        let secondary = Arc::new(StubProvider::answering("openai", SINIGANG));
        let chain = FallbackChain::new(
            vec![
                link(Source::RemotePrimary, primary.clone(), Some(Arc::new(RateLimiter::new("gemini", 0)))),
                link(Source::RemoteSecondary, secondary, None),
            ],
            Duration::from_secs(5),
        );

        let ocr = OcrOutput { text: "Calories 120".to_string(), confidence: 88.0 };
        let state = assemble_state(
            test_config(),
            models,
            Arc::new(chain),
            Arc::new(FixedOcr(Some(ocr))),
            reqwest::Client::new(),
        );
        (create_router(state), primary)
    }

    fn multipart_request(uri: &str, field: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app(LocalModels::default());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["models_loaded"], serde_json::json!([]));
        assert_eq!(body["providers_configured"], serde_json::json!(["gemini", "openai"]));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (app, _) = test_app(LocalModels::default());
        let response = app
            .oneshot(Request::builder().uri("/recognise").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["status"], 404);
        assert_eq!(body["error"], "No route for /recognise");
    }

    #[tokio::test]
    async fn test_recognize_falls_back_to_secondary() {
        let (app, primary) = test_app(LocalModels::default());
        let response = app
            .oneshot(multipart_request("/recognize-food", "file", &sample_png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["food101_predictions"], serde_json::json!([]));
        assert_eq!(body["filipino_predictions"], serde_json::json!([]));
        assert_eq!(body["detection_count"], 0);
        assert_eq!(body["escalated"], true);
        assert_eq!(body["remote"]["provider"], "remote_secondary");
        assert_eq!(body["remote"]["predictions"][0]["name"], "Sinigang");
        assert!((body["remote"]["predictions"][0]["confidence"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_confident_local_answer_is_not_escalated() {
        let models = LocalModels {
            food101: Some(FixedModel::classifier("food101", &[("adobo", 0.92), ("sisig", 0.08)])),
            filipino: Some(FixedModel::broken("filipino")),
            ..Default::default()
        };
        let (app, _) = test_app(models);
        let response = app
            .oneshot(multipart_request("/recognize-food-combined", "file", &sample_png()))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["best"]["name"], "adobo");
        assert_eq!(body["best"]["source"], "classifier_a");
        assert_eq!(body["escalated"], false);
        assert!(body["remote"].is_null());
    }

    #[tokio::test]
    async fn test_recognize_rejects_bad_image() {
        let (app, _) = test_app(LocalModels::default());
        let response = app
            .oneshot(multipart_request("/recognize-food", "file", b"not an image"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn test_recognize_requires_file_field() {
        let (app, _) = test_app(LocalModels::default());
        let response = app
            .oneshot(multipart_request("/recognize-food", "image", &sample_png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ocr_extract_local() {
        let (app, _) = test_app(LocalModels::default());
        let response = app
            .oneshot(multipart_request("/ocr/extract", "file", &sample_png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["text"], "Calories 120");
        assert_eq!(body["source"], "local");
    }

    #[tokio::test]
    async fn test_deconstruct_validates_name() {
        let (app, _) = test_app(LocalModels::default());
        let request = Request::builder()
            .method("POST")
            .uri("/deconstruct-dish")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"food_name": "   "}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_deconstruct_exhausted_chain_is_null() {
        // Secondary answers prediction JSON, which fails the deconstruction schema
        let (app, _) = test_app(LocalModels::default());
        let request = Request::builder()
            .method("POST")
            .uri("/deconstruct-dish")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"food_name": "sinigang"}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["food_name"], "sinigang");
        assert!(body["deconstruction"].is_null());
    }

    #[tokio::test]
    async fn test_fatsecret_unconfigured() {
        let (app, _) = test_app(LocalModels::default());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/fatsecret/foods/search?search_expression=adobo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
