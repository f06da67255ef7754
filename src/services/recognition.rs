//! Recognition pipeline
//!
//! Runs the local models in their fixed order on the blocking pool, then
//! hands the lists to the aggregator.

use std::time::Instant;

use ::image::RgbImage;
use uuid::Uuid;

use super::aggregator::Aggregator;
use super::assembler::{assemble, Limits};
use crate::error::AppResult;
use crate::inference::adapter;
use crate::inference::image::DecodedImage;
use crate::inference::LocalModels;
use crate::models::{rank_top_k, LocalPredictions, RecognitionResponse, Source};

/// Local half of recognition; cheap to clone into a blocking task
#[derive(Clone)]
pub struct LocalPipeline {
    pub models: LocalModels,
    pub limits: Limits,
}

impl LocalPipeline {
    pub fn new(models: LocalModels, limits: Limits) -> Self {
        Self { models, limits }
    }

    /// Detector, classifier A, classifier B, ingredients; one after another
    pub fn run(&self, image: &RgbImage) -> LocalPredictions {
        let detections = adapter::detections(
            Source::Detector,
            adapter::invoke(self.models.detector.as_ref(), image),
        );
        let food101 = adapter::top_k(
            Source::ClassifierA,
            adapter::invoke(self.models.food101.as_ref(), image),
            self.limits.dish_top_k,
        );
        let filipino = adapter::top_k(
            Source::ClassifierB,
            adapter::invoke(self.models.filipino.as_ref(), image),
            self.limits.dish_top_k,
        );
        let ingredients = adapter::top_k(
            Source::IngredientDetector,
            adapter::invoke(self.models.ingredients.as_ref(), image),
            self.limits.ingredient_top_k,
        );

        LocalPredictions {
            detections: rank_top_k(detections, self.limits.max_detections),
            food101,
            filipino,
            ingredients,
        }
    }
}

pub struct RecognitionService {
    pipeline: LocalPipeline,
    aggregator: Aggregator,
}

impl RecognitionService {
    pub fn new(pipeline: LocalPipeline, aggregator: Aggregator) -> Self {
        Self { pipeline, aggregator }
    }

    pub fn loaded_models(&self) -> Vec<&'static str> {
        self.pipeline.models.loaded()
    }

    /// Full recognition for one decoded upload
    pub async fn recognize(&self, request_id: Uuid, image: DecodedImage) -> AppResult<RecognitionResponse> {
        let started = Instant::now();
        let DecodedImage { rgb, payload } = image;

        let pipeline = self.pipeline.clone();
        let local = tokio::task::spawn_blocking(move || pipeline.run(&rgb)).await?;

        tracing::debug!(
            %request_id,
            detections = local.detections.len(),
            food101 = local.food101.len(),
            filipino = local.filipino.len(),
            ingredients = local.ingredients.len(),
            "Local inference finished"
        );

        let result = self.aggregator.aggregate(local, payload, started).await;

        tracing::info!(
            %request_id,
            escalated = result.escalated,
            remote = result.remote.as_ref().map(|r| r.provider.as_str()),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Recognition complete"
        );

        Ok(assemble(request_id, result, &self.pipeline.limits))
    }
}
