//! Dish deconstruction service

use std::sync::Arc;

use uuid::Uuid;

use crate::models::DeconstructResponse;
use crate::remote::chain::FallbackChain;
use crate::remote::tasks::DeconstructTask;

pub struct DishService {
    chain: Arc<FallbackChain>,
}

impl DishService {
    pub fn new(chain: Arc<FallbackChain>) -> Self {
        Self { chain }
    }

    pub async fn deconstruct(&self, request_id: Uuid, food_name: &str) -> DeconstructResponse {
        let food_name = food_name.trim().to_string();
        let task = DeconstructTask { food_name: food_name.clone() };

        let outcome = self.chain.resolve(&task).await;
        let trail = outcome.trail();
        let (deconstruction, source) = match outcome.answer {
            Some((source, deconstruction)) => (Some(deconstruction), Some(source)),
            None => {
                tracing::warn!(%request_id, "No provider could deconstruct {:?}: {}", food_name, trail);
                (None, None)
            }
        };

        DeconstructResponse {
            success: true,
            request_id,
            food_name,
            deconstruction,
            source,
        }
    }
}
