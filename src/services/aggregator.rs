//! Aggregator
//!
//! Picks the best local dish prediction and decides whether the remote tier
//! is worth calling. Only whole-dish classifiers take part; detector and
//! ingredient outputs never influence escalation.

use std::sync::Arc;
use std::time::Instant;

use crate::inference::image::ImagePayload;
use crate::models::{AggregatedResult, BestPrediction, LocalPredictions, Prediction};
use crate::remote::chain::FallbackChain;
use crate::remote::tasks::PredictionTask;

/// How local confidence is judged
///
/// Classifier scores are not calibrated against each other. A calibrated
/// strategy can replace [`RawConfidencePolicy`] without touching the
/// aggregator.
pub trait EscalationPolicy: Send + Sync {
    fn best_local(&self, local: &LocalPredictions) -> Option<BestPrediction>;

    fn should_escalate(&self, best: Option<&BestPrediction>) -> bool;
}

/// Compares raw classifier scores at face value against one threshold
#[derive(Debug, Clone, Copy)]
pub struct RawConfidencePolicy {
    threshold: f32,
}

impl RawConfidencePolicy {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl EscalationPolicy for RawConfidencePolicy {
    fn best_local(&self, local: &LocalPredictions) -> Option<BestPrediction> {
        let mut best: Option<BestPrediction> = None;

        for (source, predictions) in local.dish_classifiers() {
            let Some(top) = top1(predictions) else { continue };
            // Strictly greater: on a tie the earlier classifier wins
            if best.as_ref().map_or(true, |b| top.confidence > b.confidence) {
                best = Some(BestPrediction {
                    name: top.name.clone(),
                    confidence: top.confidence,
                    source,
                });
            }
        }
        best
    }

    fn should_escalate(&self, best: Option<&BestPrediction>) -> bool {
        best.map_or(0.0, |b| b.confidence) < self.threshold
    }
}

fn top1(predictions: &[Prediction]) -> Option<&Prediction> {
    predictions.iter().fold(None, |best: Option<&Prediction>, p| match best {
        Some(b) if b.confidence >= p.confidence => Some(b),
        _ => Some(p),
    })
}

pub struct Aggregator {
    policy: Arc<dyn EscalationPolicy>,
    chain: Arc<FallbackChain>,
    remote_top_k: usize,
}

impl Aggregator {
    pub fn new(policy: Arc<dyn EscalationPolicy>, chain: Arc<FallbackChain>, remote_top_k: usize) -> Self {
        Self { policy, chain, remote_top_k }
    }

    /// Merge local results and escalate when local confidence is too low
    pub async fn aggregate(
        &self,
        local: LocalPredictions,
        image: Arc<ImagePayload>,
        started: Instant,
    ) -> AggregatedResult {
        let best = self.policy.best_local(&local);
        let escalated = self.policy.should_escalate(best.as_ref());

        let remote = if escalated {
            tracing::debug!(
                "Escalating: best local confidence {:.3}",
                best.as_ref().map_or(0.0, |b| b.confidence)
            );
            let task = PredictionTask { image, top_k: self.remote_top_k };
            let outcome = self.chain.resolve(&task).await;
            if outcome.answer.is_none() {
                tracing::warn!("Escalation produced no remote answer: {}", outcome.trail());
            }
            outcome.answer.map(|(_, result)| result)
        } else {
            None
        };

        AggregatedResult {
            local,
            best,
            escalated,
            remote,
            elapsed: started.elapsed(),
        }
    }
}
