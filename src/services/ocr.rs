//! OCR service

use std::sync::Arc;

use uuid::Uuid;

use crate::inference::image::DecodedImage;
use crate::inference::ocr::OcrEngine;
use crate::models::{OcrResponse, OcrSource, Source, NO_TEXT_FOUND};
use crate::remote::chain::FallbackChain;
use crate::remote::tasks::{OcrTask, RemoteText};

pub struct OcrService {
    engine: Arc<dyn OcrEngine>,
    chain: Arc<FallbackChain>,
}

impl OcrService {
    pub fn new(engine: Arc<dyn OcrEngine>, chain: Arc<FallbackChain>) -> Self {
        Self { engine, chain }
    }

    /// Local engine first; the remote chain only when it fails or reads nothing
    pub async fn extract(&self, request_id: Uuid, image: &DecodedImage) -> OcrResponse {
        match self.engine.extract(image).await {
            Ok(output) if !output.text.trim().is_empty() => {
                return OcrResponse {
                    success: true,
                    request_id,
                    text: output.text,
                    confidence: Some(output.confidence),
                    source: Some(OcrSource::Local),
                    escalated: false,
                };
            }
            Ok(_) => tracing::debug!(%request_id, "Local OCR found no text, escalating"),
            Err(e) => tracing::warn!(%request_id, "Local OCR failed, escalating: {}", e),
        }

        let task = OcrTask { image: image.payload.clone() };
        let outcome = self.chain.resolve(&task).await;
        let trail = outcome.trail();
        let (text, source) = match outcome.answer {
            Some((source, RemoteText::Found(text))) => (text, ocr_source(source)),
            Some((source, RemoteText::NoText)) => (NO_TEXT_FOUND.to_string(), ocr_source(source)),
            None => {
                tracing::warn!(%request_id, "No OCR provider produced an answer: {}", trail);
                (NO_TEXT_FOUND.to_string(), None)
            }
        };

        OcrResponse {
            success: true,
            request_id,
            text,
            confidence: None,
            source,
            escalated: true,
        }
    }
}

fn ocr_source(source: Source) -> Option<OcrSource> {
    match source {
        Source::RemotePrimary => Some(OcrSource::RemotePrimary),
        Source::RemoteSecondary => Some(OcrSource::RemoteSecondary),
        _ => None,
    }
}
