//! Remote tier
//!
//! Vision-language providers behind a fallback chain. The primary provider
//! is quota-gated by a client-side rate limiter; the secondary is not.

pub mod chain;
pub mod gemini;
pub mod openai;
pub mod provider;
pub mod rate_limit;
pub mod tasks;

use std::sync::Arc;

use crate::config::Config;
use crate::models::Source;
use chain::{ChainLink, FallbackChain};
use provider::ProviderError;
use rate_limit::RateLimiter;

/// Primary (Gemini, rate-gated) then secondary (OpenAI-compatible)
pub fn build_chain(config: &Config) -> Result<FallbackChain, ProviderError> {
    let http_client = reqwest::Client::builder()
        .timeout(config.remote_timeout)
        .build()?;

    let gemini = gemini::GeminiProvider::new(config.gemini.clone(), http_client.clone());
    let openai = openai::OpenAiProvider::new(config.openai.clone(), http_client);

    if config.gemini.api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY not set, primary remote provider disabled");
    }
    if config.openai.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY not set, secondary remote provider disabled");
    }

    let links = vec![
        ChainLink {
            source: Source::RemotePrimary,
            provider: Arc::new(gemini),
            limiter: Some(Arc::new(RateLimiter::new("gemini", config.remote_rate_limit))),
        },
        ChainLink {
            source: Source::RemoteSecondary,
            provider: Arc::new(openai),
            limiter: None,
        },
    ];

    Ok(FallbackChain::new(links, config.remote_timeout))
}
