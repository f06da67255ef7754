//! Fallback chain
//!
//! Offers a task to each remote provider in order until one answers. Every
//! provider is tried at most once per call, without backoff.

use std::sync::Arc;
use std::time::Duration;

use super::provider::{ProviderError, ProviderOutcome, RemoteProvider, RemoteRequest, SkipReason};
use super::rate_limit::RateLimiter;
use super::tasks::{RemoteTask, PROMPT_REVISION};
use crate::models::Source;

/// One provider slot in the chain
pub struct ChainLink {
    pub source: Source,
    pub provider: Arc<dyn RemoteProvider>,
    /// Present when this provider is quota-gated
    pub limiter: Option<Arc<RateLimiter>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptResult {
    Succeeded,
    Skipped(SkipReason),
    Failed(String),
}

/// Record of what happened at one link
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub provider: String,
    pub source: Source,
    /// Instruction revision the provider was offered
    pub prompt_revision: u32,
    pub result: AttemptResult,
}

impl Attempt {
    fn new(provider: String, source: Source, result: AttemptResult) -> Self {
        Self { provider, source, prompt_revision: PROMPT_REVISION, result }
    }
}

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.result {
            AttemptResult::Succeeded => write!(f, "{} answered (prompt r{})", self.provider, self.prompt_revision),
            AttemptResult::Skipped(reason) => write!(f, "{} skipped: {}", self.provider, reason),
            AttemptResult::Failed(e) => write!(f, "{} failed: {}", self.provider, e),
        }
    }
}

#[derive(Debug)]
pub struct ChainOutcome<T> {
    /// The first successful answer and who gave it
    pub answer: Option<(Source, T)>,
    pub attempts: Vec<Attempt>,
}

impl<T> ChainOutcome<T> {
    /// One line per link, for logs
    pub fn trail(&self) -> String {
        self.attempts.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    }
}

pub struct FallbackChain {
    links: Vec<ChainLink>,
    timeout: Duration,
}

impl FallbackChain {
    pub fn new(links: Vec<ChainLink>, timeout: Duration) -> Self {
        Self { links, timeout }
    }

    /// Names of providers holding a credential
    pub fn configured(&self) -> Vec<String> {
        self.links.iter()
            .filter(|l| l.provider.is_configured())
            .map(|l| l.provider.name().to_string())
            .collect()
    }

    pub async fn resolve<T: RemoteTask>(&self, task: &T) -> ChainOutcome<T::Output> {
        let request = task.request();
        let mut attempts = Vec::with_capacity(self.links.len());

        for link in &self.links {
            let name = link.provider.name().to_string();

            let result = match self.offer(link, task, &request).await {
                ProviderOutcome::Ok(value) => {
                    tracing::info!(
                        "{} task answered by {} ({}, prompt r{})",
                        task.kind(), name, link.source, PROMPT_REVISION
                    );
                    attempts.push(Attempt::new(name, link.source, AttemptResult::Succeeded));
                    return ChainOutcome { answer: Some((link.source, value)), attempts };
                }
                ProviderOutcome::Skipped(reason) => {
                    tracing::info!("Skipping {} for {} task: {}", name, task.kind(), reason);
                    AttemptResult::Skipped(reason)
                }
                ProviderOutcome::Failed(e) => {
                    tracing::warn!("{} failed {} task: {}", name, task.kind(), e);
                    AttemptResult::Failed(e.to_string())
                }
            };

            attempts.push(Attempt::new(name, link.source, result));
        }

        tracing::warn!("All {} remote providers exhausted for {} task", self.links.len(), task.kind());
        ChainOutcome { answer: None, attempts }
    }

    async fn offer<T: RemoteTask>(
        &self,
        link: &ChainLink,
        task: &T,
        request: &RemoteRequest,
    ) -> ProviderOutcome<T::Output> {
        // Checked before the limiter so requests we cannot send use no quota
        if !link.provider.is_configured() {
            return ProviderOutcome::Skipped(SkipReason::NotConfigured);
        }

        if let Some(limiter) = &link.limiter {
            if !limiter.admit() {
                return ProviderOutcome::Skipped(SkipReason::RateLimited);
            }
        }

        let raw = match tokio::time::timeout(self.timeout, link.provider.complete(request)).await {
            Err(_) => return ProviderOutcome::Failed(ProviderError::Timeout),
            Ok(Err(e)) => return ProviderOutcome::Failed(e),
            Ok(Ok(raw)) => raw,
        };

        match task.parse(&raw, link.source) {
            Ok(value) => ProviderOutcome::Ok(value),
            Err(e) => ProviderOutcome::Failed(e),
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    /// Scripted provider that counts calls
    pub struct StubProvider {
        pub name: &'static str,
        pub configured: bool,
        pub replies: Mutex<Vec<Result<String, ProviderError>>>,
        pub delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl StubProvider {
        pub fn answering(name: &'static str, reply: &str) -> Self {
            Self::with_reply(name, Ok(reply.to_string()))
        }

        pub fn failing(name: &'static str) -> Self {
            Self::with_reply(name, Err(ProviderError::Status { status: 503, body: "overloaded".to_string() }))
        }

        pub fn unconfigured(name: &'static str) -> Self {
            Self { configured: false, ..Self::failing(name) }
        }

        pub fn with_reply(name: &'static str, reply: Result<String, ProviderError>) -> Self {
            Self {
                name,
                configured: true,
                replies: Mutex::new(vec![reply]),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteProvider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn complete(&self, _request: &RemoteRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            // The last scripted reply repeats
            let mut replies = self.replies.lock();
            if replies.len() > 1 {
                return replies.remove(0);
            }
            match replies.first() {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(e)) => Err(ProviderError::Transport(e.to_string())),
                None => Err(ProviderError::EmptyResponse),
            }
        }
    }

    pub fn link(source: Source, provider: Arc<StubProvider>, limiter: Option<Arc<RateLimiter>>) -> ChainLink {
        ChainLink { source, provider, limiter }
    }
}
