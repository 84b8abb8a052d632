//! Generation capability: an ordered chain of models with fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::circuit_breaker::{CircuitBreaker, CooldownReason};
use crate::providers::{GenerationRequest, Provider};

/// A configured model in the chain.
pub struct ModelEntry {
    pub alias: String,
    pub client: Arc<dyn Provider>,
}

impl ModelEntry {
    pub fn new(alias: impl Into<String>, client: Arc<dyn Provider>) -> Self {
        Self {
            alias: alias.into(),
            client,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Every model failed or is cooling down.
    #[error("generation unavailable: {0}")]
    Unavailable(String),
}

/// Text produced by one model of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    pub alias: String,
}

pub struct GenerationChain {
    models: Vec<ModelEntry>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl GenerationChain {
    pub fn new(models: Vec<ModelEntry>, cooldown: Duration, timeout: Duration) -> Self {
        Self {
            models,
            breaker: CircuitBreaker::new(cooldown),
            timeout,
        }
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.alias.as_str()).collect()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Try each available model in order until one answers.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Generated, GenerationError> {
        let mut failures = Vec::new();

        for entry in &self.models {
            if !self.breaker.is_available(&entry.alias) {
                debug!(
                    model = %entry.alias,
                    reason = ?self.breaker.cooldown_reason(&entry.alias),
                    "skipping model on cooldown"
                );
                failures.push(format!("{} is cooling down", entry.alias));
                continue;
            }

            let outcome =
                tokio::time::timeout(self.timeout, entry.client.generate(request)).await;
            let (err, reason) = match outcome {
                Ok(Ok(text)) => {
                    self.breaker.record_success(&entry.alias);
                    if !failures.is_empty() {
                        info!(model = %entry.alias, "answered after fallback");
                    }
                    return Ok(Generated {
                        text,
                        alias: entry.alias.clone(),
                    });
                }
                Ok(Err(err)) => {
                    let reason = CooldownReason::from_error(&err);
                    (err.to_string(), reason)
                }
                Err(_) => (
                    format!("timed out after {} ms", self.timeout.as_millis()),
                    CooldownReason::Unreachable,
                ),
            };

            warn!(
                model = %entry.alias,
                provider = entry.client.name(),
                error = %err,
                "generation failed, trying next model"
            );
            self.breaker.record_failure(&entry.alias, reason);
            failures.push(format!("{}: {}", entry.alias, err));
        }

        if failures.is_empty() {
            failures.push("no models configured".to_string());
        }
        Err(GenerationError::Unavailable(failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        answer: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(answer: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed-model"
        }

        async fn generate(&self, _request: &GenerationRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.map(str::to_string).ok_or(ProviderError::ApiError {
                status: 503,
                message: "model not loaded".to_string(),
            })
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            system: "system".to_string(),
            messages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn falls_back_to_next_model() {
        let broken = FixedProvider::new(None);
        let working = FixedProvider::new(Some("answer"));
        let chain = GenerationChain::new(
            vec![
                ModelEntry::new("qwen", broken.clone()),
                ModelEntry::new("deepseek", working.clone()),
            ],
            Duration::from_secs(60),
            Duration::from_secs(1),
        );

        let generated = chain.generate(&request()).await.unwrap();
        assert_eq!(generated.alias, "deepseek");
        assert_eq!(generated.text, "answer");

        // the broken model is now skipped
        chain.generate(&request()).await.unwrap();
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(working.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn all_models_failing_is_unavailable() {
        let chain = GenerationChain::new(
            vec![
                ModelEntry::new("qwen", FixedProvider::new(None)),
                ModelEntry::new("deepseek", FixedProvider::new(None)),
            ],
            Duration::from_secs(60),
            Duration::from_secs(1),
        );
        let err = chain.generate(&request()).await.unwrap_err();
        let GenerationError::Unavailable(reason) = err;
        assert!(reason.contains("qwen: API error (503): model not loaded"));
        assert!(reason.contains("deepseek"));

        let err = chain.generate(&request()).await.unwrap_err();
        assert_eq!(
            err,
            GenerationError::Unavailable(
                "qwen is cooling down; deepseek is cooling down".to_string()
            )
        );
    }

    #[tokio::test]
    async fn empty_chain_is_unavailable() {
        let chain = GenerationChain::new(Vec::new(), Duration::ZERO, Duration::from_secs(1));
        assert!(chain.generate(&request()).await.is_err());
    }
}
