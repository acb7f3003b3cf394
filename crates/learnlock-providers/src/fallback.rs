//! Ordered fallback over several providers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use learnlock_core::traits::{GenerateRequest, GenerateResponse, LlmProvider};

struct Entry {
    provider: Arc<dyn LlmProvider>,
    /// Replaces the request model when set.
    model: Option<String>,
}

/// Tries each provider in order and returns the first success.
///
/// Every failure moves on to the next provider, including permanent ones
/// such as a rejected key. The last error is returned when all fail.
pub struct FallbackProvider {
    entries: Vec<Entry>,
    name: String,
}

impl FallbackProvider {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            name: String::new(),
        }
    }

    /// Append a provider, optionally pinned to its own model.
    pub fn push(mut self, provider: Arc<dyn LlmProvider>, model: Option<String>) -> Self {
        if self.name.is_empty() {
            self.name = provider.name().to_string();
        } else {
            self.name = format!("{}+{}", self.name, provider.name());
        }
        self.entries.push(Entry { provider, model });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FallbackProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for FallbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let mut last_error = None;

        for (index, entry) in self.entries.iter().enumerate() {
            let pinned;
            let attempt = match &entry.model {
                Some(model) => {
                    pinned = GenerateRequest {
                        model: model.clone(),
                        ..request.clone()
                    };
                    &pinned
                }
                None => request,
            };

            match entry.provider.generate(attempt).await {
                Ok(response) => {
                    if index > 0 {
                        info!(provider = entry.provider.name(), "fallback provider succeeded");
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        provider = entry.provider.name(),
                        model = %attempt.model,
                        "provider failed: {e:#}"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no providers configured")))
    }
}
