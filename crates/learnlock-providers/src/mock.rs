//! Mock provider for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use learnlock_core::traits::{GenerateRequest, GenerateResponse, LlmProvider, TokenUsage};

/// A mock LLM provider for exercising the capability layer without real API calls.
///
/// Returns canned responses keyed by a substring of the prompt.
pub struct MockProvider {
    /// Prompt substring → response text.
    responses: HashMap<String, String>,
    default_response: String,
    call_count: AtomicU32,
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockProvider {
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self {
            responses,
            default_response: "{}".to_string(),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            responses: HashMap::new(),
            default_response: response.to_string(),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap() = Some(request.clone());

        // Longest key wins so that overlapping keys stay deterministic.
        let content = self
            .responses
            .iter()
            .filter(|(key, _)| request.prompt.contains(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        let prompt_tokens = (request.prompt.len() / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32; // Rough estimate

        Ok(GenerateResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: "mock".into(),
            prompt: prompt.into(),
            system_prompt: None,
            max_tokens: 100,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn fixed_response() {
        let provider = MockProvider::with_fixed_response("{\"claims\": []}");
        let response = provider.generate(&request("anything")).await.unwrap();
        assert_eq!(response.content, "{\"claims\": []}");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.last_request().unwrap().prompt, "anything");
    }

    #[tokio::test]
    async fn prompt_matching() {
        let mut responses = HashMap::new();
        responses.insert("claims".to_string(), "{\"claims\": []}".to_string());
        responses.insert(
            "question".to_string(),
            "{\"question\": \"Why?\"}".to_string(),
        );
        responses.insert(
            "follow-up question".to_string(),
            "{\"question\": \"And then?\"}".to_string(),
        );

        let provider = MockProvider::new(responses);

        let resp = provider.generate(&request("Extract claims")).await.unwrap();
        assert!(resp.content.contains("claims"));

        let resp = provider
            .generate(&request("Write one follow-up question"))
            .await
            .unwrap();
        assert!(resp.content.contains("And then?"));

        let resp = provider.generate(&request("unrelated")).await.unwrap();
        assert_eq!(resp.content, "{}");
        assert_eq!(provider.call_count(), 3);
    }
}
