//! OpenAI-compatible chat completions provider.
//!
//! Also serves Groq (`https://api.groq.com/openai`) and a local Ollama
//! (`http://localhost:11434`), both of which expose `/v1/chat/completions`.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use learnlock_core::traits::{GenerateRequest, GenerateResponse, LlmProvider, TokenUsage};
use learnlock_core::ProviderError;

use crate::http::{build_client, check_status, parse_error, send_error, DEFAULT_TIMEOUT_SECS};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Provider for any endpoint speaking the OpenAI chat completions protocol.
pub struct OpenAiProvider {
    name: String,
    api_key: Option<String>,
    base_url: String,
    org_id: Option<String>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// `name` is how the provider reports itself (e.g. "groq"). An empty or
    /// absent key sends no `Authorization` header.
    pub fn new(
        name: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
        org_id: Option<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            name: name.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: base_url
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            org_id,
            client: build_client(DEFAULT_TIMEOUT_SECS)?,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, request), fields(provider = %self.name, model = %request.model))]
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let start = Instant::now();

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages,
        };

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("content-type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        if let Some(org) = &self.org_id {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, DEFAULT_TIMEOUT_SECS))?;
        let response = check_status(response, &request.model).await?;
        let api_response: ChatResponse = response.json().await.map_err(parse_error)?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::EmptyResponse(self.name.clone()))?;

        Ok(GenerateResponse {
            content,
            model: api_response.model.unwrap_or_else(|| request.model.clone()),
            token_usage: TokenUsage {
                prompt_tokens: api_response.usage.prompt_tokens,
                completion_tokens: api_response.usage.completion_tokens,
                total_tokens: api_response.usage.total_tokens,
            },
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}
