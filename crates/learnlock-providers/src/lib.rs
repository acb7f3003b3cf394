//! learnlock-providers — LLM provider integrations.
//!
//! Implements the `LlmProvider` trait for OpenAI-compatible endpoints (OpenAI,
//! Groq, a local Ollama), Anthropic, and Gemini, plus an ordered fallback
//! chain, and loads the `learnlock.toml` configuration that wires them up.

pub mod anthropic;
pub mod config;
pub mod fallback;
pub mod gemini;
mod http;
pub mod mock;
pub mod openai;

pub use config::{
    apply_env_overrides, build_capability, build_provider, create_provider, load_config,
    load_config_from, parse_config_str, LearnlockConfig, ProviderConfig,
};
pub use fallback::FallbackProvider;
pub use learnlock_core::ProviderError;
