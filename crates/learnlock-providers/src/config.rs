//! Provider configuration and factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use learnlock_core::capability::LlmCapability;
use learnlock_core::traits::LlmProvider;
use learnlock_core::EngineConfig;

use crate::anthropic::AnthropicProvider;
use crate::fallback::FallbackProvider;
use crate::gemini::GeminiProvider;
use crate::openai::{OpenAiProvider, GROQ_BASE_URL};

const DEFAULT_GROQ_MODEL: &str = "openai/gpt-oss-120b";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Configuration for a single LLM provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Any OpenAI-compatible endpoint. The key may be omitted for a local server.
    OpenAI {
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    Gemini {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key,
                base_url,
                org_id,
                model,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &api_key.as_ref().map(|_| "***"))
                .field("base_url", base_url)
                .field("org_id", org_id)
                .field("model", model)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
                model,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
            ProviderConfig::Gemini {
                api_key: _,
                base_url,
                model,
            } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
        }
    }
}

impl ProviderConfig {
    /// The `type` tag as written in the config file.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::OpenAI { .. } => "openai",
            ProviderConfig::Anthropic { .. } => "anthropic",
            ProviderConfig::Gemini { .. } => "gemini",
        }
    }

    /// Model pinned to this provider, overriding `default_model`.
    pub fn model(&self) -> Option<&str> {
        match self {
            ProviderConfig::OpenAI { model, .. }
            | ProviderConfig::Anthropic { model, .. }
            | ProviderConfig::Gemini { model, .. } => model.as_deref(),
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        match self {
            ProviderConfig::OpenAI { base_url, .. }
            | ProviderConfig::Anthropic { base_url, .. }
            | ProviderConfig::Gemini { base_url, .. } => base_url.as_deref(),
        }
    }

    pub fn has_key(&self) -> bool {
        match self {
            ProviderConfig::OpenAI { api_key, .. } => {
                api_key.as_deref().is_some_and(|k| !k.is_empty())
            }
            ProviderConfig::Anthropic { api_key, .. } | ProviderConfig::Gemini { api_key, .. } => {
                !api_key.is_empty()
            }
        }
    }

    fn set_model(&mut self, value: String) {
        match self {
            ProviderConfig::OpenAI { model, .. }
            | ProviderConfig::Anthropic { model, .. }
            | ProviderConfig::Gemini { model, .. } => *model = Some(value),
        }
    }
}

/// Top-level learnlock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnlockConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Provider tried first.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Model used by providers that do not pin their own.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Providers tried, in order, after the default one fails.
    #[serde(default = "default_fallback")]
    pub fallback: Vec<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Where concepts and schedules are stored.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}
fn default_fallback() -> Vec<String> {
    vec!["groq".to_string()]
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_data_dir() -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(".learnlock"))
        .unwrap_or_else(|_| PathBuf::from(".learnlock"))
}

impl Default for LearnlockConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            fallback: default_fallback(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            data_dir: default_data_dir(),
            engine: EngineConfig::default(),
        }
    }
}

impl LearnlockConfig {
    /// Provider names in the order they will be tried, keeping only configured ones.
    pub fn provider_chain(&self) -> Vec<&str> {
        let mut chain: Vec<&str> = Vec::new();
        for name in std::iter::once(&self.default_provider).chain(self.fallback.iter()) {
            if self.providers.contains_key(name) && !chain.contains(&name.as_str()) {
                chain.push(name);
            }
        }
        chain
    }
}

/// Resolve `${VAR_NAME}` references in a string.
fn resolve_env_vars(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = lookup(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_provider_config(
    config: &ProviderConfig,
    lookup: &impl Fn(&str) -> Option<String>,
) -> ProviderConfig {
    let resolve = |s: &String| resolve_env_vars(s, lookup);
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
            model,
        } => ProviderConfig::OpenAI {
            api_key: api_key.as_ref().map(resolve),
            base_url: base_url.as_ref().map(resolve),
            org_id: org_id.as_ref().map(resolve),
            model: model.clone(),
        },
        ProviderConfig::Anthropic {
            api_key,
            base_url,
            model,
        } => ProviderConfig::Anthropic {
            api_key: resolve(api_key),
            base_url: base_url.as_ref().map(resolve),
            model: model.clone(),
        },
        ProviderConfig::Gemini {
            api_key,
            base_url,
            model,
        } => ProviderConfig::Gemini {
            api_key: resolve(api_key),
            base_url: base_url.as_ref().map(resolve),
            model: model.clone(),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `learnlock.toml` in the current directory
/// 2. `~/.config/learnlock/config.toml`
///
/// Environment overrides are applied on top; see [`apply_env_overrides`].
pub fn load_config() -> Result<LearnlockConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<LearnlockConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("learnlock.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let config = match &config_path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => LearnlockConfig::default(),
    };

    finish_config(config, |name| std::env::var(name).ok())
}

/// Parse a config document without applying any environment overrides.
pub fn parse_config_str(content: &str) -> Result<LearnlockConfig> {
    Ok(toml::from_str::<LearnlockConfig>(content)?)
}

fn finish_config(
    mut config: LearnlockConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<LearnlockConfig> {
    apply_env_overrides(&mut config, &lookup)?;

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v, &lookup)))
        .collect();

    config
        .engine
        .validate()
        .context("invalid [engine] configuration")?;
    Ok(config)
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        _ => Ok(None),
    }
}

/// Apply environment overrides.
///
/// `GROQ_API_KEY`, `GEMINI_API_KEY`, `OPENAI_API_KEY` and `ANTHROPIC_API_KEY`
/// add (or re-key) the provider of the same name. `LEARNLOCK_*` variables
/// override the matching LLM, storage, and engine settings.
pub fn apply_env_overrides(
    config: &mut LearnlockConfig,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let key = |name: &str| lookup(name).filter(|k| !k.trim().is_empty());

    if let Some(key) = key("GROQ_API_KEY") {
        let entry = config
            .providers
            .entry("groq".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: None,
                base_url: Some(GROQ_BASE_URL.to_string()),
                org_id: None,
                model: Some(DEFAULT_GROQ_MODEL.to_string()),
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = Some(key);
        }
    }

    if let Some(key) = key("GEMINI_API_KEY") {
        let entry = config
            .providers
            .entry("gemini".into())
            .or_insert(ProviderConfig::Gemini {
                api_key: String::new(),
                base_url: None,
                model: Some(DEFAULT_GEMINI_MODEL.to_string()),
            });
        if let ProviderConfig::Gemini { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Some(key) = key("OPENAI_API_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: None,
                base_url: None,
                org_id: None,
                model: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = Some(key);
        }
    }

    if let Some(key) = key("ANTHROPIC_API_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
                model: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Some(model) = key("LEARNLOCK_GROQ_MODEL") {
        if let Some(p) = config.providers.get_mut("groq") {
            p.set_model(model);
        }
    }
    if let Some(model) = key("LEARNLOCK_GEMINI_MODEL") {
        if let Some(p) = config.providers.get_mut("gemini") {
            p.set_model(model.clone());
        }
        if config.default_provider == "gemini" {
            config.default_model = model;
        }
    }

    if let Some(dir) = key("LEARNLOCK_DATA_DIR") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(v) = parse_var(lookup, "LEARNLOCK_LLM_MAX_TOKENS")? {
        config.max_tokens = v;
    }
    if let Some(v) = parse_var(lookup, "LEARNLOCK_LLM_TEMPERATURE")? {
        config.temperature = v;
    }

    let engine = &mut config.engine;
    if let Some(v) = parse_var(lookup, "LEARNLOCK_CONTENT_MAX_CHARS")? {
        engine.content_max_chars = v;
    }
    if let Some(v) = parse_var(lookup, "LEARNLOCK_SM2_INITIAL_EASE")? {
        engine.initial_ease = v;
    }
    if let Some(v) = parse_var(lookup, "LEARNLOCK_SM2_INITIAL_INTERVAL")? {
        engine.initial_interval = v;
    }
    if let Some(v) = parse_var(lookup, "LEARNLOCK_SM2_MIN_EASE")? {
        engine.min_ease = v;
    }
    if let Some(v) = parse_var(lookup, "LEARNLOCK_SM2_MAX_INTERVAL")? {
        engine.max_interval = v;
    }
    if let Some(v) = parse_var(lookup, "LEARNLOCK_MASTERY_MIN_EASE")? {
        engine.mastery_min_ease = v;
    }
    if let Some(v) = parse_var(lookup, "LEARNLOCK_MASTERY_MIN_REVIEWS")? {
        engine.mastery_min_reviews = v;
    }
    if let Some(v) = parse_var(lookup, "LEARNLOCK_SCORE_PASS_THRESHOLD")? {
        engine.pass_threshold = v;
    }
    if let Some(v) = parse_var(lookup, "LEARNLOCK_DEFAULT_FALLBACK_SCORE")? {
        engine.fallback_score = v;
    }

    Ok(())
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("learnlock"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(name: &str, config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
            ..
        } => Ok(Arc::new(OpenAiProvider::new(
            name,
            api_key.clone(),
            base_url.clone(),
            org_id.clone(),
        )?)),
        ProviderConfig::Anthropic {
            api_key, base_url, ..
        } => {
            if api_key.is_empty() {
                anyhow::bail!("provider '{name}' has an empty api_key");
            }
            Ok(Arc::new(AnthropicProvider::new(api_key, base_url.clone())?))
        }
        ProviderConfig::Gemini {
            api_key, base_url, ..
        } => {
            if api_key.is_empty() {
                anyhow::bail!("provider '{name}' has an empty api_key");
            }
            Ok(Arc::new(GeminiProvider::new(api_key, base_url.clone())?))
        }
    }
}

/// Build the provider chain: the default provider first, then the fallbacks.
pub fn build_provider(config: &LearnlockConfig) -> Result<Arc<dyn LlmProvider>> {
    let chain = config.provider_chain();
    if chain.is_empty() {
        anyhow::bail!(
            "no LLM provider configured; set GROQ_API_KEY or GEMINI_API_KEY, \
             or add a [providers] table to learnlock.toml"
        );
    }

    let mut fallback = FallbackProvider::new();
    for name in chain {
        let provider_config = &config.providers[name];
        let provider = create_provider(name, provider_config)
            .with_context(|| format!("failed to create provider '{name}'"))?;
        debug!(provider = name, model = ?provider_config.model(), "provider added to chain");
        fallback = fallback.push(provider, provider_config.model().map(str::to_string));
    }
    Ok(Arc::new(fallback))
}

/// Build the language-model capability the engine runs on.
pub fn build_capability(config: &LearnlockConfig) -> Result<LlmCapability> {
    Ok(LlmCapability::new(build_provider(config)?, config.default_model.clone())
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn resolve_env_vars_basic() {
        let lookup = env(&[("_LEARNLOCK_TEST_VAR", "hello")]);
        assert_eq!(resolve_env_vars("${_LEARNLOCK_TEST_VAR}", &lookup), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_LEARNLOCK_TEST_VAR}_suffix", &lookup),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${MISSING}", &lookup), "");
        assert_eq!(resolve_env_vars("${unterminated", &lookup), "${unterminated");
    }

    #[test]
    fn default_config() {
        let config = LearnlockConfig::default();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.default_model, "gemini-2.5-flash");
        assert_eq!(config.fallback, vec!["groq".to_string()]);
        assert_eq!(config.temperature, 0.3);
        assert_eq!(config.max_tokens, 2000);
        assert!(config.provider_chain().is_empty());
    }

    #[test]
    fn parse_provider_config() {
        let toml_str = r#"
default_provider = "anthropic"
default_model = "claude-sonnet-4-20250514"
fallback = ["local"]

[providers.anthropic]
type = "anthropic"
api_key = "sk-test"

[providers.local]
type = "openai"
base_url = "http://localhost:11434"
model = "llama3.1"

[engine]
max_interval = 365.0
"#;
        let config = parse_config_str(toml_str).unwrap();
        assert_eq!(config.providers.len(), 2);
        assert!(matches!(
            config.providers.get("anthropic"),
            Some(ProviderConfig::Anthropic { .. })
        ));
        assert_eq!(config.providers["local"].model(), Some("llama3.1"));
        assert!(!config.providers["local"].has_key());
        assert_eq!(config.engine.max_interval, 365.0);
        assert_eq!(config.engine.min_ease, 1.3);
        assert_eq!(config.provider_chain(), vec!["anthropic", "local"]);
    }

    #[test]
    fn debug_masks_keys() {
        let config = ProviderConfig::Gemini {
            api_key: "AIza-secret".into(),
            base_url: None,
            model: None,
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("AIza-secret"));
        assert!(rendered.contains("***"));

        let config = ProviderConfig::OpenAI {
            api_key: Some("gsk-secret".into()),
            base_url: Some(GROQ_BASE_URL.into()),
            org_id: None,
            model: None,
        };
        assert!(!format!("{config:?}").contains("gsk-secret"));
    }

    #[test]
    fn api_keys_from_environment() {
        let config = finish_config(
            LearnlockConfig::default(),
            env(&[
                ("GROQ_API_KEY", "gsk-1"),
                ("GEMINI_API_KEY", "AIza-1"),
                ("LEARNLOCK_GROQ_MODEL", "llama-3.3-70b-versatile"),
            ]),
        )
        .unwrap();

        match &config.providers["groq"] {
            ProviderConfig::OpenAI {
                api_key,
                base_url,
                model,
                ..
            } => {
                assert_eq!(api_key.as_deref(), Some("gsk-1"));
                assert_eq!(base_url.as_deref(), Some(GROQ_BASE_URL));
                assert_eq!(model.as_deref(), Some("llama-3.3-70b-versatile"));
            }
            other => panic!("unexpected groq config: {other:?}"),
        }
        assert_eq!(config.providers["gemini"].kind(), "gemini");
        assert_eq!(config.provider_chain(), vec!["gemini", "groq"]);
    }

    #[test]
    fn engine_overrides_from_environment() {
        let config = finish_config(
            LearnlockConfig::default(),
            env(&[
                ("LEARNLOCK_SM2_MAX_INTERVAL", "90"),
                ("LEARNLOCK_SCORE_PASS_THRESHOLD", "4"),
                ("LEARNLOCK_LLM_TEMPERATURE", "0.0"),
                ("LEARNLOCK_DATA_DIR", "/tmp/ll"),
                ("LEARNLOCK_CONTENT_MAX_CHARS", ""),
            ]),
        )
        .unwrap();
        assert_eq!(config.engine.max_interval, 90.0);
        assert_eq!(config.engine.pass_threshold, 4);
        assert_eq!(config.engine.content_max_chars, 8000);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ll"));
    }

    #[test]
    fn bad_override_is_an_error() {
        let err = finish_config(
            LearnlockConfig::default(),
            env(&[("LEARNLOCK_SM2_MIN_EASE", "lots")]),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("LEARNLOCK_SM2_MIN_EASE"));

        // Parses, but leaves the engine inconsistent.
        assert!(finish_config(
            LearnlockConfig::default(),
            env(&[("LEARNLOCK_DEFAULT_FALLBACK_SCORE", "9")]),
        )
        .is_err());
    }

    #[test]
    fn key_references_are_resolved() {
        let config = parse_config_str(
            r#"
[providers.gemini]
type = "gemini"
api_key = "${MY_GEMINI_KEY}"
"#,
        )
        .unwrap();
        let config = finish_config(config, env(&[("MY_GEMINI_KEY", "AIza-2")])).unwrap();
        match &config.providers["gemini"] {
            ProviderConfig::Gemini { api_key, .. } => assert_eq!(api_key, "AIza-2"),
            other => panic!("unexpected gemini config: {other:?}"),
        }
    }

    #[test]
    fn build_provider_requires_a_configured_provider() {
        let err = build_provider(&LearnlockConfig::default()).err().unwrap();
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    fn empty_key_is_rejected() {
        let config = ProviderConfig::Anthropic {
            api_key: String::new(),
            base_url: None,
            model: None,
        };
        assert!(create_provider("anthropic", &config).is_err());
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config_from(Some(&missing)).is_err());
    }

    #[tokio::test]
    async fn chain_uses_pinned_model() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "pong"}}]
            })))
            .mount(&server)
            .await;

        let mut config = LearnlockConfig {
            default_provider: "local".into(),
            fallback: vec![],
            ..Default::default()
        };
        config.providers.insert(
            "local".into(),
            ProviderConfig::OpenAI {
                api_key: None,
                base_url: Some(server.uri()),
                org_id: None,
                model: Some("llama3.1".into()),
            },
        );

        let provider = build_provider(&config).unwrap();
        let response = provider
            .generate(&learnlock_core::traits::GenerateRequest {
                model: config.default_model.clone(),
                prompt: "ping".into(),
                system_prompt: None,
                max_tokens: 10,
                temperature: 0.0,
            })
            .await
            .unwrap();
        assert_eq!(response.content, "pong");
        assert_eq!(response.model, "llama3.1");
    }
}
