//! Capability calls: bounded retries, and an `LlmProvider` adapter.
//!
//! Every call the engine makes to the language model goes through
//! [`call_with_retry`], which bounds each attempt in time and retries a failed
//! call once (never a permanent provider error). A rate-limited attempt waits
//! out the provider's delay before the retry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::EngineConfig;
use crate::error::{CapabilityError, EngineError};
use crate::traits::{
    extract_json_from_markdown, CandidateClaim, ClaimRequest, ClassifyRequest, ClassifyResponse,
    DuelCapability, Exchange, GenerateRequest, LlmProvider, ProbeStyle, QuestionRequest, TaskKind,
};

/// Longest rate-limit wait honoured before a retry.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Time bound and retry budget for capability calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub retries: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            timeout: config.capability_timeout(),
            retries: config.capability_retries,
        }
    }
}

/// Run one capability call under `policy`, mapping the final failure to
/// [`EngineError::Capability`].
pub async fn call_with_retry<T, F, Fut>(
    task: TaskKind,
    policy: &RetryPolicy,
    mut call: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let mut last_error: Option<CapabilityError> = None;
    for attempt in 0..=policy.retries {
        if let Some(delay) = last_error.as_ref().and_then(CapabilityError::retry_after) {
            let delay = delay.min(MAX_RETRY_DELAY);
            tracing::info!(%task, delay_ms = delay.as_millis() as u64, "rate limited, waiting before retry");
            tokio::time::sleep(delay).await;
        }
        let outcome = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout(policy.timeout.as_secs())),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(%task, attempt = attempt + 1, error = %e, "capability call failed");
                let permanent = e.is_permanent();
                last_error = Some(e);
                if permanent {
                    break;
                }
            }
        }
    }

    Err(EngineError::Capability {
        task,
        message: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".into()),
    })
}

// ---------------------------------------------------------------------------
// LLM-backed capability
// ---------------------------------------------------------------------------

const CLAIMS_SYSTEM: &str = "You extract the conceptual truths a learner must hold about a concept. \
You never paraphrase the transcript. Every statement you produce is falsifiable: it says WHY or HOW \
something works, what it requires, or where it stops working. Respond ONLY with JSON.";

const CLASSIFY_SYSTEM: &str = "You are a strict examiner. You infer what a student believes from \
their own words and compare it against reference claims. Vague language never satisfies a claim. \
An empty or off-topic answer leaves every claim unaddressed. Respond ONLY with JSON.";

const QUESTION_SYSTEM: &str = "You are a Socratic interrogator. You ask exactly one pointed question \
that cannot be answered vaguely. Respond ONLY with JSON.";

/// Adapts a raw [`LlmProvider`] to the typed [`DuelCapability`].
pub struct LlmCapability {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl LlmCapability {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.3,
            max_tokens: 2000,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    async fn complete(&self, system: &str, prompt: String) -> Result<String, CapabilityError> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt,
            system_prompt: Some(system.to_string()),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let response = self
            .provider
            .generate(&request)
            .await
            .map_err(CapabilityError::from_provider)?;
        tracing::debug!(
            provider = self.provider.name(),
            model = %response.model,
            latency_ms = response.latency_ms,
            tokens = response.token_usage.total_tokens,
            "completion received"
        );
        Ok(response.content)
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T, CapabilityError> {
    let json = extract_json_from_markdown(content);
    serde_json::from_str(&json).map_err(|e| CapabilityError::Malformed(e.to_string()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClaimsWire {
    Wrapped { claims: Vec<CandidateClaim> },
    Bare(Vec<CandidateClaim>),
}

#[derive(Deserialize)]
struct QuestionWire {
    question: String,
}

fn render_history(history: &[Exchange]) -> String {
    if history.is_empty() {
        return "(none)".to_string();
    }
    history
        .iter()
        .map(|e| format!("Q: {}\nA: {}", e.question, e.answer))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn claims_prompt(request: &ClaimRequest) -> String {
    format!(
        r#"CONCEPT: {name}
CHALLENGE QUESTION: {question}

SOURCE:
{source}

Produce 3-6 claims about {name}. Each claim is one sentence a student could get wrong.
Tag each with a kind:
- definition: what the concept is
- mechanism: how it works internally
- requirement: what it needs to function
- boundary: what it cannot do or where it fails

Rules:
- State WHY or HOW, never "is useful", "is important", "handles X", "manages X"
- No claims about runtime state ("is running", "is active")
- Do not restate the concept name as its own predicate

Return ONLY valid JSON:
{{"claims": [{{"text": "...", "kind": "mechanism"}}]}}"#,
        name = request.concept_name,
        question = request.question,
        source = request.source_text,
    )
}

fn classify_prompt(request: &ClassifyRequest) -> String {
    let claims = request
        .claims
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{i}] ({}) {}", c.kind, c.text))
        .collect::<Vec<_>>()
        .join("\n");
    let prior = request.prior_notes.as_deref().unwrap_or("(none)");
    format!(
        r#"CONCEPT: {name}

REFERENCE CLAIMS:
{claims}

CONVERSATION SO FAR:
{history}

PREVIOUS NOTES: {prior}

EVERYTHING THE STUDENT HAS SAID:
"{answer}"

For every claim decide whether the student's words:
- "satisfied": explicitly or substantively cover it
- "violated": contradict it or assert something inconsistent with it
- "unaddressed": do not speak to it
If the student blurs this claim together with another one, set "conflated_with" to that claim's index.

Return ONLY valid JSON with one entry per claim:
{{"assessments": [{{"claim": 0, "status": "unaddressed", "justification": "short reason", "conflated_with": null}}],
  "notes": "one sentence on the biggest gap"}}"#,
        name = request.concept_name,
        history = render_history(&request.history),
        answer = request.answer_text,
    )
}

fn question_prompt(request: &QuestionRequest) -> String {
    let stance = match request.style {
        ProbeStyle::Attack => {
            "Attack the gap directly. Force the student to confront what they got wrong or left out."
        }
        ProbeStyle::Guide => {
            "The student said they don't know. Do not punish them: give a small hint and ask a \
             guiding question that leads them one step toward the mechanism."
        }
    };
    format!(
        r#"CONCEPT: {name}
ORIGINAL QUESTION: {original}
GAP ({kind}): {claim}
NOTES: {notes}

CONVERSATION SO FAR:
{history}

{stance}
Never reveal the claim verbatim.

Return ONLY valid JSON:
{{"question": "..."}}"#,
        name = request.concept_name,
        original = request.original_question,
        kind = request.error_kind,
        claim = request.target_claim.text,
        notes = request.notes,
        history = render_history(&request.history),
    )
}

#[async_trait]
impl DuelCapability for LlmCapability {
    async fn generate_claims(
        &self,
        request: &ClaimRequest,
    ) -> Result<Vec<CandidateClaim>, CapabilityError> {
        let content = self.complete(CLAIMS_SYSTEM, claims_prompt(request)).await?;
        match parse_json::<ClaimsWire>(&content)? {
            ClaimsWire::Wrapped { claims } | ClaimsWire::Bare(claims) => Ok(claims),
        }
    }

    async fn classify_belief(
        &self,
        request: &ClassifyRequest,
    ) -> Result<ClassifyResponse, CapabilityError> {
        let content = self
            .complete(CLASSIFY_SYSTEM, classify_prompt(request))
            .await?;
        parse_json(&content)
    }

    async fn generate_question(
        &self,
        request: &QuestionRequest,
    ) -> Result<String, CapabilityError> {
        let content = self
            .complete(QUESTION_SYSTEM, question_prompt(request))
            .await?;
        let wire: QuestionWire = parse_json(&content)?;
        let question = wire.question.trim().trim_matches('"').to_string();
        if question.is_empty() {
            return Err(CapabilityError::Malformed("empty question".into()));
        }
        Ok(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use crate::error::ProviderError;
    use crate::model::{Claim, ClaimKind, ClaimStatus};
    use crate::traits::{GenerateResponse, TokenUsage};

    struct CannedProvider {
        replies: Mutex<Vec<anyhow::Result<String>>>,
        calls: AtomicU32,
    }

    impl CannedProvider {
        fn new(replies: Vec<anyhow::Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let content = self.replies.lock().unwrap().remove(0)?;
            Ok(GenerateResponse {
                content,
                model: request.model.clone(),
                token_usage: TokenUsage::default(),
                latency_ms: 1,
            })
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            retries: 1,
        }
    }

    #[tokio::test]
    async fn parses_fenced_claims() {
        let provider = Arc::new(CannedProvider::new(vec![Ok(
            "```json\n{\"claims\": [{\"text\": \"Splits work via a semaphore\", \"kind\": \"mechanism\"}]}\n```"
                .into(),
        )]));
        let capability = LlmCapability::new(provider, "m");
        let claims = capability
            .generate_claims(&ClaimRequest {
                concept_name: "pool".into(),
                question: "Why?".into(),
                source_text: "text".into(),
            })
            .await
            .unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].kind, ClaimKind::Mechanism);
    }

    #[tokio::test]
    async fn unknown_kind_is_malformed() {
        let provider = Arc::new(CannedProvider::new(vec![Ok(
            "[{\"text\": \"x y z\", \"kind\": \"opinion\"}]".into(),
        )]));
        let capability = LlmCapability::new(provider, "m");
        let err = capability
            .generate_claims(&ClaimRequest {
                concept_name: "pool".into(),
                question: "Why?".into(),
                source_text: "text".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Malformed(_)));
    }

    #[tokio::test]
    async fn classify_reads_statuses() {
        let provider = Arc::new(CannedProvider::new(vec![Ok(r#"{"assessments": [
                {"claim": 0, "status": "violated", "justification": "says FIFO", "conflated_with": null}
            ], "notes": "confuses eviction order"}"#
            .into())]));
        let capability = LlmCapability::new(provider, "m");
        let response = capability
            .classify_belief(&ClassifyRequest {
                concept_name: "LRU".into(),
                claims: vec![Claim::new("Evicts the least recently used key", ClaimKind::Mechanism)],
                answer_text: "It evicts the oldest inserted key".into(),
                history: vec![],
                prior_notes: None,
            })
            .await
            .unwrap();
        assert_eq!(response.assessments[0].status, ClaimStatus::Violated);
        assert_eq!(response.notes, "confuses eviction order");
    }

    #[tokio::test]
    async fn retry_once_then_succeed() {
        let provider = Arc::new(CannedProvider::new(vec![
            Err(ProviderError::NetworkError("reset".into()).into()),
            Ok("{\"question\": \"Why does order matter?\"}".into()),
        ]));
        let capability = LlmCapability::new(provider.clone(), "m");
        let request = QuestionRequest {
            concept_name: "LRU".into(),
            original_question: "Explain LRU".into(),
            target_claim: Claim::new("Evicts the least recently used key", ClaimKind::Mechanism),
            error_kind: crate::contradiction::ErrorKind::WrongMechanism,
            style: ProbeStyle::Attack,
            notes: String::new(),
            history: vec![],
        };
        let (capability, request) = (&capability, &request);
        let question = call_with_retry(TaskKind::GenerateQuestion, &policy(), move || {
            capability.generate_question(request)
        })
        .await
        .unwrap();
        assert_eq!(question, "Why does order matter?");
        assert_eq!(provider.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let provider = Arc::new(CannedProvider::new(vec![
            Err(ProviderError::AuthenticationFailed("bad key".into()).into()),
            Ok("{\"question\": \"unused\"}".into()),
        ]));
        let capability = LlmCapability::new(provider.clone(), "m");
        let request = QuestionRequest {
            concept_name: "LRU".into(),
            original_question: "Explain LRU".into(),
            target_claim: Claim::new("Evicts the least recently used key", ClaimKind::Mechanism),
            error_kind: crate::contradiction::ErrorKind::MissingMechanism,
            style: ProbeStyle::Guide,
            notes: String::new(),
            history: vec![],
        };
        let (capability, request) = (&capability, &request);
        let err = call_with_retry(TaskKind::GenerateQuestion, &policy(), move || {
            capability.generate_question(request)
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Capability {
                task: TaskKind::GenerateQuestion,
                ..
            }
        ));
        assert_eq!(provider.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_before_retry() {
        let provider = Arc::new(CannedProvider::new(vec![
            Err(ProviderError::RateLimited {
                retry_after_ms: 30_000,
            }
            .into()),
            Ok("{\"question\": \"What breaks first?\"}".into()),
        ]));
        let capability = LlmCapability::new(provider.clone(), "m");
        let request = QuestionRequest {
            concept_name: "LRU".into(),
            original_question: "Explain LRU".into(),
            target_claim: Claim::new("Evicts the least recently used key", ClaimKind::Mechanism),
            error_kind: crate::contradiction::ErrorKind::MissingMechanism,
            style: ProbeStyle::Guide,
            notes: String::new(),
            history: vec![],
        };
        let (capability, request) = (&capability, &request);
        let start = tokio::time::Instant::now();
        let question = call_with_retry(TaskKind::GenerateQuestion, &policy(), move || {
            capability.generate_question(request)
        })
        .await
        .unwrap();
        assert_eq!(question, "What breaks first?");
        assert_eq!(provider.calls.load(Ordering::Relaxed), 2);
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[test]
    fn provider_errors_keep_retry_delay() {
        let err = CapabilityError::from_provider(
            ProviderError::RateLimited {
                retry_after_ms: 1500,
            }
            .into(),
        );
        assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));
        assert!(!err.is_permanent());

        let err = CapabilityError::from_provider(ProviderError::NetworkError("reset".into()).into());
        assert_eq!(err.retry_after(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out() {
        let policy = RetryPolicy {
            timeout: Duration::from_secs(1),
            retries: 0,
        };
        let err = call_with_retry(TaskKind::ClassifyBelief, &policy, || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, CapabilityError>(())
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
