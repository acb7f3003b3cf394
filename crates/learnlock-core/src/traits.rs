//! Trait definitions for the engine's external collaborators.
//!
//! - `LlmProvider`: raw text generation, implemented by `learnlock-providers`.
//! - `DuelCapability`: the three typed operations the engine needs from a
//!   language model. `capability::LlmCapability` adapts any provider to it;
//!   tests substitute deterministic stubs.
//! - `ConceptStore`: load/save of concepts, schedule records, and review history.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::contradiction::ErrorKind;
use crate::error::CapabilityError;
use crate::model::{Claim, ClaimAssessment, ClaimKind, Concept, ReviewRecord};
use crate::scheduler::ScheduleRecord;

// ---------------------------------------------------------------------------
// LLM Provider trait
// ---------------------------------------------------------------------------

/// Trait for LLM backends that turn a prompt into text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "groq").
    fn name(&self) -> &str;

    /// Generate a completion for a prompt.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;
}

/// Request to generate text from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier (e.g. "openai/gpt-oss-120b").
    pub model: String,
    /// The main prompt.
    pub prompt: String,
    /// Optional system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The raw response content.
    pub content: String,
    /// Model that actually generated the response.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ---------------------------------------------------------------------------
// Duel capability trait
// ---------------------------------------------------------------------------

/// The three things the engine asks of a language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    GenerateClaims,
    ClassifyBelief,
    GenerateQuestion,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::GenerateClaims => write!(f, "generate_claims"),
            TaskKind::ClassifyBelief => write!(f, "classify_belief"),
            TaskKind::GenerateQuestion => write!(f, "generate_question"),
        }
    }
}

/// Typed access to the text-generation capability.
///
/// Implementations must return within a bounded time or fail, and must treat
/// a response that does not fit the schema as a failure.
#[async_trait]
pub trait DuelCapability: Send + Sync {
    async fn generate_claims(
        &self,
        request: &ClaimRequest,
    ) -> Result<Vec<CandidateClaim>, CapabilityError>;

    async fn classify_belief(
        &self,
        request: &ClassifyRequest,
    ) -> Result<ClassifyResponse, CapabilityError>;

    async fn generate_question(
        &self,
        request: &QuestionRequest,
    ) -> Result<String, CapabilityError>;
}

/// Request for candidate claims about one concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub concept_name: String,
    pub question: String,
    /// Source text, already truncated to the configured bound.
    pub source_text: String,
}

/// An unvetted claim as generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateClaim {
    pub text: String,
    pub kind: ClaimKind,
}

impl From<CandidateClaim> for Claim {
    fn from(c: CandidateClaim) -> Self {
        Claim::new(c.text.trim(), c.kind)
    }
}

/// One question/answer exchange already played in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

/// Request to classify the learner's answer against every claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub concept_name: String,
    pub claims: Vec<Claim>,
    /// All answer text given so far in the session.
    pub answer_text: String,
    /// Earlier exchanges, oldest first.
    pub history: Vec<Exchange>,
    /// Notes from the previous belief state, if any.
    #[serde(default)]
    pub prior_notes: Option<String>,
}

/// Per-claim verdicts plus notes for the next question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub assessments: Vec<ClaimAssessment>,
    #[serde(default)]
    pub notes: String,
}

/// Whether a follow-up attacks a gap or scaffolds toward it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStyle {
    Attack,
    Guide,
}

/// Request for the next follow-up question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub concept_name: String,
    pub original_question: String,
    /// The claim the question must target.
    pub target_claim: Claim,
    pub error_kind: ErrorKind,
    pub style: ProbeStyle,
    /// Notes from the belief model for this turn.
    #[serde(default)]
    pub notes: String,
    pub history: Vec<Exchange>,
}

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// Record store for concepts and their schedules.
///
/// The engine never touches storage except through these operations.
pub trait ConceptStore: Send + Sync {
    fn load_concept(&self, id: &str) -> anyhow::Result<Option<Concept>>;

    fn save_concept(&self, concept: &Concept) -> anyhow::Result<()>;

    fn list_concepts(&self) -> anyhow::Result<Vec<Concept>>;

    fn load_schedule(&self, id: &str) -> anyhow::Result<Option<ScheduleRecord>>;

    /// Replace the schedule record for `id` in one step.
    fn save_schedule(&self, id: &str, record: &ScheduleRecord) -> anyhow::Result<()>;

    /// Append a finished duel to the review history.
    fn add_review(&self, review: &ReviewRecord) -> anyhow::Result<()>;

    /// Every stored review, oldest first.
    fn list_reviews(&self) -> anyhow::Result<Vec<ReviewRecord>>;
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// Pull a JSON document out of a model response.
///
/// Handles:
/// - ```json fenced blocks (preferred) and bare ``` blocks
/// - Unclosed fences from truncated responses
/// - Prose around a bare object or array (outermost braces/brackets kept)
pub fn extract_json_from_markdown(response: &str) -> String {
    let mut json_blocks = Vec::new();
    let mut generic_blocks = Vec::new();
    let mut in_block = false;
    let mut is_json_block = false;
    let mut current_block = String::new();

    for line in response.lines() {
        let trimmed = line.trim();

        if !in_block && trimmed.starts_with("```") {
            in_block = true;
            let lang = trimmed.trim_start_matches('`').trim().to_lowercase();
            is_json_block = lang == "json";
            current_block.clear();
            continue;
        }

        if in_block && trimmed == "```" {
            in_block = false;
            if is_json_block {
                json_blocks.push(current_block.clone());
            } else {
                generic_blocks.push(current_block.clone());
            }
            current_block.clear();
            continue;
        }

        if in_block {
            if !current_block.is_empty() {
                current_block.push('\n');
            }
            current_block.push_str(line);
        }
    }

    if in_block && !current_block.is_empty() {
        if is_json_block {
            json_blocks.push(current_block);
        } else {
            generic_blocks.push(current_block);
        }
    }

    if let Some(block) = json_blocks.into_iter().next() {
        return block.trim().to_string();
    }
    if let Some(block) = generic_blocks.into_iter().next() {
        return block.trim().to_string();
    }

    outermost_json(response).unwrap_or_else(|| response.trim().to_string())
}

fn outermost_json(text: &str) -> Option<String> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| text[start..=end].to_string())
}
