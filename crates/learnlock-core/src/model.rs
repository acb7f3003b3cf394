//! Core data model types for learnlock.
//!
//! Concepts and their claims are produced once at ingestion; belief states,
//! turns, and duel results are produced while studying.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contradiction::ErrorKind;
use crate::error::EngineError;
use crate::interrogator::Harshness;

/// Maximum length of a concept's display name, in characters.
pub const MAX_NAME_CHARS: usize = 200;
/// Maximum length of a concept's source quote, in characters.
pub const MAX_QUOTE_CHARS: usize = 500;
/// A duel never runs longer than this many turns.
pub const MAX_TURNS: u8 = 3;

/// What aspect of a concept a claim pins down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimKind {
    /// What the concept is.
    Definition,
    /// How it works internally.
    Mechanism,
    /// What it needs to function.
    Requirement,
    /// What it cannot do or where it fails.
    Boundary,
}

impl ClaimKind {
    /// Mechanism and boundary claims carry the weight of the rubric.
    pub fn is_core(self) -> bool {
        matches!(self, ClaimKind::Mechanism | ClaimKind::Boundary)
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimKind::Definition => write!(f, "definition"),
            ClaimKind::Mechanism => write!(f, "mechanism"),
            ClaimKind::Requirement => write!(f, "requirement"),
            ClaimKind::Boundary => write!(f, "boundary"),
        }
    }
}

impl FromStr for ClaimKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "definition" => Ok(ClaimKind::Definition),
            "mechanism" => Ok(ClaimKind::Mechanism),
            "requirement" => Ok(ClaimKind::Requirement),
            "boundary" | "limitation" => Ok(ClaimKind::Boundary),
            other => Err(format!("unknown claim kind: {other}")),
        }
    }
}

/// A single falsifiable statement about a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub kind: ClaimKind,
}

impl Claim {
    pub fn new(text: impl Into<String>, kind: ClaimKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// Material for one concept before its claims exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptDraft {
    /// Display name.
    pub name: String,
    /// Where the material came from (URL, file, title).
    #[serde(default)]
    pub source: String,
    /// The opening challenge put to the learner.
    pub question: String,
    /// Short verbatim excerpt shown alongside the reveal.
    #[serde(default)]
    pub source_quote: String,
    /// Extracted plain text the claims are derived from.
    pub text: String,
}

impl ConceptDraft {
    /// The challenge used when a concept set supplies none.
    pub fn default_question(name: &str) -> String {
        format!("Explain {name} in your own words.")
    }
}

/// A studied concept with its vetted claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub source: String,
    pub question: String,
    #[serde(default)]
    pub source_quote: String,
    /// Claims in declaration order. Ties between errors break on this order.
    pub claims: Vec<Claim>,
    pub created_at: DateTime<Utc>,
    /// Set aside by the learner; kept out of the due queue until restored.
    #[serde(default)]
    pub skipped: bool,
}

impl Concept {
    /// Finalize a draft with its surviving claims, enforcing length limits.
    pub fn from_draft(draft: &ConceptDraft, claims: Vec<Claim>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: truncate_chars(draft.name.trim(), MAX_NAME_CHARS),
            source: draft.source.clone(),
            question: draft.question.trim().to_string(),
            source_quote: truncate_chars(draft.source_quote.trim(), MAX_QUOTE_CHARS),
            claims,
            created_at: Utc::now(),
            skipped: false,
        }
    }

    pub fn claim(&self, index: usize) -> Option<&Claim> {
        self.claims.get(index)
    }
}

/// Cut `s` to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// How an answer stands relative to one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Satisfied,
    Violated,
    Unaddressed,
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimStatus::Satisfied => write!(f, "satisfied"),
            ClaimStatus::Violated => write!(f, "violated"),
            ClaimStatus::Unaddressed => write!(f, "unaddressed"),
        }
    }
}

/// The verdict for one claim within a belief state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimAssessment {
    /// Index into the concept's claims.
    pub claim: usize,
    pub status: ClaimStatus,
    #[serde(default)]
    pub justification: String,
    /// Another claim the answer blurred this one with.
    #[serde(default)]
    pub conflated_with: Option<usize>,
}

/// Inferred map of what the learner believes after one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeliefState {
    pub turn: u8,
    /// One assessment per claim, in claim order.
    pub assessments: Vec<ClaimAssessment>,
    /// Free-text notes feeding the next question.
    #[serde(default)]
    pub notes: String,
}

impl BeliefState {
    /// Every claim unaddressed. Used for abstentions and empty answers.
    pub fn unaddressed(turn: u8, claim_count: usize, notes: impl Into<String>) -> Self {
        Self {
            turn,
            assessments: (0..claim_count)
                .map(|claim| ClaimAssessment {
                    claim,
                    status: ClaimStatus::Unaddressed,
                    justification: String::new(),
                    conflated_with: None,
                })
                .collect(),
            notes: notes.into(),
        }
    }

    pub fn status(&self, claim: usize) -> Option<ClaimStatus> {
        self.assessments
            .iter()
            .find(|a| a.claim == claim)
            .map(|a| a.status)
    }

    pub fn count(&self, status: ClaimStatus) -> usize {
        self.assessments.iter().filter(|a| a.status == status).count()
    }

    pub fn satisfied_count(&self) -> usize {
        self.count(ClaimStatus::Satisfied)
    }

    pub fn all_satisfied(&self) -> bool {
        !self.assessments.is_empty() && self.satisfied_count() == self.assessments.len()
    }

    /// One-word summary used when printing a trajectory.
    pub fn label(&self) -> &'static str {
        let satisfied = self.satisfied_count();
        if self.all_satisfied() {
            "solid"
        } else if satisfied > 0 {
            "partial"
        } else if self.count(ClaimStatus::Violated) > 0 {
            "wrong"
        } else {
            "vague"
        }
    }
}

/// Phrases that count as declaring "I don't know".
const ABSTAIN_PHRASES: &[&str] = &[
    "i don't know",
    "i dont know",
    "i do not know",
    "idk",
    "no idea",
    "dunno",
    "i have no idea",
    "not sure",
    "i'm not sure",
    "im not sure",
    "no clue",
    "?",
];

/// A learner's reply for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum Answer {
    Text(String),
    Abstained,
}

impl Answer {
    /// Classify raw input. Blank input is not an answer.
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidAnswer);
        }
        let normalized = trimmed
            .trim_end_matches(['.', '!'])
            .trim()
            .to_lowercase()
            .replace('’', "'");
        if ABSTAIN_PHRASES.contains(&normalized.as_str()) {
            return Ok(Answer::Abstained);
        }
        Ok(Answer::Text(trimmed.to_string()))
    }

    pub fn is_abstained(&self) -> bool {
        matches!(self, Answer::Abstained)
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Answer::Text(t) => Some(t),
            Answer::Abstained => None,
        }
    }
}

/// One completed turn of a duel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub number: u8,
    /// The question this turn answered.
    pub question: String,
    pub answer: Answer,
    pub belief: BeliefState,
    pub harshness: Harshness,
}

/// Why a duel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    /// No error was visible under the turn's harshness.
    AllClaimsSatisfied,
    /// The last turn was used.
    TurnsExhausted,
    /// The caller ended the session early.
    Abandoned,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::AllClaimsSatisfied => write!(f, "all-claims-satisfied"),
            TerminationReason::TurnsExhausted => write!(f, "turns-exhausted"),
            TerminationReason::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Terminal record of a duel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuelResult {
    pub session_id: Uuid,
    pub concept_id: String,
    /// Belief states in turn order.
    pub trajectory: Vec<BeliefState>,
    pub claims_satisfied: usize,
    pub total_claims: usize,
    /// Final score, 1-5.
    pub score: u8,
    pub termination: TerminationReason,
    /// Distinct error kinds detected anywhere in the trajectory, by severity.
    pub errors_surfaced: Vec<ErrorKind>,
    /// Classification could not complete; the score is the configured fallback.
    #[serde(default)]
    pub indeterminate: bool,
}

impl DuelResult {
    /// "vague -> partial -> solid" style summary.
    pub fn trajectory_summary(&self) -> String {
        self.trajectory
            .iter()
            .map(BeliefState::label)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// A finished duel as kept in the review history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: String,
    pub concept_id: String,
    pub reviewed_at: DateTime<Utc>,
    pub score: u8,
    pub termination: TerminationReason,
    #[serde(default)]
    pub indeterminate: bool,
    /// Claim texts satisfied in the final state.
    #[serde(default)]
    pub covered: Vec<String>,
    /// Claim texts left unaddressed or violated in the final state.
    #[serde(default)]
    pub missed: Vec<String>,
    #[serde(default)]
    pub errors_surfaced: Vec<ErrorKind>,
}

impl ReviewRecord {
    pub fn from_result(concept: &Concept, result: &DuelResult, now: DateTime<Utc>) -> Self {
        let mut covered = Vec::new();
        let mut missed = Vec::new();
        if let Some(last) = result.trajectory.last() {
            for (index, claim) in concept.claims.iter().enumerate() {
                match last.status(index) {
                    Some(ClaimStatus::Satisfied) => covered.push(claim.text.clone()),
                    _ => missed.push(claim.text.clone()),
                }
            }
        }
        Self {
            id: Uuid::new_v4().to_string(),
            concept_id: result.concept_id.clone(),
            reviewed_at: now,
            score: result.score,
            termination: result.termination,
            indeterminate: result.indeterminate,
            covered,
            missed,
            errors_surfaced: result.errors_surfaced.clone(),
        }
    }
}

/// Human label for a score.
pub fn score_label(score: u8) -> &'static str {
    match score {
        5 => "Perfect",
        4 => "Great",
        3 => "Good",
        2 => "Getting There",
        _ => "Needs Work",
    }
}
