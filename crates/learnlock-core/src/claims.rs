//! ClaimPipeline: generation, garbage filter, sharpness filter.
//!
//! The duel is only as fair as its claims. Generation asks the capability for
//! conceptual, falsifiable statements; two deterministic passes then throw out
//! what cannot be argued with.

use std::collections::HashSet;

use crate::capability::{call_with_retry, RetryPolicy};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{truncate_chars, Claim, ConceptDraft};
use crate::traits::{CandidateClaim, ClaimRequest, DuelCapability, TaskKind};

/// Predicates describing runtime state rather than behaviour.
const STATEFUL_PHRASES: &[&str] = &[
    "is running",
    "be running",
    "are running",
    "is active",
    "be active",
    "is enabled",
    "is started",
    "is online",
    "is loaded",
    "is stopped",
    "is idle",
    "is alive",
    "is up and running",
];

/// Hedge predicates that assert nothing checkable.
const VAGUE_PHRASES: &[&str] = &[
    "is useful",
    "is important",
    "is helpful",
    "is powerful",
    "is good",
    "is beneficial",
    "is essential",
    "is valuable",
    "is great",
    "is nice",
    "is convenient",
    "is significant",
    "is crucial",
    "plays a role",
    "plays an important role",
    "is widely used",
];

/// Verbs and objects a tautology is assembled from (stemmed).
const GENERIC_WORDS: &[&str] = &[
    "process", "handle", "do", "perform", "work", "run", "operate", "serve", "execute",
    "request", "data", "thing", "task", "operation", "input", "output", "information",
    "job", "function", "stuff", "it",
];

/// Catch-all verbs that fit almost anything (stemmed).
const BLURRY_VERBS: &[&str] = &[
    "handle",
    "manage",
    "support",
    "provide",
    "enable",
    "facilitate",
    "help",
    "allow",
    "involve",
    "affect",
    "improve",
    "deal",
    "concern",
];

/// Words that tie a claim to a mechanism, requirement, or limit.
const MECHANISM_MARKERS: &[&str] = &[
    "by", "via", "using", "through", "because", "when", "unless", "if", "only", "cannot",
    "can't", "never", "must", "requires", "require", "before", "after", "instead", "rather",
    "than", "without", "per", "against", "with", "from", "into", "onto", "over", "across",
    "within", "under", "until", "while", "whenever", "whose",
];

const STOPWORDS: &[&str] = &["the", "a", "an", "of", "to", "and", "or", "in", "on", "for", "is", "are"];

/// Why a candidate was thrown out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    /// Describes a runtime state ("is running").
    Stateful(&'static str),
    /// Restates the concept name as its own predicate.
    Tautology,
    /// Relies on a hedge predicate ("is useful").
    Vague(&'static str),
    /// Technically true but unfalsifiable ("handles security").
    Blurry(&'static str),
    Duplicate,
}

/// Result of both filter passes over a candidate batch.
#[derive(Debug, Default)]
pub struct Vetted {
    pub kept: Vec<Claim>,
    pub rejected: Vec<(CandidateClaim, Rejection)>,
}

fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    format!(" {normalized} ").contains(&format!(" {phrase} "))
}

/// Crude plural/third-person stripping; enough to line up "processes" with "process".
fn stem(word: &str) -> String {
    if let Some(base) = word.strip_suffix("sses") {
        return format!("{base}ss");
    }
    if let Some(base) = word.strip_suffix("ies") {
        return format!("{base}y");
    }
    if let Some(base) = word.strip_suffix("es") {
        if base.ends_with('x') || base.ends_with("ch") || base.ends_with("sh") {
            return base.to_string();
        }
    }
    match word.strip_suffix('s') {
        Some(base) if !base.ends_with('s') && !base.is_empty() => base.to_string(),
        _ => word.to_string(),
    }
}

fn content_stems(normalized: &str) -> Vec<String> {
    normalized
        .split(' ')
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(w))
        .map(stem)
        .collect()
}

fn is_tautology(concept_name: &str, normalized: &str) -> bool {
    let concept: HashSet<String> = content_stems(&normalize(concept_name)).into_iter().collect();
    if concept.is_empty() {
        return false;
    }
    let mut mentions_concept = false;
    for word in content_stems(normalized) {
        if concept.contains(&word) {
            mentions_concept = true;
        } else if !GENERIC_WORDS.contains(&word.as_str()) {
            return false;
        }
    }
    mentions_concept
}

/// Pass 2: deterministic rejection patterns.
pub fn garbage_filter(concept_name: &str, text: &str) -> Result<(), Rejection> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return Err(Rejection::Empty);
    }
    if let Some(p) = STATEFUL_PHRASES
        .iter()
        .copied()
        .find(|p| contains_phrase(&normalized, p))
    {
        return Err(Rejection::Stateful(p));
    }
    if is_tautology(concept_name, &normalized) {
        return Err(Rejection::Tautology);
    }
    if let Some(p) = VAGUE_PHRASES
        .iter()
        .copied()
        .find(|p| contains_phrase(&normalized, p))
    {
        return Err(Rejection::Vague(p));
    }
    Ok(())
}

/// Pass 3: reject catch-all predicates that name no mechanism, requirement, or boundary.
pub fn sharpness_filter(text: &str) -> Result<(), Rejection> {
    let normalized = normalize(text);
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
    if words.len() < 3 {
        return Err(Rejection::Blurry("too short to falsify"));
    }
    let has_marker = words.iter().any(|w| MECHANISM_MARKERS.contains(w));
    if has_marker {
        return Ok(());
    }
    for word in &words {
        let stemmed = stem(word);
        if let Some(verb) = BLURRY_VERBS.iter().copied().find(|v| *v == stemmed) {
            return Err(Rejection::Blurry(verb));
        }
    }
    Ok(())
}

/// Run both filter passes and drop duplicates, keeping generation order.
pub fn vet(concept_name: &str, candidates: Vec<CandidateClaim>) -> Vetted {
    let mut vetted = Vetted::default();
    let mut seen = HashSet::new();

    for candidate in candidates {
        let verdict = garbage_filter(concept_name, &candidate.text)
            .and_then(|()| sharpness_filter(&candidate.text))
            .and_then(|()| {
                if seen.insert(normalize(&candidate.text)) {
                    Ok(())
                } else {
                    Err(Rejection::Duplicate)
                }
            });
        match verdict {
            Ok(()) => vetted.kept.push(candidate.into()),
            Err(reason) => {
                tracing::debug!(claim = %candidate.text, ?reason, "claim rejected");
                vetted.rejected.push((candidate, reason));
            }
        }
    }
    vetted
}

/// Turns raw source text for one concept into a vetted claim list.
#[derive(Debug, Clone)]
pub struct ClaimPipeline {
    min_viable: usize,
    max_claims: usize,
    content_max_chars: usize,
    policy: RetryPolicy,
}

impl ClaimPipeline {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            min_viable: config.min_viable_claims.max(1),
            max_claims: config.max_claims_per_concept,
            content_max_chars: config.content_max_chars,
            policy: RetryPolicy::from_config(config),
        }
    }

    /// Generate and vet claims. Regenerates once if too few survive, then
    /// fails the concept.
    pub async fn run(
        &self,
        capability: &dyn DuelCapability,
        draft: &ConceptDraft,
    ) -> Result<Vec<Claim>, EngineError> {
        if draft.text.trim().is_empty() {
            return Err(EngineError::Ingestion {
                concept: draft.name.clone(),
                surviving: 0,
                required: self.min_viable,
            });
        }

        let request = ClaimRequest {
            concept_name: draft.name.clone(),
            question: draft.question.clone(),
            source_text: truncate_chars(&draft.text, self.content_max_chars),
        };

        let request = &request;
        let mut best = 0;
        for attempt in 1..=2 {
            let candidates = call_with_retry(TaskKind::GenerateClaims, &self.policy, move || {
                capability.generate_claims(request)
            })
            .await?;
            let generated = candidates.len();
            let mut vetted = vet(&draft.name, candidates);

            tracing::debug!(
                concept = %draft.name,
                attempt,
                generated,
                kept = vetted.kept.len(),
                "claims vetted"
            );

            if vetted.kept.len() >= self.min_viable {
                vetted.kept.truncate(self.max_claims);
                return Ok(vetted.kept);
            }
            best = best.max(vetted.kept.len());
            tracing::warn!(
                concept = %draft.name,
                attempt,
                surviving = vetted.kept.len(),
                required = self.min_viable,
                "too few claims survived filtering"
            );
        }

        Err(EngineError::Ingestion {
            concept: draft.name.clone(),
            surviving: best,
            required: self.min_viable,
        })
    }
}
