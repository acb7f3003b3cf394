//! Interrogator: pick the gap to press on and phrase the follow-up.
//!
//! Which errors may trigger a question depends only on the turn number.
//! [`visible_errors`] and [`select`] are pure; only [`Interrogator::question`]
//! talks to the capability.

use serde::{Deserialize, Serialize};

use crate::capability::{call_with_retry, RetryPolicy};
use crate::contradiction::{DetectedError, ErrorKind};
use crate::error::EngineError;
use crate::model::{Answer, Concept};
use crate::traits::{DuelCapability, Exchange, ProbeStyle, QuestionRequest, TaskKind};

/// Per-turn policy on which error kinds may be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Harshness {
    /// Turn 1: clear mechanism violations only.
    Forgiving,
    /// Turn 2: adds boundary errors and conflation.
    Moderate,
    /// Turn 3: everything.
    Strict,
}

impl Harshness {
    pub fn for_turn(turn: u8) -> Self {
        match turn {
            0 | 1 => Harshness::Forgiving,
            2 => Harshness::Moderate,
            _ => Harshness::Strict,
        }
    }

    pub fn admits(self, kind: ErrorKind) -> bool {
        match self {
            Harshness::Forgiving => kind.is_mechanism(),
            Harshness::Moderate => kind != ErrorKind::Superficial,
            Harshness::Strict => true,
        }
    }
}

/// The subset of `errors` the turn's harshness lets through, order kept.
pub fn visible_errors(turn: u8, errors: &[DetectedError]) -> Vec<DetectedError> {
    let harshness = Harshness::for_turn(turn);
    errors
        .iter()
        .filter(|e| harshness.admits(e.kind))
        .cloned()
        .collect()
}

/// What the interrogator wants to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Ask about `target` in the given style.
    Ask {
        target: DetectedError,
        style: ProbeStyle,
    },
    /// Nothing visible is left to ask about.
    Reveal,
}

/// Choose the highest-severity visible error, or reveal.
///
/// `errors` must already be ranked. A mechanism gap behind a declared
/// "I don't know" is scaffolded rather than attacked.
pub fn select(turn: u8, errors: &[DetectedError], answer: &Answer) -> Probe {
    let harshness = Harshness::for_turn(turn);
    let Some(target) = errors.iter().find(|e| harshness.admits(e.kind)) else {
        return Probe::Reveal;
    };
    let style = if answer.is_abstained() && target.kind.is_mechanism() {
        ProbeStyle::Guide
    } else {
        ProbeStyle::Attack
    };
    Probe::Ask {
        target: target.clone(),
        style,
    }
}

/// Phrases follow-up questions through the capability.
#[derive(Debug, Clone)]
pub struct Interrogator {
    policy: RetryPolicy,
}

impl Interrogator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Generate the follow-up question for `target`.
    pub async fn question(
        &self,
        capability: &dyn DuelCapability,
        concept: &Concept,
        target: &DetectedError,
        style: ProbeStyle,
        notes: &str,
        history: &[Exchange],
    ) -> Result<String, EngineError> {
        let claim = concept
            .claim(target.claim)
            .cloned()
            .ok_or_else(|| EngineError::Capability {
                task: TaskKind::GenerateQuestion,
                message: format!("target claim {} does not exist", target.claim),
            })?;

        let request = QuestionRequest {
            concept_name: concept.name.clone(),
            original_question: concept.question.clone(),
            target_claim: claim,
            error_kind: target.kind,
            style,
            notes: notes.to_string(),
            history: history.to_vec(),
        };

        tracing::debug!(
            concept = %concept.name,
            kind = %target.kind,
            claim = target.claim,
            ?style,
            "generating follow-up"
        );

        let request = &request;
        call_with_retry(TaskKind::GenerateQuestion, &self.policy, move || {
            capability.generate_question(request)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::contradiction::detect;
    use crate::error::CapabilityError;
    use crate::model::{BeliefState, Claim, ClaimKind, ConceptDraft};
    use crate::traits::{
        CandidateClaim, ClaimRequest, ClassifyRequest, ClassifyResponse,
    };

    fn error(kind: ErrorKind, claim: usize) -> DetectedError {
        DetectedError {
            kind,
            claim,
            note: String::new(),
        }
    }

    fn ranked() -> Vec<DetectedError> {
        vec![
            error(ErrorKind::MissingMechanism, 1),
            error(ErrorKind::BoundaryError, 2),
            error(ErrorKind::Conflation, 3),
            error(ErrorKind::Superficial, 0),
        ]
    }

    #[test]
    fn harshness_ladder_by_turn() {
        let kinds = |turn| -> Vec<ErrorKind> {
            visible_errors(turn, &ranked()).iter().map(|e| e.kind).collect()
        };
        assert_eq!(kinds(1), vec![ErrorKind::MissingMechanism]);
        assert_eq!(
            kinds(2),
            vec![
                ErrorKind::MissingMechanism,
                ErrorKind::BoundaryError,
                ErrorKind::Conflation
            ]
        );
        assert_eq!(kinds(3).len(), 4);
    }

    #[test]
    fn harshness_is_monotonic() {
        for kind in ErrorKind::ALL {
            if Harshness::Forgiving.admits(kind) {
                assert!(Harshness::Moderate.admits(kind));
            }
            if Harshness::Moderate.admits(kind) {
                assert!(Harshness::Strict.admits(kind));
            }
        }
    }

    #[test]
    fn reveal_when_nothing_visible() {
        let errors = vec![error(ErrorKind::Superficial, 0)];
        let answer = Answer::Text("partial answer".into());
        assert_eq!(select(1, &errors, &answer), Probe::Reveal);
        assert!(matches!(select(3, &errors, &answer), Probe::Ask { .. }));
    }

    #[test]
    fn abstention_on_turn_one_is_guided() {
        let claims = vec![
            Claim::new("Hashes each key with k functions", ClaimKind::Mechanism),
            Claim::new("Cannot report false negatives", ClaimKind::Boundary),
        ];
        let belief = BeliefState::unaddressed(1, claims.len(), "");
        let errors = detect(&claims, &belief);

        match select(1, &errors, &Answer::Abstained) {
            Probe::Ask { target, style } => {
                assert_eq!(target.kind, ErrorKind::MissingMechanism);
                assert_eq!(style, ProbeStyle::Guide);
            }
            Probe::Reveal => panic!("expected a guiding question"),
        }
    }

    #[test]
    fn wrong_mechanism_is_attacked() {
        let errors = vec![error(ErrorKind::WrongMechanism, 0)];
        let answer = Answer::Text("It stores the keys themselves".into());
        assert_eq!(
            select(1, &errors, &answer),
            Probe::Ask {
                target: error(ErrorKind::WrongMechanism, 0),
                style: ProbeStyle::Attack,
            }
        );
    }

    struct RecordingQuestioner {
        last: Mutex<Option<QuestionRequest>>,
    }

    #[async_trait]
    impl DuelCapability for RecordingQuestioner {
        async fn generate_claims(
            &self,
            _: &ClaimRequest,
        ) -> Result<Vec<CandidateClaim>, CapabilityError> {
            unreachable!()
        }

        async fn classify_belief(
            &self,
            _: &ClassifyRequest,
        ) -> Result<ClassifyResponse, CapabilityError> {
            unreachable!()
        }

        async fn generate_question(
            &self,
            request: &QuestionRequest,
        ) -> Result<String, CapabilityError> {
            *self.last.lock().unwrap() = Some(request.clone());
            Ok("What decides which bits get set?".into())
        }
    }

    #[tokio::test]
    async fn question_targets_the_selected_claim() {
        let draft = ConceptDraft {
            name: "Bloom filter".into(),
            source: String::new(),
            question: "How does a Bloom filter answer membership queries?".into(),
            source_quote: String::new(),
            text: String::new(),
        };
        let concept = Concept::from_draft(
            &draft,
            vec![
                Claim::new("Answers come from a shared bit array", ClaimKind::Definition),
                Claim::new("Hashes each key with k functions", ClaimKind::Mechanism),
            ],
        );
        let capability = RecordingQuestioner {
            last: Mutex::new(None),
        };
        let interrogator = Interrogator::new(RetryPolicy {
            timeout: Duration::from_secs(5),
            retries: 1,
        });

        let question = interrogator
            .question(
                &capability,
                &concept,
                &error(ErrorKind::MissingMechanism, 1),
                ProbeStyle::Guide,
                "no mention of hashing",
                &[],
            )
            .await
            .unwrap();

        assert_eq!(question, "What decides which bits get set?");
        let request = capability.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.target_claim.kind, ClaimKind::Mechanism);
        assert_eq!(request.style, ProbeStyle::Guide);
        assert_eq!(request.notes, "no mention of hashing");
    }
}
