//! BeliefModel: infer which claims an answer satisfies, violates, or leaves alone.

use crate::capability::{call_with_retry, RetryPolicy};
use crate::error::{CapabilityError, EngineError};
use crate::model::{Answer, BeliefState, ClaimAssessment, Concept};
use crate::traits::{ClassifyRequest, ClassifyResponse, DuelCapability, Exchange, TaskKind};

/// Infers a [`BeliefState`] per turn through the capability.
#[derive(Debug, Clone)]
pub struct BeliefModel {
    policy: RetryPolicy,
}

impl BeliefModel {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Classify the session's answers so far against every claim.
    ///
    /// A declared "I don't know" short-circuits to all-unaddressed without
    /// calling the capability, as does accumulated text that is empty.
    #[allow(clippy::too_many_arguments)]
    pub async fn infer(
        &self,
        capability: &dyn DuelCapability,
        concept: &Concept,
        turn: u8,
        answer: &Answer,
        accumulated: &str,
        history: &[Exchange],
        prior: &[BeliefState],
    ) -> Result<BeliefState, EngineError> {
        let claim_count = concept.claims.len();

        if answer.is_abstained() {
            tracing::debug!(concept = %concept.name, turn, "abstained; skipping classification");
            return Ok(BeliefState::unaddressed(
                turn,
                claim_count,
                "learner declared they don't know",
            ));
        }
        if accumulated.trim().is_empty() {
            return Ok(BeliefState::unaddressed(turn, claim_count, "no answer text"));
        }

        let request = ClassifyRequest {
            concept_name: concept.name.clone(),
            claims: concept.claims.clone(),
            answer_text: accumulated.to_string(),
            history: history.to_vec(),
            prior_notes: prior.last().map(|b| b.notes.clone()),
        };

        let request = &request;
        let response = call_with_retry(TaskKind::ClassifyBelief, &self.policy, move || async move {
            let response = capability.classify_belief(request).await?;
            normalize_response(response, claim_count)
        })
        .await?;

        Ok(BeliefState {
            turn,
            assessments: response.assessments,
            notes: response.notes,
        })
    }
}

/// Check the verdicts cover every claim exactly once and put them in claim order.
fn normalize_response(
    response: ClassifyResponse,
    claim_count: usize,
) -> Result<ClassifyResponse, CapabilityError> {
    let mut slots: Vec<Option<ClaimAssessment>> = vec![None; claim_count];

    for mut assessment in response.assessments {
        let index = assessment.claim;
        let slot = slots.get_mut(index).ok_or_else(|| {
            CapabilityError::Malformed(format!("verdict for unknown claim {index}"))
        })?;
        if slot.is_some() {
            return Err(CapabilityError::Malformed(format!(
                "duplicate verdict for claim {index}"
            )));
        }
        if assessment
            .conflated_with
            .is_some_and(|other| other == index || other >= claim_count)
        {
            assessment.conflated_with = None;
        }
        *slot = Some(assessment);
    }

    let assessments = slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| CapabilityError::Malformed(format!("no verdict for claim {i}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ClassifyResponse {
        assessments,
        notes: response.notes,
    })
}
