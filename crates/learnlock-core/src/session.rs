//! DuelSession: the per-concept state machine.
//!
//! ```text
//! AwaitingAnswer(1) -> Evaluating(1) -> AwaitingAnswer(2) -> ... -> Revealed
//!                                    \-> Revealed
//! ```
//!
//! Nothing is committed until every capability call for a turn has
//! succeeded, so a failed or cancelled evaluation leaves the session
//! answering the same turn.

use std::fmt;

use uuid::Uuid;

use crate::belief::BeliefModel;
use crate::capability::RetryPolicy;
use crate::config::EngineConfig;
use crate::contradiction::detect;
use crate::error::EngineError;
use crate::interrogator::{select, Harshness, Interrogator, Probe};
use crate::model::{Answer, BeliefState, Concept, DuelResult, TerminationReason, Turn, MAX_TURNS};
use crate::scoring::{surfaced_kinds, Scorer};
use crate::traits::{DuelCapability, Exchange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingAnswer(u8),
    Evaluating(u8),
    Revealed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::AwaitingAnswer(turn) => write!(f, "awaiting answer (turn {turn})"),
            SessionState::Evaluating(turn) => write!(f, "evaluating (turn {turn})"),
            SessionState::Revealed => write!(f, "revealed"),
        }
    }
}

/// What the caller should do after submitting an answer.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The input was blank; ask again. No turn was used.
    Reprompt,
    /// The next question to put to the learner.
    Question(String),
    /// The duel is over.
    Revealed(DuelResult),
}

/// A turn that finished evaluating, not yet committed.
struct Evaluated {
    belief: BeliefState,
    next: Next,
}

enum Next {
    Question(String),
    Reveal(TerminationReason),
}

/// One adversarial dialogue about one concept.
pub struct DuelSession {
    id: Uuid,
    concept: Concept,
    state: SessionState,
    question: String,
    turns: Vec<Turn>,
    history: Vec<Exchange>,
    /// Non-abstained answers, in turn order.
    answers: Vec<String>,
    last_failure: Option<String>,
    result: Option<DuelResult>,
    belief_model: BeliefModel,
    interrogator: Interrogator,
    scorer: Scorer,
}

impl DuelSession {
    /// Open a session on `concept`, asking its challenge question first.
    pub fn new(concept: Concept, config: &EngineConfig) -> Result<Self, EngineError> {
        if concept.claims.is_empty() {
            return Err(EngineError::NoClaims(concept.id));
        }
        let policy = RetryPolicy::from_config(config);
        Ok(Self {
            id: Uuid::new_v4(),
            question: concept.question.clone(),
            concept,
            state: SessionState::AwaitingAnswer(1),
            turns: Vec::new(),
            history: Vec::new(),
            answers: Vec::new(),
            last_failure: None,
            result: None,
            belief_model: BeliefModel::new(policy),
            interrogator: Interrogator::new(policy),
            scorer: Scorer::new(config),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn concept(&self) -> &Concept {
        &self.concept
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The question awaiting an answer, if the duel is still running.
    pub fn question(&self) -> Option<&str> {
        match self.state {
            SessionState::Revealed => None,
            _ => Some(&self.question),
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn result(&self) -> Option<&DuelResult> {
        self.result.as_ref()
    }

    /// Feed the learner's raw input into the current turn.
    ///
    /// On a capability failure the error is returned and the session stays
    /// on the same turn.
    pub async fn submit_answer(
        &mut self,
        capability: &dyn DuelCapability,
        input: &str,
    ) -> Result<SubmitOutcome, EngineError> {
        let turn = match self.state {
            SessionState::Revealed => return Err(EngineError::SessionClosed),
            // An evaluation that was cancelled committed nothing.
            SessionState::AwaitingAnswer(turn) | SessionState::Evaluating(turn) => turn,
        };

        let answer = match Answer::parse(input) {
            Ok(answer) => answer,
            Err(EngineError::InvalidAnswer) => return Ok(SubmitOutcome::Reprompt),
            Err(e) => return Err(e),
        };

        self.state = SessionState::Evaluating(turn);
        match self.evaluate(capability, turn, &answer).await {
            Ok(evaluated) => {
                self.last_failure = None;
                Ok(self.commit(turn, answer, evaluated))
            }
            Err(e) => {
                tracing::warn!(session = %self.id, turn, error = %e, "turn not consumed");
                self.last_failure = Some(e.to_string());
                self.state = SessionState::AwaitingAnswer(turn);
                Err(e)
            }
        }
    }

    async fn evaluate(
        &self,
        capability: &dyn DuelCapability,
        turn: u8,
        answer: &Answer,
    ) -> Result<Evaluated, EngineError> {
        let mut accumulated = self.answers.clone();
        if let Some(text) = answer.text() {
            accumulated.push(text.to_string());
        }
        let accumulated = accumulated.join("\n\n");
        let prior: Vec<BeliefState> = self.turns.iter().map(|t| t.belief.clone()).collect();

        let belief = self
            .belief_model
            .infer(
                capability,
                &self.concept,
                turn,
                answer,
                &accumulated,
                &self.history,
                &prior,
            )
            .await?;

        let errors = detect(&self.concept.claims, &belief);
        let next = match select(turn, &errors, answer) {
            Probe::Reveal => Next::Reveal(TerminationReason::AllClaimsSatisfied),
            Probe::Ask { .. } if turn >= MAX_TURNS => Next::Reveal(TerminationReason::TurnsExhausted),
            Probe::Ask { target, style } => {
                let mut history = self.history.clone();
                history.push(Exchange {
                    question: self.question.clone(),
                    answer: render_answer(answer),
                });
                let question = self
                    .interrogator
                    .question(
                        capability,
                        &self.concept,
                        &target,
                        style,
                        &belief.notes,
                        &history,
                    )
                    .await?;
                Next::Question(question)
            }
        };

        Ok(Evaluated { belief, next })
    }

    fn commit(&mut self, turn: u8, answer: Answer, evaluated: Evaluated) -> SubmitOutcome {
        self.history.push(Exchange {
            question: self.question.clone(),
            answer: render_answer(&answer),
        });
        if let Some(text) = answer.text() {
            self.answers.push(text.to_string());
        }
        self.turns.push(Turn {
            number: turn,
            question: self.question.clone(),
            answer,
            belief: evaluated.belief,
            harshness: Harshness::for_turn(turn),
        });

        match evaluated.next {
            Next::Question(question) => {
                tracing::info!(session = %self.id, turn, "follow-up asked");
                self.question = question.clone();
                self.state = SessionState::AwaitingAnswer(turn + 1);
                SubmitOutcome::Question(question)
            }
            Next::Reveal(termination) => SubmitOutcome::Revealed(self.reveal(termination, false)),
        }
    }

    fn reveal(&mut self, termination: TerminationReason, indeterminate: bool) -> DuelResult {
        let claims = &self.concept.claims;
        let trajectory: Vec<BeliefState> = self.turns.iter().map(|t| t.belief.clone()).collect();
        let claims_satisfied = trajectory.last().map_or(0, BeliefState::satisfied_count);
        let score = self.scorer.score(claims, &trajectory, indeterminate);

        let result = DuelResult {
            session_id: self.id,
            concept_id: self.concept.id.clone(),
            errors_surfaced: surfaced_kinds(claims, &trajectory),
            trajectory,
            claims_satisfied,
            total_claims: claims.len(),
            score,
            termination,
            indeterminate,
        };
        tracing::info!(
            session = %self.id,
            concept = %self.concept.name,
            %termination,
            score,
            turns = self.turns.len(),
            "duel revealed"
        );
        self.state = SessionState::Revealed;
        self.result = Some(result.clone());
        result
    }

    /// End the duel early.
    ///
    /// Returns `None` when no turn was completed. If the last capability call
    /// failed, the result is indeterminate and carries the fallback score.
    pub fn abandon(&mut self) -> Result<Option<DuelResult>, EngineError> {
        if self.state == SessionState::Revealed {
            return Err(EngineError::SessionClosed);
        }
        if self.turns.is_empty() {
            tracing::info!(session = %self.id, "abandoned before any turn");
            self.state = SessionState::Revealed;
            return Ok(None);
        }
        let indeterminate = self.last_failure.is_some();
        Ok(Some(self.reveal(TerminationReason::Abandoned, indeterminate)))
    }
}

fn render_answer(answer: &Answer) -> String {
    match answer {
        Answer::Text(text) => text.clone(),
        Answer::Abstained => "I don't know.".to_string(),
    }
}
