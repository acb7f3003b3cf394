//! Scorer: grade a finished duel 1-5 from its whole trajectory.

use crate::config::EngineConfig;
use crate::contradiction::{detect, ErrorKind};
use crate::model::{BeliefState, Claim, ClaimStatus};

/// Applies the grading rubric.
#[derive(Debug, Clone)]
pub struct Scorer {
    fallback_score: u8,
}

impl Scorer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            fallback_score: config.fallback_score,
        }
    }

    /// The score used when classification could not complete.
    pub fn fallback(&self) -> u8 {
        self.fallback_score
    }

    /// Grade a trajectory.
    ///
    /// Rules are tried in the order 1, 5, 2, 4, 3; the first that matches wins.
    /// An indeterminate or empty trajectory gets the fallback score.
    pub fn score(&self, claims: &[Claim], trajectory: &[BeliefState], indeterminate: bool) -> u8 {
        let Some(last) = trajectory.last() else {
            return self.fallback_score;
        };
        if indeterminate || claims.is_empty() {
            return self.fallback_score;
        }

        let final_errors = detect(claims, last);
        if last.satisfied_count() == 0
            || final_errors
                .iter()
                .any(|e| e.kind == ErrorKind::WrongMechanism)
        {
            return 1;
        }

        let surfaced = surfaced_kinds(claims, trajectory);
        if surfaced.is_empty() {
            return 5;
        }

        let unresolved = claims.len() - last.satisfied_count();
        let serious = surfaced.iter().filter(|k| k.is_serious()).count();
        if unresolved * 2 > claims.len() || serious >= 2 {
            return 2;
        }

        let only_minor = surfaced.iter().all(|k| !k.is_serious());
        let core_satisfied = claims
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind.is_core())
            .all(|(i, _)| last.status(i) == Some(ClaimStatus::Satisfied));
        if only_minor && core_satisfied {
            return 4;
        }

        3
    }
}

/// Distinct error kinds detected anywhere in the trajectory, most severe first.
pub fn surfaced_kinds(claims: &[Claim], trajectory: &[BeliefState]) -> Vec<ErrorKind> {
    ErrorKind::ALL
        .into_iter()
        .filter(|kind| {
            trajectory
                .iter()
                .any(|state| detect(claims, state).iter().any(|e| e.kind == *kind))
        })
        .collect()
}
