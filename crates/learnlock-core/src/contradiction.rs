//! ContradictionDetector: turn a belief state into ranked errors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{BeliefState, Claim, ClaimKind, ClaimStatus};

/// What kind of gap a belief state exposes, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Incorrect explanation of how something works.
    WrongMechanism,
    /// Omitted a critical mechanism.
    MissingMechanism,
    /// Wrong about limitations or scope.
    BoundaryError,
    /// Blurred two distinct claims together.
    Conflation,
    /// Surface-level understanding without depth.
    Superficial,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::WrongMechanism,
        ErrorKind::MissingMechanism,
        ErrorKind::BoundaryError,
        ErrorKind::Conflation,
        ErrorKind::Superficial,
    ];

    /// Higher is worse.
    pub fn severity(self) -> u8 {
        match self {
            ErrorKind::WrongMechanism => 5,
            ErrorKind::MissingMechanism => 4,
            ErrorKind::BoundaryError => 3,
            ErrorKind::Conflation => 2,
            ErrorKind::Superficial => 1,
        }
    }

    /// Errors about how the concept works, as opposed to omissions at its edges.
    pub fn is_mechanism(self) -> bool {
        matches!(self, ErrorKind::WrongMechanism | ErrorKind::MissingMechanism)
    }

    /// Kinds that count against mechanism/boundary understanding when scoring.
    pub fn is_serious(self) -> bool {
        self.severity() >= ErrorKind::BoundaryError.severity()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::WrongMechanism => write!(f, "wrong_mechanism"),
            ErrorKind::MissingMechanism => write!(f, "missing_mechanism"),
            ErrorKind::BoundaryError => write!(f, "boundary_error"),
            ErrorKind::Conflation => write!(f, "conflation"),
            ErrorKind::Superficial => write!(f, "superficial"),
        }
    }
}

/// One error found in a belief state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedError {
    pub kind: ErrorKind,
    /// Index of the claim the error targets.
    pub claim: usize,
    /// The belief model's justification for the claim.
    #[serde(default)]
    pub note: String,
}

/// Classify a single claim's assessment, if it is an error at all.
fn classify(claim: &Claim, status: ClaimStatus, conflated: bool) -> Option<ErrorKind> {
    match status {
        ClaimStatus::Violated if claim.kind == ClaimKind::Boundary => Some(ErrorKind::BoundaryError),
        ClaimStatus::Violated => Some(ErrorKind::WrongMechanism),
        _ if conflated => Some(ErrorKind::Conflation),
        ClaimStatus::Unaddressed if claim.kind == ClaimKind::Mechanism => {
            Some(ErrorKind::MissingMechanism)
        }
        ClaimStatus::Unaddressed => Some(ErrorKind::Superficial),
        ClaimStatus::Satisfied => None,
    }
}

/// Compare a belief state against its claims and rank the violations.
///
/// Ordered by severity, highest first; equal severities keep claim
/// declaration order.
pub fn detect(claims: &[Claim], belief: &BeliefState) -> Vec<DetectedError> {
    let mut errors: Vec<DetectedError> = belief
        .assessments
        .iter()
        .filter_map(|a| {
            let claim = claims.get(a.claim)?;
            let conflated = a
                .conflated_with
                .is_some_and(|other| other != a.claim && other < claims.len());
            classify(claim, a.status, conflated).map(|kind| DetectedError {
                kind,
                claim: a.claim,
                note: a.justification.clone(),
            })
        })
        .collect();

    errors.sort_by(|a, b| {
        b.kind
            .severity()
            .cmp(&a.kind.severity())
            .then(a.claim.cmp(&b.claim))
    });
    errors
}
