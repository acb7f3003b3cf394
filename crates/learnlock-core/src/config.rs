//! Engine configuration.
//!
//! One immutable value carries every threshold the engine applies. It is
//! threaded into the scheduler, scorer, and pipeline at construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Tunable policy for ingestion, grading, and scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ease factor given to a new schedule record.
    pub initial_ease: f64,
    /// Interval in days after the first passing review.
    pub initial_interval: f64,
    /// Floor for the ease factor.
    pub min_ease: f64,
    /// Ceiling for the interval, in days.
    pub max_interval: f64,
    /// Scores at or above this count as a pass.
    pub pass_threshold: u8,
    /// Score used when classification could not complete.
    pub fallback_score: u8,
    pub mastery_min_ease: f64,
    pub mastery_min_reviews: u32,
    /// Fewer surviving claims than this fails ingestion for the concept.
    pub min_viable_claims: usize,
    /// Surviving claims beyond this are dropped, in generation order.
    pub max_claims_per_concept: usize,
    /// Source text beyond this many characters is not sent for generation.
    pub content_max_chars: usize,
    pub capability_timeout_secs: u64,
    /// Extra attempts after a failed capability call.
    pub capability_retries: u32,
    /// Batch-level quorum on total surviving claims.
    pub batch_min_claims: usize,
    pub batch_max_claims: usize,
    /// Concurrent claim pipelines during batch ingestion.
    pub max_parallel_ingest: usize,
    /// A session untouched for this long may be evicted by the next `start_session`.
    pub session_idle_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_ease: 2.5,
            initial_interval: 1.0,
            min_ease: 1.3,
            max_interval: 180.0,
            pass_threshold: 3,
            fallback_score: 3,
            mastery_min_ease: 2.5,
            mastery_min_reviews: 3,
            min_viable_claims: 2,
            max_claims_per_concept: 8,
            content_max_chars: 8000,
            capability_timeout_secs: 60,
            capability_retries: 1,
            batch_min_claims: 3,
            batch_max_claims: 20,
            max_parallel_ingest: 4,
            session_idle_secs: 1800,
        }
    }
}

/// Upper bound on `max_interval`, in days.
pub const MAX_INTERVAL_CEILING: f64 = 36_500.0;

impl EngineConfig {
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_timeout_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |msg: String| Err(EngineError::InvalidConfig(msg));

        if !(self.min_ease > 0.0) {
            return fail(format!("min_ease must be positive, got {}", self.min_ease));
        }
        if self.initial_ease < self.min_ease {
            return fail(format!(
                "initial_ease {} is below min_ease {}",
                self.initial_ease, self.min_ease
            ));
        }
        if !(self.initial_interval > 0.0) {
            return fail("initial_interval must be positive".into());
        }
        if !(self.max_interval <= MAX_INTERVAL_CEILING) {
            return fail(format!(
                "max_interval must be at most {MAX_INTERVAL_CEILING} days, got {}",
                self.max_interval
            ));
        }
        if self.max_interval < self.initial_interval {
            return fail(format!(
                "max_interval {} is below initial_interval {}",
                self.max_interval, self.initial_interval
            ));
        }
        if !(1..=5).contains(&self.pass_threshold) {
            return fail(format!(
                "pass_threshold must be within 1..=5, got {}",
                self.pass_threshold
            ));
        }
        if !(1..=5).contains(&self.fallback_score) {
            return fail(format!(
                "fallback_score must be within 1..=5, got {}",
                self.fallback_score
            ));
        }
        if self.min_viable_claims == 0 {
            return fail("min_viable_claims must be at least 1".into());
        }
        if self.max_claims_per_concept < self.min_viable_claims {
            return fail(format!(
                "max_claims_per_concept {} is below min_viable_claims {}",
                self.max_claims_per_concept, self.min_viable_claims
            ));
        }
        if self.batch_max_claims < self.batch_min_claims {
            return fail("batch_max_claims is below batch_min_claims".into());
        }
        if self.capability_timeout_secs == 0 {
            return fail("capability_timeout_secs must be at least 1".into());
        }
        if self.max_parallel_ingest == 0 {
            return fail("max_parallel_ingest must be at least 1".into());
        }
        if self.session_idle_secs == 0 {
            return fail("session_idle_secs must be at least 1".into());
        }
        Ok(())
    }
}
