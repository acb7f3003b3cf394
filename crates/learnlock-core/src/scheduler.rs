//! ReviewScheduler: SM-2 style spacing of reviews.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Interval after a failed review, in days.
const RESET_INTERVAL_DAYS: f64 = 1.0;
/// Interval after the second consecutive pass, in days.
const SECOND_INTERVAL_DAYS: f64 = 6.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Per-concept review state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub concept_id: String,
    pub ease: f64,
    pub interval_days: f64,
    /// Consecutive passing reviews.
    pub review_count: u32,
    pub due_at: DateTime<Utc>,
    #[serde(default)]
    pub last_reviewed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_score: Option<u8>,
}

impl ScheduleRecord {
    /// A fresh record, due immediately.
    pub fn new(concept_id: impl Into<String>, config: &EngineConfig, now: DateTime<Utc>) -> Self {
        Self {
            concept_id: concept_id.into(),
            ease: config.initial_ease,
            interval_days: config.initial_interval,
            review_count: 0,
            due_at: now,
            last_reviewed: None,
            last_score: None,
        }
    }

    /// Derived flag; never stored.
    pub fn is_mastered(&self, config: &EngineConfig) -> bool {
        self.ease >= config.mastery_min_ease && self.review_count >= config.mastery_min_reviews
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }

    /// How long past due the record is; negative when not yet due.
    pub fn overdue_by(&self, now: DateTime<Utc>) -> Duration {
        now - self.due_at
    }
}

/// Applies a duel score to a schedule record.
#[derive(Debug, Clone)]
pub struct ReviewScheduler {
    pass_threshold: u8,
    initial_interval: f64,
    min_ease: f64,
    max_interval: f64,
}

impl ReviewScheduler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            pass_threshold: config.pass_threshold,
            initial_interval: config.initial_interval,
            min_ease: config.min_ease,
            max_interval: config.max_interval,
        }
    }

    /// Produce the updated record for `score` reviewed at `now`.
    pub fn apply(
        &self,
        record: &ScheduleRecord,
        score: u8,
        now: DateTime<Utc>,
    ) -> Result<ScheduleRecord, EngineError> {
        if !(1..=5).contains(&score) {
            return Err(EngineError::InvalidScore(score));
        }

        let mut next = record.clone();
        if score >= self.pass_threshold {
            let q = f64::from(5 - score);
            next.review_count += 1;
            next.ease = (record.ease + (0.1 - q * (0.08 + q * 0.02))).max(self.min_ease);
            next.interval_days = match next.review_count {
                1 => self.initial_interval,
                2 => SECOND_INTERVAL_DAYS,
                _ => record.interval_days * next.ease,
            };
        } else {
            next.review_count = 0;
            next.ease = (record.ease - 0.2).max(self.min_ease);
            next.interval_days = RESET_INTERVAL_DAYS;
        }
        next.interval_days = next.interval_days.min(self.max_interval);
        next.due_at = Duration::try_milliseconds((next.interval_days * MILLIS_PER_DAY).round() as i64)
            .and_then(|delay| now.checked_add_signed(delay))
            .ok_or_else(|| EngineError::ScheduleOutOfRange(next.concept_id.clone()))?;
        next.last_reviewed = Some(now);
        next.last_score = Some(score);

        tracing::debug!(
            concept = %next.concept_id,
            score,
            ease = next.ease,
            interval_days = next.interval_days,
            review_count = next.review_count,
            "schedule updated"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn fresh() -> ScheduleRecord {
        ScheduleRecord::new("c1", &EngineConfig::default(), now())
    }

    fn scheduler() -> ReviewScheduler {
        ReviewScheduler::new(&EngineConfig::default())
    }

    #[test]
    fn new_record_is_due_immediately() {
        let record = fresh();
        assert_eq!(record.ease, 2.5);
        assert_eq!(record.interval_days, 1.0);
        assert_eq!(record.review_count, 0);
        assert!(record.is_due(now()));
    }

    #[test]
    fn passing_progression_at_four() {
        let s = scheduler();
        let mut record = fresh();
        let mut intervals = Vec::new();
        for _ in 0..4 {
            record = s.apply(&record, 4, now()).unwrap();
            intervals.push(record.interval_days);
        }
        assert_eq!(intervals[0], 1.0);
        assert_eq!(intervals[1], 6.0);
        assert!((intervals[2] - 15.0).abs() < 1.5);
        assert!((intervals[3] - 37.5).abs() < 3.0);
        assert!(intervals.iter().all(|i| *i <= 180.0));
        assert_eq!(record.review_count, 4);
    }

    #[test]
    fn due_date_follows_interval() {
        let record = scheduler().apply(&fresh(), 5, now()).unwrap();
        assert_eq!(record.due_at, now() + Duration::days(1));
        assert_eq!(record.last_score, Some(5));
        assert_eq!(record.last_reviewed, Some(now()));
    }

    #[test]
    fn failure_resets_interval_and_count() {
        let s = scheduler();
        let mut record = fresh();
        for _ in 0..5 {
            record = s.apply(&record, 5, now()).unwrap();
        }
        assert!(record.interval_days > 6.0);

        let failed = s.apply(&record, 2, now()).unwrap();
        assert_eq!(failed.interval_days, 1.0);
        assert_eq!(failed.review_count, 0);
        assert!((failed.ease - (record.ease - 0.2)).abs() < 1e-9);
    }

    #[test]
    fn ease_never_below_floor() {
        let s = scheduler();
        let mut record = fresh();
        for _ in 0..20 {
            record = s.apply(&record, 1, now()).unwrap();
            assert!(record.ease >= 1.3);
        }
        assert_eq!(record.ease, 1.3);

        // A barely passing score also lowers ease.
        let passed = s.apply(&record, 3, now()).unwrap();
        assert_eq!(passed.ease, 1.3);
    }

    #[test]
    fn interval_never_exceeds_ceiling() {
        let config = EngineConfig {
            max_interval: 30.0,
            ..EngineConfig::default()
        };
        let s = ReviewScheduler::new(&config);
        let mut record = ScheduleRecord::new("c1", &config, now());
        for _ in 0..10 {
            record = s.apply(&record, 5, now()).unwrap();
            assert!(record.interval_days <= 30.0);
        }
        assert_eq!(record.interval_days, 30.0);
    }

    #[test]
    fn unrepresentable_due_date_is_an_error() {
        let config = EngineConfig {
            initial_interval: 1e9,
            max_interval: 1e9,
            ..EngineConfig::default()
        };
        let s = ReviewScheduler::new(&config);
        let record = ScheduleRecord::new("c1", &config, now());
        assert!(matches!(
            s.apply(&record, 5, now()),
            Err(EngineError::ScheduleOutOfRange(id)) if id == "c1"
        ));
    }

    #[test]
    fn mastery_boundaries() {
        let config = EngineConfig::default();
        let mut record = fresh();
        record.ease = 2.5;
        record.review_count = 3;
        assert!(record.is_mastered(&config));

        record.review_count = 2;
        assert!(!record.is_mastered(&config));

        record.review_count = 3;
        record.ease = 2.49;
        assert!(!record.is_mastered(&config));
    }

    #[test]
    fn rejects_out_of_range_score() {
        assert!(matches!(
            scheduler().apply(&fresh(), 0, now()),
            Err(EngineError::InvalidScore(0))
        ));
        assert!(matches!(
            scheduler().apply(&fresh(), 6, now()),
            Err(EngineError::InvalidScore(6))
        ));
    }
}
