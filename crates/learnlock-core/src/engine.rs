//! DuelEngine: the caller-facing facade.
//!
//! Owns the capability, the store, and the live sessions. At most one
//! session runs per concept, and at most one call is in flight per session;
//! a second concurrent call for the same session gets
//! [`EngineError::SessionBusy`].
//!
//! Sessions end on reveal or [`DuelEngine::abandon_session`]. A session whose
//! handle was dropped stays registered until it has been idle for
//! `session_idle_secs`; the next `start_session` then evicts it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::time::Instant;
use uuid::Uuid;

use crate::claims::ClaimPipeline;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{Claim, Concept, ConceptDraft, DuelResult, ReviewRecord};
use crate::scheduler::{ReviewScheduler, ScheduleRecord};
use crate::session::{DuelSession, SubmitOutcome};
use crate::traits::{ConceptStore, DuelCapability};

/// What `start_session` hands back to the caller.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub concept_id: String,
    pub concept_name: String,
    /// The opening challenge question.
    pub question: String,
}

/// Outcome of one concept within a batch.
#[derive(Debug)]
pub struct IngestOutcome {
    pub name: String,
    pub result: Result<Concept, EngineError>,
}

/// Outcome of a batch ingestion.
#[derive(Debug)]
pub struct BatchReport {
    /// Per-concept outcomes, in input order.
    pub outcomes: Vec<IngestOutcome>,
    /// Claims across every concept that survived.
    pub total_claims: usize,
    /// Whether `total_claims` falls inside the configured batch quorum.
    pub quorum_met: bool,
}

impl BatchReport {
    pub fn ingested(&self) -> impl Iterator<Item = &Concept> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &EngineError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.name.as_str(), e)))
    }
}

/// Progress callbacks during batch ingestion.
pub trait IngestProgress: Send + Sync {
    fn on_concept_start(&self, name: &str);
    fn on_concept_done(&self, outcome: &IngestOutcome);
}

/// No-op progress reporter.
pub struct NoopProgress;

impl IngestProgress for NoopProgress {
    fn on_concept_start(&self, _: &str) {}
    fn on_concept_done(&self, _: &IngestOutcome) {}
}

/// A concept whose review is due.
#[derive(Debug, Clone)]
pub struct DueConcept {
    pub concept: Concept,
    pub schedule: ScheduleRecord,
}

/// Aggregate counts over the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub total: usize,
    /// Due and not skipped.
    pub due: usize,
    pub mastered: usize,
    pub skipped: usize,
    /// Mean ease across scheduled concepts; `None` when nothing is scheduled.
    pub mean_ease: Option<f64>,
    /// Finished duels in the review history.
    pub reviews: usize,
    /// Mean score across the review history; `None` before the first review.
    pub mean_score: Option<f64>,
}

struct LiveSession {
    session: Arc<AsyncMutex<DuelSession>>,
    concept_id: String,
    touched: Instant,
}

#[derive(Default)]
struct Sessions {
    by_id: HashMap<Uuid, LiveSession>,
    by_concept: HashMap<String, Uuid>,
}

impl Sessions {
    fn remove(&mut self, handle: Uuid) {
        if let Some(live) = self.by_id.remove(&handle) {
            self.by_concept.remove(&live.concept_id);
        }
    }

    /// Drop sessions idle for at least `idle` with no call in flight.
    fn evict_idle(&mut self, idle: std::time::Duration) {
        let expired: Vec<Uuid> = self
            .by_id
            .iter()
            .filter(|(_, live)| live.touched.elapsed() >= idle && live.session.try_lock().is_ok())
            .map(|(id, _)| *id)
            .collect();
        for handle in expired {
            tracing::info!(session = %handle, "evicting idle session");
            self.remove(handle);
        }
    }
}

/// The duel engine.
pub struct DuelEngine {
    capability: Arc<dyn DuelCapability>,
    store: Arc<dyn ConceptStore>,
    config: EngineConfig,
    pipeline: ClaimPipeline,
    scheduler: ReviewScheduler,
    sessions: Mutex<Sessions>,
}

impl DuelEngine {
    pub fn new(
        capability: Arc<dyn DuelCapability>,
        store: Arc<dyn ConceptStore>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            pipeline: ClaimPipeline::new(&config),
            scheduler: ReviewScheduler::new(&config),
            capability,
            store,
            config,
            sessions: Mutex::new(Sessions::default()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Derive and vet claims for one concept without persisting anything.
    pub async fn run_claim_pipeline(&self, draft: &ConceptDraft) -> Result<Vec<Claim>, EngineError> {
        self.pipeline.run(self.capability.as_ref(), draft).await
    }

    /// Run the pipeline, then persist the concept with a fresh schedule.
    pub async fn ingest(&self, draft: &ConceptDraft) -> Result<Concept, EngineError> {
        let claims = self.run_claim_pipeline(draft).await?;
        let concept = Concept::from_draft(draft, claims);
        let schedule = ScheduleRecord::new(&concept.id, &self.config, Utc::now());

        // Schedule first: a schedule without its concept is never listed.
        self.store
            .save_schedule(&concept.id, &schedule)
            .map_err(EngineError::storage)?;
        self.store
            .save_concept(&concept)
            .map_err(EngineError::storage)?;

        tracing::info!(
            concept = %concept.name,
            id = %concept.id,
            claims = concept.claims.len(),
            "concept ingested"
        );
        Ok(concept)
    }

    /// Ingest several concepts concurrently.
    ///
    /// One concept's failure never aborts the rest.
    pub async fn ingest_batch(
        &self,
        drafts: &[ConceptDraft],
        progress: &dyn IngestProgress,
    ) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_ingest));
        let mut futures = FuturesUnordered::new();

        for (index, draft) in drafts.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        progress.on_concept_start(&draft.name);
                        self.ingest(draft).await
                    }
                    Err(_) => Err(EngineError::Storage("ingest semaphore closed".into())),
                };
                (index, draft.name.clone(), result)
            });
        }

        let mut slots: Vec<Option<IngestOutcome>> = drafts.iter().map(|_| None).collect();
        while let Some((index, name, result)) = futures.next().await {
            if let Err(e) = &result {
                tracing::warn!(concept = %name, error = %e, "ingestion failed");
            }
            let outcome = IngestOutcome { name, result };
            progress.on_concept_done(&outcome);
            slots[index] = Some(outcome);
        }

        let outcomes: Vec<IngestOutcome> = slots.into_iter().flatten().collect();
        let total_claims = outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|c| c.claims.len())
            .sum();
        let quorum_met =
            (self.config.batch_min_claims..=self.config.batch_max_claims).contains(&total_claims);
        if !quorum_met {
            tracing::warn!(
                total_claims,
                min = self.config.batch_min_claims,
                max = self.config.batch_max_claims,
                "batch claim quorum not met"
            );
        }

        BatchReport {
            outcomes,
            total_claims,
            quorum_met,
        }
    }

    /// Open a duel on a stored concept.
    pub fn start_session(&self, concept_id: &str) -> Result<SessionHandle, EngineError> {
        let concept = self.load_concept(concept_id)?;

        let mut sessions = self.lock_sessions();
        sessions.evict_idle(self.config.session_idle_timeout());
        if sessions.by_concept.contains_key(concept_id) {
            return Err(EngineError::SessionActive(concept_id.to_string()));
        }

        let session = DuelSession::new(concept, &self.config)?;
        let handle = SessionHandle {
            id: session.id(),
            concept_id: session.concept().id.clone(),
            concept_name: session.concept().name.clone(),
            question: session.concept().question.clone(),
        };
        sessions
            .by_concept
            .insert(handle.concept_id.clone(), handle.id);
        sessions.by_id.insert(
            handle.id,
            LiveSession {
                session: Arc::new(AsyncMutex::new(session)),
                concept_id: handle.concept_id.clone(),
                touched: Instant::now(),
            },
        );

        tracing::info!(session = %handle.id, concept = %handle.concept_name, "session started");
        Ok(handle)
    }

    /// Submit the learner's input for the session's current turn.
    pub async fn submit_answer(&self, handle: Uuid, text: &str) -> Result<SubmitOutcome, EngineError> {
        let session = self.session(handle)?;
        let mut session = session
            .try_lock()
            .map_err(|_| EngineError::SessionBusy(handle))?;

        let outcome = session
            .submit_answer(self.capability.as_ref(), text)
            .await?;
        if matches!(outcome, SubmitOutcome::Revealed(_)) {
            self.close(handle);
        }
        Ok(outcome)
    }

    /// End a session early. See [`DuelSession::abandon`].
    pub async fn abandon_session(&self, handle: Uuid) -> Result<Option<DuelResult>, EngineError> {
        let session = self.session(handle)?;
        let mut session = session
            .try_lock()
            .map_err(|_| EngineError::SessionBusy(handle))?;
        let result = session.abandon()?;
        self.close(handle);
        Ok(result)
    }

    /// Fold a duel score into the concept's schedule and persist it.
    pub fn apply_schedule(&self, concept_id: &str, score: u8) -> Result<ScheduleRecord, EngineError> {
        self.apply_schedule_at(concept_id, score, Utc::now())
    }

    pub fn apply_schedule_at(
        &self,
        concept_id: &str,
        score: u8,
        now: DateTime<Utc>,
    ) -> Result<ScheduleRecord, EngineError> {
        let record = self
            .store
            .load_schedule(concept_id)
            .map_err(EngineError::storage)?
            .ok_or_else(|| EngineError::SchedulingUnderflow(concept_id.to_string()))?;
        let updated = self.scheduler.apply(&record, score, now)?;
        self.store
            .save_schedule(concept_id, &updated)
            .map_err(EngineError::storage)?;
        Ok(updated)
    }

    /// Persist a finished duel: fold its score into the schedule, then
    /// append it to the review history.
    pub fn record_result(&self, result: &DuelResult) -> Result<ScheduleRecord, EngineError> {
        self.record_result_at(result, Utc::now())
    }

    pub fn record_result_at(
        &self,
        result: &DuelResult,
        now: DateTime<Utc>,
    ) -> Result<ScheduleRecord, EngineError> {
        let concept = self.load_concept(&result.concept_id)?;
        let record = self.apply_schedule_at(&concept.id, result.score, now)?;
        let review = ReviewRecord::from_result(&concept, result, now);
        self.store.add_review(&review).map_err(EngineError::storage)?;
        tracing::info!(concept = %concept.name, score = result.score, "review recorded");
        Ok(record)
    }

    /// Reviews of one concept, oldest first.
    pub fn reviews(&self, concept_id: &str) -> Result<Vec<ReviewRecord>, EngineError> {
        let mut reviews = self.store.list_reviews().map_err(EngineError::storage)?;
        reviews.retain(|r| r.concept_id == concept_id);
        Ok(reviews)
    }

    /// Keep a concept out of the due queue until [`DuelEngine::unskip_concept`].
    pub fn skip_concept(&self, concept_id: &str) -> Result<Concept, EngineError> {
        self.set_skipped(concept_id, true)
    }

    pub fn unskip_concept(&self, concept_id: &str) -> Result<Concept, EngineError> {
        self.set_skipped(concept_id, false)
    }

    fn set_skipped(&self, concept_id: &str, skipped: bool) -> Result<Concept, EngineError> {
        let mut concept = self.load_concept(concept_id)?;
        if concept.skipped != skipped {
            concept.skipped = skipped;
            self.store
                .save_concept(&concept)
                .map_err(EngineError::storage)?;
            tracing::info!(concept = %concept.name, skipped, "skip flag changed");
        }
        Ok(concept)
    }

    fn load_concept(&self, concept_id: &str) -> Result<Concept, EngineError> {
        self.store
            .load_concept(concept_id)
            .map_err(EngineError::storage)?
            .ok_or_else(|| EngineError::ConceptNotFound(concept_id.to_string()))
    }

    /// Concepts due at `now`, most overdue first. Skipped concepts are left out.
    pub fn due_concepts(&self, now: DateTime<Utc>) -> Result<Vec<DueConcept>, EngineError> {
        let mut due = Vec::new();
        for concept in self.store.list_concepts().map_err(EngineError::storage)? {
            if concept.skipped {
                continue;
            }
            let Some(schedule) = self
                .store
                .load_schedule(&concept.id)
                .map_err(EngineError::storage)?
            else {
                continue;
            };
            if schedule.is_due(now) {
                due.push(DueConcept { concept, schedule });
            }
        }
        due.sort_by(|a, b| {
            a.schedule
                .due_at
                .cmp(&b.schedule.due_at)
                .then_with(|| a.concept.name.cmp(&b.concept.name))
        });
        Ok(due)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Result<Stats, EngineError> {
        let concepts = self.store.list_concepts().map_err(EngineError::storage)?;
        let reviews = self.store.list_reviews().map_err(EngineError::storage)?;
        let mut stats = Stats {
            total: concepts.len(),
            due: 0,
            mastered: 0,
            skipped: concepts.iter().filter(|c| c.skipped).count(),
            mean_ease: None,
            reviews: reviews.len(),
            mean_score: None,
        };
        if !reviews.is_empty() {
            let sum: f64 = reviews.iter().map(|r| f64::from(r.score)).sum();
            stats.mean_score = Some(sum / reviews.len() as f64);
        }
        let mut ease_sum = 0.0;
        let mut scheduled = 0usize;
        for concept in &concepts {
            let Some(schedule) = self
                .store
                .load_schedule(&concept.id)
                .map_err(EngineError::storage)?
            else {
                continue;
            };
            scheduled += 1;
            ease_sum += schedule.ease;
            if schedule.is_due(now) && !concept.skipped {
                stats.due += 1;
            }
            if schedule.is_mastered(&self.config) {
                stats.mastered += 1;
            }
        }
        if scheduled > 0 {
            stats.mean_ease = Some(ease_sum / scheduled as f64);
        }
        Ok(stats)
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, Sessions> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn session(&self, handle: Uuid) -> Result<Arc<AsyncMutex<DuelSession>>, EngineError> {
        let mut sessions = self.lock_sessions();
        let live = sessions
            .by_id
            .get_mut(&handle)
            .ok_or(EngineError::SessionNotFound(handle))?;
        live.touched = Instant::now();
        Ok(Arc::clone(&live.session))
    }

    fn close(&self, handle: Uuid) {
        self.lock_sessions().remove(handle);
    }
}
