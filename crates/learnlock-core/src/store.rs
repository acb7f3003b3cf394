//! In-memory `ConceptStore`, for tests and embedders that persist elsewhere.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::model::{Concept, ReviewRecord};
use crate::scheduler::ScheduleRecord;
use crate::traits::ConceptStore;

#[derive(Default)]
struct Records {
    concepts: HashMap<String, Concept>,
    schedules: HashMap<String, ScheduleRecord>,
    reviews: Vec<ReviewRecord>,
}

/// Mutex-guarded maps keyed by concept id.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> anyhow::Result<MutexGuard<'_, Records>> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl ConceptStore for MemoryStore {
    fn load_concept(&self, id: &str) -> anyhow::Result<Option<Concept>> {
        Ok(self.records()?.concepts.get(id).cloned())
    }

    fn save_concept(&self, concept: &Concept) -> anyhow::Result<()> {
        self.records()?
            .concepts
            .insert(concept.id.clone(), concept.clone());
        Ok(())
    }

    fn list_concepts(&self) -> anyhow::Result<Vec<Concept>> {
        let mut concepts: Vec<Concept> = self.records()?.concepts.values().cloned().collect();
        concepts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(concepts)
    }

    fn load_schedule(&self, id: &str) -> anyhow::Result<Option<ScheduleRecord>> {
        Ok(self.records()?.schedules.get(id).cloned())
    }

    fn save_schedule(&self, id: &str, record: &ScheduleRecord) -> anyhow::Result<()> {
        self.records()?
            .schedules
            .insert(id.to_string(), record.clone());
        Ok(())
    }

    fn add_review(&self, review: &ReviewRecord) -> anyhow::Result<()> {
        self.records()?.reviews.push(review.clone());
        Ok(())
    }

    fn list_reviews(&self) -> anyhow::Result<Vec<ReviewRecord>> {
        let mut reviews = self.records()?.reviews.clone();
        reviews.sort_by(|a, b| a.reviewed_at.cmp(&b.reviewed_at).then(a.id.cmp(&b.id)));
        Ok(reviews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::config::EngineConfig;
    use crate::model::{Claim, ClaimKind, ConceptDraft};

    #[test]
    fn round_trips_records() {
        let store = MemoryStore::new();
        let draft = ConceptDraft {
            name: "Raft".into(),
            source: String::new(),
            question: "How is a leader elected?".into(),
            source_quote: String::new(),
            text: String::new(),
        };
        let concept = Concept::from_draft(
            &draft,
            vec![Claim::new("Candidates win by majority vote", ClaimKind::Mechanism)],
        );
        store.save_concept(&concept).unwrap();
        assert_eq!(store.list_concepts().unwrap().len(), 1);
        assert!(store.load_schedule(&concept.id).unwrap().is_none());

        let record = ScheduleRecord::new(&concept.id, &EngineConfig::default(), Utc::now());
        store.save_schedule(&concept.id, &record).unwrap();
        assert_eq!(store.load_schedule(&concept.id).unwrap(), Some(record));
        assert!(store.load_concept("missing").unwrap().is_none());
    }
}
