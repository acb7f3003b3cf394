//! learnlock-store: JSON file persistence for concepts, schedules, and reviews.
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/concepts/<id>.json
//! <data_dir>/schedules/<id>.json
//! <data_dir>/reviews/<review-id>.json
//! ```
//!
//! Every write goes to a temporary file in the target directory and is then
//! renamed over the old record, so a reader sees either the old or the new
//! record and never a partial one.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use learnlock_core::model::{Concept, ReviewRecord};
use learnlock_core::scheduler::ScheduleRecord;
use learnlock_core::traits::ConceptStore;

const CONCEPTS_DIR: &str = "concepts";
const SCHEDULES_DIR: &str = "schedules";
const REVIEWS_DIR: &str = "reviews";

/// A `ConceptStore` backed by one JSON file per record.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Open (creating if needed) a store rooted at `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let root = data_dir.into();
        for sub in [CONCEPTS_DIR, SCHEDULES_DIR, REVIEWS_DIR] {
            let dir = root.join(sub);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        debug!(root = %root.display(), "opened store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, sub: &str, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join(sub).join(format!("{id}.json")))
    }
}

/// Ids become file names, so they must stay inside their directory.
fn validate_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
        && !id.starts_with('.');
    if !ok {
        anyhow::bail!("invalid record id: {id:?}");
    }
    Ok(())
}

fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let record = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(record))
}

fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(record).context("failed to serialize record")?;
    let dir = path
        .parent()
        .with_context(|| format!("record path has no parent: {}", path.display()))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Every readable record in `dir`. Corrupt files are logged and skipped.
fn read_all<T: DeserializeOwned>(dir: &Path, kind: &str) -> Result<Vec<T>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to list {}", dir.display())),
    };

    let mut records = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        match read_record::<T>(&path) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => warn!("skipping unreadable {kind} record: {e:#}"),
        }
    }
    Ok(records)
}

impl ConceptStore for JsonStore {
    fn load_concept(&self, id: &str) -> Result<Option<Concept>> {
        read_record(&self.record_path(CONCEPTS_DIR, id)?)
    }

    fn save_concept(&self, concept: &Concept) -> Result<()> {
        write_record(&self.record_path(CONCEPTS_DIR, &concept.id)?, concept)
    }

    fn list_concepts(&self) -> Result<Vec<Concept>> {
        let mut concepts: Vec<Concept> = read_all(&self.root.join(CONCEPTS_DIR), "concept")?;
        concepts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(concepts)
    }

    fn load_schedule(&self, id: &str) -> Result<Option<ScheduleRecord>> {
        read_record(&self.record_path(SCHEDULES_DIR, id)?)
    }

    fn save_schedule(&self, id: &str, record: &ScheduleRecord) -> Result<()> {
        write_record(&self.record_path(SCHEDULES_DIR, id)?, record)
    }

    fn add_review(&self, review: &ReviewRecord) -> Result<()> {
        write_record(&self.record_path(REVIEWS_DIR, &review.id)?, review)
    }

    fn list_reviews(&self) -> Result<Vec<ReviewRecord>> {
        let mut reviews: Vec<ReviewRecord> = read_all(&self.root.join(REVIEWS_DIR), "review")?;
        reviews.sort_by(|a, b| a.reviewed_at.cmp(&b.reviewed_at).then(a.id.cmp(&b.id)));
        Ok(reviews)
    }
}
