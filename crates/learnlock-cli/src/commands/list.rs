//! The `learnlock list` command.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use comfy_table::{Cell, Table};

use learnlock_core::traits::ConceptStore;
use learnlock_providers::load_config_from;
use learnlock_store::JsonStore;

use super::human_duration;

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = JsonStore::open(&config.data_dir)?;

    let concepts = store.list_concepts()?;
    if concepts.is_empty() {
        println!("No concepts yet. Run `learnlock ingest --concepts <file>` first.");
        return Ok(());
    }

    let now = Utc::now();
    let mut table = Table::new();
    table.set_header(vec!["Concept", "Source", "Claims", "Reviews", "Next review", "Status"]);
    for concept in &concepts {
        let schedule = store.load_schedule(&concept.id)?;
        let (reviews, next, status) = match &schedule {
            Some(s) if concept.skipped => (s.review_count.to_string(), "-".to_string(), "skipped"),
            None if concept.skipped => ("-".to_string(), "-".to_string(), "skipped"),
            Some(s) if s.is_mastered(&config.engine) => {
                (s.review_count.to_string(), next_review(s, now), "mastered")
            }
            Some(s) if s.is_due(now) => (s.review_count.to_string(), "now".to_string(), "due"),
            Some(s) => (s.review_count.to_string(), next_review(s, now), "learning"),
            None => ("-".to_string(), "-".to_string(), "unscheduled"),
        };
        table.add_row(vec![
            Cell::new(&concept.name),
            Cell::new(&concept.source),
            Cell::new(concept.claims.len()),
            Cell::new(reviews),
            Cell::new(next),
            Cell::new(status),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn next_review(
    schedule: &learnlock_core::scheduler::ScheduleRecord,
    now: chrono::DateTime<Utc>,
) -> String {
    if schedule.is_due(now) {
        "now".to_string()
    } else {
        format!("in {}", human_duration(schedule.due_at - now))
    }
}
