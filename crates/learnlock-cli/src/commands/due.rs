//! The `learnlock due` command.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use comfy_table::{Cell, Table};

use learnlock_providers::load_config_from;

use super::{human_duration, open_offline_engine};

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let engine = open_offline_engine(&config)?;

    let now = Utc::now();
    let due = engine.due_concepts(now)?;
    if due.is_empty() {
        println!("Nothing is due for review.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Concept", "Overdue", "Interval", "Ease", "Reviews"]);
    for item in &due {
        let schedule = &item.schedule;
        table.add_row(vec![
            Cell::new(&item.concept.name),
            Cell::new(human_duration(schedule.overdue_by(now))),
            Cell::new(format!("{:.1}d", schedule.interval_days)),
            Cell::new(format!("{:.2}", schedule.ease)),
            Cell::new(schedule.review_count),
        ]);
    }

    println!("{table}");
    println!("{} concept(s) due.", due.len());
    Ok(())
}
