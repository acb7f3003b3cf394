//! The `learnlock ingest` command.

use std::path::PathBuf;

use anyhow::Result;

use learnlock_core::engine::{IngestOutcome, IngestProgress};
use learnlock_core::model::ConceptDraft;
use learnlock_core::parser;
use learnlock_providers::load_config_from;

use super::open_engine;

/// Console progress reporter.
struct ConsoleReporter;

impl IngestProgress for ConsoleReporter {
    fn on_concept_start(&self, name: &str) {
        eprintln!("  Extracting claims: {name}");
    }

    fn on_concept_done(&self, outcome: &IngestOutcome) {
        match &outcome.result {
            Ok(concept) => eprintln!(
                "  Done: {} ({} claims)",
                concept.name,
                concept.claims.len()
            ),
            Err(e) => eprintln!("  FAILED: {}: {e}", outcome.name),
        }
    }
}

pub async fn execute(concepts_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let sets = parser::load_concepts(&concepts_path)?;
    let drafts: Vec<ConceptDraft> = sets.into_iter().flat_map(|s| s.concepts).collect();
    anyhow::ensure!(
        !drafts.is_empty(),
        "no concepts found in {}",
        concepts_path.display()
    );

    let engine = open_engine(&config)?;

    eprintln!("learnlock v{} — Ingesting {} concepts", env!("CARGO_PKG_VERSION"), drafts.len());
    eprintln!();

    let report = engine.ingest_batch(&drafts, &ConsoleReporter).await;

    print_summary(&report);

    let ingested = report.ingested().count();
    if !report.quorum_met {
        eprintln!(
            "Warning: {} claims in total, outside the expected {}..={}.",
            report.total_claims, config.engine.batch_min_claims, config.engine.batch_max_claims
        );
    }
    anyhow::ensure!(ingested > 0, "no concept survived claim extraction");

    println!("\n{ingested} concept(s) added. Run `learnlock study` to begin.");
    Ok(())
}

fn print_summary(report: &learnlock_core::engine::BatchReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Concept", "Claims", "Status"]);

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(concept) => table.add_row(vec![
                Cell::new(&concept.name),
                Cell::new(concept.claims.len()),
                Cell::new("ok"),
            ]),
            Err(e) => table.add_row(vec![
                Cell::new(&outcome.name),
                Cell::new("-"),
                Cell::new(e.to_string()),
            ]),
        };
    }

    println!("\n{table}");
}
