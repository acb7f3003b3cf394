//! The `learnlock validate` command.

use std::path::PathBuf;

use anyhow::Result;

use learnlock_core::parser;

pub fn execute(concepts_path: PathBuf) -> Result<()> {
    let sets = parser::load_concepts(&concepts_path)?;

    let mut total_warnings = 0;

    for set in &sets {
        println!("Concept set: {} ({} concepts)", set.title, set.concepts.len());

        let warnings = parser::validate_concept_set(set);
        for w in &warnings {
            let prefix = w
                .concept
                .as_ref()
                .map(|name| format!("  [{name}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All concept sets valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
