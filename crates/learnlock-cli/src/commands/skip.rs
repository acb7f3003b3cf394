//! The `learnlock skip` and `learnlock unskip` commands.

use std::path::PathBuf;

use anyhow::{bail, Result};

use learnlock_core::model::Concept;
use learnlock_core::traits::ConceptStore;
use learnlock_providers::load_config_from;
use learnlock_store::JsonStore;

use super::open_offline_engine;

/// The single concept whose name contains `query`, ignoring case.
fn find_one<'a>(concepts: &'a [Concept], query: &str) -> Result<&'a Concept> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        bail!("a concept name is required");
    }
    let matches: Vec<&Concept> = concepts
        .iter()
        .filter(|c| c.name.to_lowercase().contains(&needle))
        .collect();
    match matches.as_slice() {
        [] => bail!("no concept matching '{query}'"),
        [one] => Ok(one),
        many => {
            let names: Vec<&str> = many.iter().map(|c| c.name.as_str()).collect();
            bail!(
                "'{query}' matches several concepts: {}. Be more specific.",
                names.join(", ")
            )
        }
    }
}

pub fn skip(name: String, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = JsonStore::open(&config.data_dir)?;
    let concepts: Vec<Concept> = store
        .list_concepts()?
        .into_iter()
        .filter(|c| !c.skipped)
        .collect();
    let target = find_one(&concepts, &name)?;

    let engine = open_offline_engine(&config)?;
    let concept = engine.skip_concept(&target.id)?;
    println!("Skipped: {}", concept.name);
    Ok(())
}

pub fn unskip(name: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = JsonStore::open(&config.data_dir)?;
    let skipped: Vec<Concept> = store
        .list_concepts()?
        .into_iter()
        .filter(|c| c.skipped)
        .collect();

    let Some(name) = name else {
        if skipped.is_empty() {
            println!("No skipped concepts.");
        } else {
            println!("Skipped concepts:");
            for concept in &skipped {
                println!("  - {}", concept.name);
            }
        }
        return Ok(());
    };

    let target = find_one(&skipped, &name)?;
    let engine = open_offline_engine(&config)?;
    let concept = engine.unskip_concept(&target.id)?;
    println!("Restored: {}", concept.name);
    Ok(())
}
