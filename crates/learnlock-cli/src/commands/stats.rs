//! The `learnlock stats` command.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;

use learnlock_providers::load_config_from;

use super::open_offline_engine;

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let engine = open_offline_engine(&config)?;
    let stats = engine.stats(Utc::now())?;

    println!("Concepts:  {}", stats.total);
    println!("Due now:   {}", stats.due);
    println!("Mastered:  {}", stats.mastered);
    match stats.mean_ease {
        Some(ease) => println!("Mean ease: {ease:.2}"),
        None => println!("Mean ease: -"),
    }
    println!("Reviews:   {}", stats.reviews);
    match stats.mean_score {
        Some(score) => println!("Avg score: {score:.1}/5"),
        None => println!("Avg score: -"),
    }
    if stats.skipped > 0 {
        println!("Skipped:   {}", stats.skipped);
    }
    Ok(())
}
