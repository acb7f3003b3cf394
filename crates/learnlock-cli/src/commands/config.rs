//! The `learnlock config` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use learnlock_providers::load_config_from;

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    println!("Default provider: {}", config.default_provider);
    println!("Default model:    {}", config.default_model);
    println!("Fallback:         {}", config.fallback.join(", "));
    println!("Temperature:      {}", config.temperature);
    println!("Max tokens:       {}", config.max_tokens);
    println!("Data dir:         {}", config.data_dir.display());

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    if names.is_empty() {
        println!("\nNo providers configured. Set GEMINI_API_KEY or GROQ_API_KEY.");
    } else {
        let chain = config.provider_chain();
        let mut table = Table::new();
        table.set_header(vec!["Provider", "Type", "Model", "Base URL", "API key", "Order"]);
        for name in names {
            let provider = &config.providers[name];
            let order = chain
                .iter()
                .position(|n| n == name)
                .map(|i| (i + 1).to_string())
                .unwrap_or_else(|| "-".to_string());
            table.add_row(vec![
                Cell::new(name),
                Cell::new(provider.kind()),
                Cell::new(provider.model().unwrap_or(&config.default_model)),
                Cell::new(provider.base_url().unwrap_or("(default)")),
                Cell::new(if provider.has_key() { "***" } else { "(none)" }),
                Cell::new(order),
            ]);
        }
        println!("\n{table}");
    }

    let engine = toml::to_string_pretty(&config.engine).context("failed to render [engine]")?;
    println!("\n[engine]\n{engine}");
    Ok(())
}
