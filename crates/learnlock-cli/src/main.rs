//! learnlock CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "learnlock",
    version,
    about = "Adversarial study duels with spaced repetition"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and an example concept set
    Init,

    /// Validate concept-set TOML files
    Validate {
        /// Path to a concept-set file or directory
        #[arg(long)]
        concepts: PathBuf,
    },

    /// Derive claims for a concept set and add it to the review queue
    Ingest {
        /// Path to a concept-set file or directory
        #[arg(long)]
        concepts: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Duel through the concepts that are due
    Study {
        /// Stop after this many concepts
        #[arg(long)]
        limit: Option<usize>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show concepts due for review
    Due {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List every stored concept
    List {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Take a concept out of the review queue
    Skip {
        /// Part of the concept's name
        name: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Restore a skipped concept, or list skipped concepts
    Unskip {
        /// Part of the concept's name
        name: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show review statistics
    Stats {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the resolved configuration with keys masked
    Config {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("learnlock=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { concepts } => commands::validate::execute(concepts),
        Commands::Ingest { concepts, config } => commands::ingest::execute(concepts, config).await,
        Commands::Study { limit, config } => commands::study::execute(limit, config).await,
        Commands::Due { config } => commands::due::execute(config),
        Commands::List { config } => commands::list::execute(config),
        Commands::Skip { name, config } => commands::skip::skip(name, config),
        Commands::Unskip { name, config } => commands::skip::unskip(name, config),
        Commands::Stats { config } => commands::stats::execute(config),
        Commands::Config { config } => commands::config::execute(config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
