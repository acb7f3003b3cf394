//! The `learnlock study` command: interactive duels over the due queue.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use learnlock_core::model::{score_label, ClaimStatus, Concept, DuelResult};
use learnlock_core::session::SubmitOutcome;
use learnlock_core::DuelEngine;
use learnlock_providers::load_config_from;

use super::{human_duration, open_engine};

const IMAGE_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".webp", ".bmp", ".heic", ".tif", ".tiff",
];

type Input = Lines<BufReader<Stdin>>;

/// How a single duel ended from the learner's side.
enum Flow {
    Revealed(DuelResult),
    Skipped(Option<DuelResult>),
    Quit(Option<DuelResult>),
}

/// A learner command typed instead of an answer.
enum Command {
    Skip,
    Quit,
}

fn command(line: &str) -> Option<Command> {
    match line.trim().to_lowercase().as_str() {
        "skip" | "s" | "/skip" => Some(Command::Skip),
        "quit" | "q" | "/quit" => Some(Command::Quit),
        _ => None,
    }
}

/// A lone file path to an image. Reading handwriting is left to an OCR tool.
fn looks_like_image(answer: &str) -> bool {
    let answer = answer.trim();
    !answer.is_empty()
        && !answer.contains(char::is_whitespace)
        && IMAGE_EXTENSIONS
            .iter()
            .any(|ext| answer.to_lowercase().ends_with(ext))
}

pub async fn execute(limit: Option<usize>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let engine = open_engine(&config)?;

    let due = engine.due_concepts(Utc::now())?;
    if due.is_empty() {
        println!("Nothing is due for review. All caught up!");
        return Ok(());
    }

    let total = limit.map_or(due.len(), |l| l.min(due.len()));
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    for (index, item) in due.into_iter().take(total).enumerate() {
        println!("\nConcept {} of {}: {}", index + 1, total, item.concept.name);
        if !item.concept.source_quote.is_empty() {
            println!("Source says: \"{}\"", item.concept.source_quote);
        }

        let flow = duel(&engine, &item.concept, &mut input).await?;
        let (result, quit) = match flow {
            Flow::Revealed(result) => (Some(result), false),
            Flow::Skipped(result) => {
                engine.skip_concept(&item.concept.id)?;
                println!("Skipped. Run `learnlock unskip` to bring it back.");
                (result, false)
            }
            Flow::Quit(result) => (result, true),
        };

        if let Some(result) = result {
            show_result(&item.concept, &result);
            let record = engine.record_result(&result)?;
            println!(
                "Next review in {}.",
                human_duration(record.due_at - Utc::now())
            );
        }
        if quit {
            return Ok(());
        }
    }

    println!("\nStudy session complete!");
    Ok(())
}

async fn duel(engine: &DuelEngine, concept: &Concept, input: &mut Input) -> Result<Flow> {
    let handle = engine.start_session(&concept.id)?;
    println!("\n{}", handle.question);
    println!("(answer, then an empty line to submit; 'skip' to skip, 'quit' to exit)");

    loop {
        let answer = match read_answer(input).await? {
            Answer::Command(Command::Skip) => {
                return Ok(Flow::Skipped(engine.abandon_session(handle.id).await?));
            }
            Answer::Command(Command::Quit) | Answer::Eof => {
                return Ok(Flow::Quit(engine.abandon_session(handle.id).await?));
            }
            Answer::Text(text) => text,
        };

        if looks_like_image(&answer) {
            println!("That looks like an image path. Run it through OCR and paste the text instead.");
            continue;
        }

        match engine.submit_answer(handle.id, &answer).await {
            Ok(SubmitOutcome::Reprompt) => println!("Empty response. Type something or 'skip'."),
            Ok(SubmitOutcome::Question(question)) => println!("\n{question}"),
            Ok(SubmitOutcome::Revealed(result)) => return Ok(Flow::Revealed(result)),
            Err(e) if e.is_recoverable() => {
                println!("Could not evaluate that answer: {e}");
                println!("Submit again to retry, or type 'skip'.");
            }
            Err(e) => {
                if let Err(abandon) = engine.abandon_session(handle.id).await {
                    tracing::warn!(error = %abandon, "failed to close session");
                }
                return Err(e.into());
            }
        }
    }
}

enum Answer {
    Text(String),
    Command(Command),
    Eof,
}

/// Read lines until an empty one. A command on the first line acts at once.
async fn read_answer(input: &mut Input) -> Result<Answer> {
    let Some(first) = input.next_line().await? else {
        return Ok(Answer::Eof);
    };
    if let Some(cmd) = command(&first) {
        return Ok(Answer::Command(cmd));
    }
    if first.trim().is_empty() {
        return Ok(Answer::Text(String::new()));
    }

    let mut lines = vec![first];
    while let Some(line) = input.next_line().await? {
        if line.trim().is_empty() {
            break;
        }
        lines.push(line);
    }
    Ok(Answer::Text(lines.join("\n")))
}

fn show_result(concept: &Concept, result: &DuelResult) {
    println!();
    println!("Score: {}/5 {}", result.score, score_label(result.score));
    if result.indeterminate {
        println!("(the last answer could not be evaluated; a neutral score was used)");
    }
    if !result.trajectory.is_empty() {
        println!("Trajectory: {}", result.trajectory_summary());
    }
    println!(
        "Claims satisfied: {}/{}",
        result.claims_satisfied, result.total_claims
    );

    if let Some(last) = result.trajectory.last() {
        println!("\nWhat the source commits to:");
        for (index, claim) in concept.claims.iter().enumerate() {
            let mark = match last.status(index) {
                Some(ClaimStatus::Satisfied) => "[ok]  ",
                Some(ClaimStatus::Violated) => "[wrong]",
                _ => "[missed]",
            };
            println!("  {mark} ({}) {}", claim.kind, claim.text);
        }
    }

    if !result.errors_surfaced.is_empty() {
        let kinds: Vec<String> = result
            .errors_surfaced
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("\nErrors surfaced: {}", kinds.join(", "));
    }
}
