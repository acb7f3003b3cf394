//! CLI integration tests using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use chrono::Utc;
use predicates::prelude::*;
use tempfile::TempDir;

use learnlock_core::model::{Claim, ClaimKind, Concept, ConceptDraft};
use learnlock_core::scheduler::ScheduleRecord;
use learnlock_core::traits::ConceptStore;
use learnlock_core::EngineConfig;
use learnlock_store::JsonStore;

const CONCEPT_SET: &str = r#"
[source]
title = "Storage engines"

[[concepts]]
name = "Write-ahead log"
question = "Why does a WAL make commits durable?"
source_quote = "Every modification is written to an append-only file before it is applied."
text = "Changes are appended to a log and flushed before the data pages are touched."

[[concepts]]
name = "LSM tree"
question = "Why are LSM writes fast?"
text = "Writes go to an in-memory table that is flushed as sorted runs and compacted later."
"#;

/// A command isolated from the user's home, keys, and data.
fn learnlock(dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("learnlock").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env("LEARNLOCK_DATA_DIR", dir.path().join("data"))
        .env_remove("GROQ_API_KEY")
        .env_remove("GEMINI_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("LEARNLOCK_GROQ_MODEL")
        .env_remove("LEARNLOCK_GEMINI_MODEL")
        .env_remove("RUST_LOG");
    cmd
}

fn write_concept_set(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("storage.toml");
    std::fs::write(&path, CONCEPT_SET).unwrap();
    path
}

/// Store one concept, due now, directly in the data dir.
fn seed_due_concept(data_dir: &Path) -> Concept {
    let store = JsonStore::open(data_dir).unwrap();
    let draft = ConceptDraft {
        name: "Bloom filter".into(),
        source: "notes".into(),
        question: "How can a Bloom filter rule an element out?".into(),
        source_quote: "False negatives are not possible.".into(),
        text: String::new(),
    };
    let concept = Concept::from_draft(
        &draft,
        vec![
            Claim::new("Any zero bit proves absence", ClaimKind::Mechanism),
            Claim::new("Elements cannot be removed", ClaimKind::Boundary),
        ],
    );
    store.save_concept(&concept).unwrap();
    let record = ScheduleRecord::new(
        &concept.id,
        &EngineConfig::default(),
        Utc::now() - chrono::Duration::hours(1),
    );
    store.save_schedule(&concept.id, &record).unwrap();
    concept
}

/// A provider that is configured but never reachable.
fn write_unreachable_provider_config(dir: &TempDir) {
    std::fs::write(
        dir.path().join("learnlock.toml"),
        r#"
default_provider = "local"
fallback = []

[providers.local]
type = "openai"
base_url = "http://127.0.0.1:9"
model = "llama3.1"
"#,
    )
    .unwrap();
}

#[test]
fn validate_valid_concept_set() {
    let dir = TempDir::new().unwrap();
    let path = write_concept_set(&dir);

    learnlock(&dir)
        .arg("validate")
        .arg("--concepts")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Storage engines (2 concepts)"))
        .stdout(predicate::str::contains("All concept sets valid"));
}

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dupes.toml");
    std::fs::write(
        &path,
        r#"
[[concepts]]
name = "Raft"
text = "Leader election by majority vote."

[[concepts]]
name = "Raft"
text = ""
"#,
    )
    .unwrap();

    learnlock(&dir)
        .arg("validate")
        .arg("--concepts")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("WARNING"))
        .stdout(predicate::str::contains("warning(s) found"));
}

#[test]
fn validate_directory() {
    let dir = TempDir::new().unwrap();
    let sets = dir.path().join("sets");
    std::fs::create_dir_all(&sets).unwrap();
    std::fs::write(sets.join("storage.toml"), CONCEPT_SET).unwrap();

    learnlock(&dir)
        .arg("validate")
        .arg("--concepts")
        .arg(&sets)
        .assert()
        .success()
        .stdout(predicate::str::contains("Storage engines"));
}

#[test]
fn validate_nonexistent_file() {
    let dir = TempDir::new().unwrap();

    learnlock(&dir)
        .arg("validate")
        .arg("--concepts")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    learnlock(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created learnlock.toml"))
        .stdout(predicate::str::contains("Created concepts/example.toml"));

    assert!(dir.path().join("learnlock.toml").exists());
    assert!(dir.path().join("concepts/example.toml").exists());

    // The generated example is itself valid.
    learnlock(&dir)
        .arg("validate")
        .arg("--concepts")
        .arg("concepts/example.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("All concept sets valid"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    learnlock(&dir).arg("init").assert().success();

    learnlock(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn ingest_without_provider_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_concept_set(&dir);

    learnlock(&dir)
        .arg("ingest")
        .arg("--concepts")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("GROQ_API_KEY"));
}

#[test]
fn empty_store_views() {
    let dir = TempDir::new().unwrap();

    learnlock(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No concepts yet"));

    learnlock(&dir)
        .arg("due")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing is due"));

    learnlock(&dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Concepts:  0"))
        .stdout(predicate::str::contains("Mean ease: -"))
        .stdout(predicate::str::contains("Reviews:   0"))
        .stdout(predicate::str::contains("Avg score: -"));
}

#[test]
fn seeded_concept_shows_up() {
    let dir = TempDir::new().unwrap();
    seed_due_concept(&dir.path().join("data"));

    learnlock(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bloom filter"))
        .stdout(predicate::str::contains("due"));

    learnlock(&dir)
        .arg("due")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 concept(s) due"));

    learnlock(&dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Concepts:  1"))
        .stdout(predicate::str::contains("Due now:   1"))
        .stdout(predicate::str::contains("Mean ease: 2.50"));
}

#[test]
fn config_masks_keys() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("custom.toml");
    std::fs::write(
        &config_path,
        r#"
[providers.gemini]
type = "gemini"
api_key = "AIza-very-secret"
"#,
    )
    .unwrap();

    learnlock(&dir)
        .arg("config")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("***"))
        .stdout(predicate::str::contains("gemini-2.5-flash"))
        .stdout(predicate::str::contains("AIza-very-secret").not());
}

#[test]
fn config_picks_up_environment_keys() {
    let dir = TempDir::new().unwrap();

    learnlock(&dir)
        .env("GROQ_API_KEY", "gsk-from-env")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("groq"))
        .stdout(predicate::str::contains("https://api.groq.com/openai"))
        .stdout(predicate::str::contains("gsk-from-env").not());
}

#[test]
fn study_with_nothing_due() {
    let dir = TempDir::new().unwrap();
    write_unreachable_provider_config(&dir);

    learnlock(&dir)
        .arg("study")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing is due"));
}

#[test]
fn study_rejects_image_paths_and_skips() {
    let dir = TempDir::new().unwrap();
    write_unreachable_provider_config(&dir);
    seed_due_concept(&dir.path().join("data"));

    learnlock(&dir)
        .arg("study")
        .write_stdin("whiteboard.png\n\nskip\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "How can a Bloom filter rule an element out?",
        ))
        .stdout(predicate::str::contains("image path"))
        .stdout(predicate::str::contains("Skipped."))
        .stdout(predicate::str::contains("Study session complete!"));

    // The skip sticks until the concept is restored.
    learnlock(&dir)
        .arg("due")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing is due"));

    learnlock(&dir)
        .arg("unskip")
        .arg("bloom")
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored: Bloom filter"));

    learnlock(&dir)
        .arg("due")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 concept(s) due"));
}

#[test]
fn skip_and_unskip_by_name() {
    let dir = TempDir::new().unwrap();
    seed_due_concept(&dir.path().join("data"));

    learnlock(&dir)
        .arg("unskip")
        .assert()
        .success()
        .stdout(predicate::str::contains("No skipped concepts."));

    learnlock(&dir)
        .arg("skip")
        .arg("BLOOM")
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipped: Bloom filter"));

    learnlock(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped"));

    learnlock(&dir)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Due now:   0"))
        .stdout(predicate::str::contains("Skipped:   1"));

    learnlock(&dir)
        .arg("unskip")
        .assert()
        .success()
        .stdout(predicate::str::contains("- Bloom filter"));

    learnlock(&dir)
        .arg("skip")
        .arg("raft")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no concept matching 'raft'"));
}

#[test]
fn study_quits_on_end_of_input() {
    let dir = TempDir::new().unwrap();
    write_unreachable_provider_config(&dir);
    seed_due_concept(&dir.path().join("data"));

    learnlock(&dir)
        .arg("study")
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("Concept 1 of 1: Bloom filter"))
        .stdout(predicate::str::contains("Study session complete!").not());

    // Quitting before any turn leaves the schedule untouched.
    learnlock(&dir)
        .arg("due")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 concept(s) due"));
}

#[test]
fn help_output() {
    let dir = TempDir::new().unwrap();

    learnlock(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Adversarial study duels with spaced repetition",
        ));
}

#[test]
fn version_output() {
    let dir = TempDir::new().unwrap();

    learnlock(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("learnlock"));
}
