//! Concept-set parser.
//!
//! A concept set is a TOML file describing already-extracted study material:
//!
//! ```toml
//! [source]
//! title = "Designing Data-Intensive Applications, ch. 3"
//! url = "https://example.com/ddia"
//!
//! [[concepts]]
//! name = "Write-ahead log"
//! question = "Why does a WAL make commits durable?"
//! source_quote = "Every modification is written to an append-only file..."
//! text_file = "wal.txt"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{ConceptDraft, MAX_NAME_CHARS, MAX_QUOTE_CHARS};

/// A parsed concept set.
#[derive(Debug, Clone)]
pub struct ConceptSet {
    pub title: String,
    pub url: Option<String>,
    pub path: PathBuf,
    pub concepts: Vec<ConceptDraft>,
}

#[derive(Debug, Deserialize)]
struct TomlConceptFile {
    #[serde(default)]
    source: TomlSource,
    #[serde(default)]
    concepts: Vec<TomlConcept>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlSource {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlConcept {
    name: String,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    source_quote: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    text_file: Option<PathBuf>,
}

/// Parse a single concept-set file.
pub fn parse_concept_set(path: &Path) -> Result<ConceptSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read concept set: {}", path.display()))?;

    parse_concept_set_str(&content, path)
}

/// Parse concept-set TOML. `text_file` entries resolve against `source_path`'s directory.
pub fn parse_concept_set_str(content: &str, source_path: &Path) -> Result<ConceptSet> {
    let parsed: TomlConceptFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let base = source_path.parent().unwrap_or_else(|| Path::new("."));
    let title = if parsed.source.title.is_empty() {
        source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        parsed.source.title
    };
    let source = parsed.source.url.clone().unwrap_or_else(|| title.clone());

    let concepts = parsed
        .concepts
        .into_iter()
        .map(|c| {
            let text = match (c.text, c.text_file) {
                (Some(_), Some(_)) => {
                    anyhow::bail!("concept '{}' sets both text and text_file", c.name)
                }
                (Some(text), None) => text,
                (None, Some(file)) => {
                    let file = base.join(file);
                    std::fs::read_to_string(&file).with_context(|| {
                        format!("failed to read text for '{}': {}", c.name, file.display())
                    })?
                }
                (None, None) => String::new(),
            };
            let question = c
                .question
                .filter(|q| !q.trim().is_empty())
                .unwrap_or_else(|| ConceptDraft::default_question(&c.name));

            Ok(ConceptDraft {
                name: c.name,
                source: source.clone(),
                question,
                source_quote: c.source_quote,
                text,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ConceptSet {
        title,
        url: parsed.source.url,
        path: source_path.to_path_buf(),
        concepts,
    })
}

/// Load a concept-set file, or every `.toml` file under a directory.
pub fn load_concepts(path: &Path) -> Result<Vec<ConceptSet>> {
    if path.is_dir() {
        load_concept_directory(path)
    } else {
        Ok(vec![parse_concept_set(path)?])
    }
}

/// Recursively load all `.toml` concept sets from a directory.
pub fn load_concept_directory(dir: &Path) -> Result<Vec<ConceptSet>> {
    let mut sets = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            sets.extend(load_concept_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_concept_set(&path) {
                Ok(set) => sets.push(set),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(sets)
}

/// A warning from concept-set validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The concept name (if applicable).
    pub concept: Option<String>,
    pub message: String,
}

/// Check a concept set for problems that would make ingestion fail or degrade.
pub fn validate_concept_set(set: &ConceptSet) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let warn = |concept: &str, message: String| ValidationWarning {
        concept: Some(concept.to_string()),
        message,
    };

    if set.concepts.is_empty() {
        warnings.push(ValidationWarning {
            concept: None,
            message: "concept set has no concepts".into(),
        });
    }

    let mut seen = HashSet::new();
    for c in &set.concepts {
        if !seen.insert(c.name.trim().to_lowercase()) {
            warnings.push(warn(&c.name, format!("duplicate concept name: {}", c.name)));
        }
        if c.name.trim().is_empty() {
            warnings.push(warn(&c.name, "name is empty".into()));
        }
        if c.name.chars().count() > MAX_NAME_CHARS {
            warnings.push(warn(
                &c.name,
                format!("name exceeds {MAX_NAME_CHARS} characters and will be truncated"),
            ));
        }
        if c.source_quote.chars().count() > MAX_QUOTE_CHARS {
            warnings.push(warn(
                &c.name,
                format!("source_quote exceeds {MAX_QUOTE_CHARS} characters and will be truncated"),
            ));
        }
        if c.text.trim().is_empty() {
            warnings.push(warn(&c.name, "text is empty; ingestion will fail".into()));
        }
        if c.question == ConceptDraft::default_question(&c.name) {
            warnings.push(warn(&c.name, "no question given; using the default challenge".into()));
        }
    }

    warnings
}
