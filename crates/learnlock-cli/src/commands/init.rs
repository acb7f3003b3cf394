//! The `learnlock init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("learnlock.toml").exists() {
        println!("learnlock.toml already exists, skipping.");
    } else {
        std::fs::write("learnlock.toml", SAMPLE_CONFIG)?;
        println!("Created learnlock.toml");
    }

    std::fs::create_dir_all("concepts")?;
    let example_path = std::path::Path::new("concepts/example.toml");
    if example_path.exists() {
        println!("concepts/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_CONCEPT_SET)?;
        println!("Created concepts/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Export GEMINI_API_KEY or GROQ_API_KEY (or edit learnlock.toml)");
    println!("  2. Run: learnlock validate --concepts concepts/example.toml");
    println!("  3. Run: learnlock ingest --concepts concepts/example.toml");
    println!("  4. Run: learnlock study");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# learnlock configuration

default_provider = "gemini"
default_model = "gemini-2.5-flash"
fallback = ["groq"]
temperature = 0.3
max_tokens = 2000

[providers.gemini]
type = "gemini"
api_key = "${GEMINI_API_KEY}"

[providers.groq]
type = "openai"
api_key = "${GROQ_API_KEY}"
base_url = "https://api.groq.com/openai"
model = "openai/gpt-oss-120b"

# A local Ollama server speaks the same protocol:
# [providers.local]
# type = "openai"
# base_url = "http://localhost:11434"
# model = "llama3.1"

[engine]
max_interval = 180.0
pass_threshold = 3
"#;

const EXAMPLE_CONCEPT_SET: &str = r#"[source]
title = "Bloom filters"
url = "https://en.wikipedia.org/wiki/Bloom_filter"

[[concepts]]
name = "Bloom filter"
question = "How can a Bloom filter say 'definitely not present' but only 'maybe present'?"
source_quote = "False positive matches are possible, but false negatives are not."
text = """
A Bloom filter is a bit array of m bits, all initially zero, plus k independent
hash functions. Adding an element sets the k bits chosen by hashing it. A query
hashes the element the same way: if any of the k bits is zero, the element was
never added. If all are one, the element may have been added, or the bits may
have been set by other elements, which is a false positive. Elements cannot be
removed, because clearing a bit could clear it for other elements too. The false
positive rate grows as the array fills and shrinks as m grows relative to the
number of elements.
"""
"#;
