pub mod config;
pub mod due;
pub mod ingest;
pub mod init;
pub mod list;
pub mod skip;
pub mod stats;
pub mod study;
pub mod validate;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Duration;

use learnlock_core::traits::{
    CandidateClaim, ClaimRequest, ClassifyRequest, ClassifyResponse, DuelCapability,
    QuestionRequest,
};
use learnlock_core::{CapabilityError, DuelEngine};
use learnlock_providers::{build_capability, LearnlockConfig};
use learnlock_store::JsonStore;

/// Capability for commands that only read the store.
struct Offline;

impl Offline {
    fn unavailable() -> CapabilityError {
        CapabilityError::Provider {
            message: "no language model in read-only commands".into(),
            permanent: true,
            retry_after_ms: None,
        }
    }
}

#[async_trait]
impl DuelCapability for Offline {
    async fn generate_claims(&self, _: &ClaimRequest) -> Result<Vec<CandidateClaim>, CapabilityError> {
        Err(Self::unavailable())
    }

    async fn classify_belief(&self, _: &ClassifyRequest) -> Result<ClassifyResponse, CapabilityError> {
        Err(Self::unavailable())
    }

    async fn generate_question(&self, _: &QuestionRequest) -> Result<String, CapabilityError> {
        Err(Self::unavailable())
    }
}

fn open_store(config: &LearnlockConfig) -> Result<Arc<JsonStore>> {
    let store = JsonStore::open(&config.data_dir)
        .with_context(|| format!("failed to open data dir {}", config.data_dir.display()))?;
    Ok(Arc::new(store))
}

/// Engine backed by the configured language model.
pub(crate) fn open_engine(config: &LearnlockConfig) -> Result<DuelEngine> {
    let capability = Arc::new(build_capability(config)?);
    Ok(DuelEngine::new(capability, open_store(config)?, config.engine.clone())?)
}

/// Engine for listing and statistics; any model call fails.
pub(crate) fn open_offline_engine(config: &LearnlockConfig) -> Result<DuelEngine> {
    Ok(DuelEngine::new(
        Arc::new(Offline),
        open_store(config)?,
        config.engine.clone(),
    )?)
}

/// "3d", "5h", "12m" style rendering.
pub(crate) fn human_duration(d: Duration) -> String {
    let minutes = d.num_minutes().abs();
    if minutes >= 60 * 24 {
        format!("{}d", minutes / (60 * 24))
    } else if minutes >= 60 {
        format!("{}h", minutes / 60)
    } else {
        format!("{minutes}m")
    }
}
