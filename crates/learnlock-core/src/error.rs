//! Error types for the duel engine and its external collaborators.
//!
//! `ProviderError` lives here rather than in `learnlock-providers` so the
//! engine can downcast provider failures and decide on retries without
//! string matching.

use thiserror::Error;

use crate::traits::TaskKind;

/// Errors that can occur when interacting with an LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The provider answered but the body held no text.
    #[error("empty response from {0}")]
    EmptyResponse(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Failure of one call to the text-generation capability.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The call did not return within the configured bound.
    #[error("capability call timed out after {0}s")]
    Timeout(u64),

    /// The response did not match the requested schema.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The underlying provider failed.
    #[error("provider failure: {message}")]
    Provider {
        message: String,
        permanent: bool,
        /// Delay the provider asked for before the next attempt.
        retry_after_ms: Option<u64>,
    },
}

impl CapabilityError {
    /// Wrap a provider-side `anyhow` error, keeping its permanence and any
    /// rate-limit delay.
    pub fn from_provider(err: anyhow::Error) -> Self {
        let provider = err.downcast_ref::<ProviderError>();
        CapabilityError::Provider {
            message: format!("{err:#}"),
            permanent: provider.is_some_and(ProviderError::is_permanent),
            retry_after_ms: provider.and_then(ProviderError::retry_after_ms),
        }
    }

    /// Returns `true` if retrying cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(self, CapabilityError::Provider { permanent: true, .. })
    }

    /// How long to wait before retrying, if the provider said.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            CapabilityError::Provider {
                retry_after_ms: Some(ms),
                ..
            } => Some(std::time::Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

/// Errors surfaced by the duel engine to its caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Too few claims survived filtering. Fatal for the concept only.
    #[error("ingestion failed for '{concept}': {surviving} claim(s) survived, {required} required")]
    Ingestion {
        concept: String,
        surviving: usize,
        required: usize,
    },

    /// The capability failed or returned unparseable output after its retry.
    #[error("{task} failed: {message}")]
    Capability { task: TaskKind, message: String },

    /// An answer was required but the input was empty.
    #[error("an answer is required")]
    InvalidAnswer,

    /// A schedule update was requested for a concept without a schedule record.
    #[error("no schedule record for concept '{0}'")]
    SchedulingUnderflow(String),

    /// The concept has no claims to duel over.
    #[error("concept '{0}' has no claims")]
    NoClaims(String),

    #[error("concept not found: {0}")]
    ConceptNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    /// A call for this session is already in flight.
    #[error("session {0} is busy")]
    SessionBusy(uuid::Uuid),

    /// Another session is already running for the concept.
    #[error("a session is already active for concept '{0}'")]
    SessionActive(String),

    #[error("session already revealed")]
    SessionClosed,

    #[error("score {0} outside 1..=5")]
    InvalidScore(u8),

    /// The next due date does not fit in a timestamp.
    #[error("next review for concept '{0}' is out of range")]
    ScheduleOutOfRange(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Returns `true` if the caller may retry the same operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Capability { .. } | EngineError::InvalidAnswer | EngineError::SessionBusy(_)
        )
    }

    pub(crate) fn storage(err: anyhow::Error) -> Self {
        EngineError::Storage(format!("{err:#}"))
    }
}
