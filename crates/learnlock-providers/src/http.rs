//! HTTP plumbing shared by the providers: client construction and mapping
//! transport failures and error statuses onto `ProviderError`.

use std::time::Duration;

use anyhow::Context;

use learnlock_core::ProviderError;

pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Used when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub(crate) fn build_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

pub(crate) fn send_error(e: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

/// Pass a successful response through; turn an error status into a `ProviderError`.
pub(crate) async fn check_status(
    response: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    match status {
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
                * 1000;
            Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            })
        }
        401 | 403 => {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::AuthenticationFailed(body))
        }
        404 => Err(ProviderError::ModelNotFound(model.to_string())),
        s if s >= 400 => {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::ApiError {
                status,
                message: body,
            })
        }
        _ => Ok(response),
    }
}

/// Map a body that failed to deserialize.
pub(crate) fn parse_error(e: reqwest::Error) -> ProviderError {
    ProviderError::ApiError {
        status: 0,
        message: format!("failed to parse response: {e}"),
    }
}
