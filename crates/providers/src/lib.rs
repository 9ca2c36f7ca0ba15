//! Inference client implementations for chorus.
//!
//! All clients implement the `chorus_core::InferenceClient` trait. The
//! router builds the right client for an agent's resolved provider and
//! gates it behind the per-credential concurrency limit.

pub mod anthropic;
pub mod limiter;
pub mod openai_compat;
pub mod router;
pub mod scripted;
pub mod sse;

pub use anthropic::AnthropicClient;
pub use limiter::{CredentialPool, GatedClient};
pub use openai_compat::OpenAiCompatClient;
pub use router::ProviderRouter;
pub use scripted::ScriptedClient;

use chorus_core::InferenceError;
use std::time::Duration;
use tracing::warn;

/// Seconds to wait when a 429 carries no usable `retry-after`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Turn a non-success HTTP status into the matching `InferenceError`.
pub(crate) async fn map_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        warn!(provider, retry_after_secs, "Rate limited");
        return Err(InferenceError::RateLimited { retry_after_secs });
    }

    let body = response.text().await.unwrap_or_default();
    warn!(provider, status = status.as_u16(), body = %body, "Inference request failed");
    Err(InferenceError::Status {
        status_code: status.as_u16(),
        body,
    })
}
