//! Shared HTTP plumbing for provider clients

use crate::config::ProviderSettings;
use crate::error::{ProviderError, SyncError, SyncResult};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;

/// Connection setup limit; the per-request limit is enforced by the retry executor
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client carrying the provider's user agent
pub fn build_http_client(settings: &ProviderSettings) -> SyncResult<Client> {
    Client::builder()
        .user_agent(settings.user_agent.clone())
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Map a non-success status onto the provider error taxonomy
pub fn classify_status(status: StatusCode, headers: &HeaderMap) -> Result<(), ProviderError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::NOT_FOUND => Err(ProviderError::NotFound),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            Err(ProviderError::RateLimited {
                retry_after: retry_after(headers),
            })
        }
        s if s.is_server_error() => Err(ProviderError::Transient(format!("HTTP {}", s))),
        s => Err(ProviderError::Malformed(format!("Unexpected HTTP status {}", s))),
    }
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub fn map_request_error(err: reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::Malformed(err.to_string())
    } else {
        // Timeouts, resets and DNS failures are all worth another attempt
        ProviderError::Transient(err.to_string())
    }
}

/// Send the request and return the body of a successful response
pub async fn fetch_body(request: RequestBuilder) -> Result<String, ProviderError> {
    let response = request.send().await.map_err(map_request_error)?;
    classify_status(response.status(), response.headers())?;
    response.text().await.map_err(map_request_error)
}

/// Decode a JSON body, reporting failures as malformed responses
pub fn decode_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))
}
