//! Shared HTTP plumbing for the networked adapters.
//!
//! Every adapter funnels its responses through [`check_status`], so the
//! vendor-status to [`Outcome`](quarry_core::Outcome) translation lives in
//! exactly one place.

use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

use quarry_core::ProbeSample;

use super::ProviderError;

/// Browser-like agent; some scraped sources reject unknown clients.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Longest vendor error body kept in an error message.
const ERROR_BODY_LIMIT: usize = 200;

/// Client settings shared by every adapter.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Transport-level ceiling; the orchestrator applies the tighter per-attempt timeout
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("quarry/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpSettings {
    pub fn build_client(&self) -> Result<reqwest::Client, ProviderError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(self.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))
    }
}

/// Map a transport error.
pub fn transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::HttpError(error.to_string())
    }
}

/// Send a request and turn a non-2xx status into a [`ProviderError`].
pub async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
    let response = request.send().await.map_err(transport_error)?;
    check_status(response).await
}

pub async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }

    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ProviderError::AuthError(status.as_u16()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::ApiError {
        status: status.as_u16(),
        message: body.chars().take(ERROR_BODY_LIMIT).collect(),
    })
}

/// Send and decode a JSON body.
pub async fn get_json<D: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<D, ProviderError> {
    send(request)
        .await?
        .json::<D>()
        .await
        .map_err(|e| ProviderError::ParseError(e.to_string()))
}

/// Send and read a text body.
pub async fn get_text(request: reqwest::RequestBuilder) -> Result<String, ProviderError> {
    send(request)
        .await?
        .text()
        .await
        .map_err(|e| ProviderError::ParseError(e.to_string()))
}

/// Time a GET against `url`. Any status counts as a response; only
/// transport failures make the source unreachable.
pub async fn probe(client: &reqwest::Client, url: &str, timeout: Duration) -> ProbeSample {
    let started = Instant::now();
    match client.get(url).timeout(timeout).send().await {
        Ok(response) => ProbeSample::responded(response.status().as_u16(), started.elapsed()),
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "health probe failed");
            ProbeSample::unreachable(started.elapsed())
        }
    }
}

/// Join a base URL and a path without doubling slashes.
pub fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
