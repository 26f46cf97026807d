use crate::core::config::ApiConfig;
use crate::core::error::{Error, Result};
use rand::Rng;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry budget and backoff shape for network calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl From<&ApiConfig> for RetryPolicy {
    fn from(api: &ApiConfig) -> Self {
        Self {
            max_attempts: api.max_retries.max(1),
            base_delay: Duration::from_millis(api.base_delay_ms),
            max_delay: Duration::from_secs(api.max_delay_secs),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the next attempt: `min(2^attempt + jitter, max_delay)`
    /// in units of `base_delay`, raised to the server's retry-after hint.
    pub fn backoff(&self, attempt: u32, jitter: f64, retry_after: Option<Duration>) -> Duration {
        let factor = 2f64.powi(attempt.min(16) as i32) + jitter;
        // Overflowing waits collapse to the cap
        let exponential = Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * factor)
            .unwrap_or(self.max_delay);
        let wait = exponential.min(self.max_delay);
        match retry_after {
            Some(hint) => wait.max(hint),
            None => wait,
        }
    }
}

/// Runs fallible async operations under a bounded retry budget.
#[derive(Debug, Clone, Default)]
pub struct ResilientFetcher {
    policy: RetryPolicy,
}

impl ResilientFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails with an error `is_retryable`
    /// rejects, or the attempt budget runs out.
    ///
    /// Non-retryable errors are returned unchanged on first occurrence. When
    /// the budget is exhausted the last error is wrapped in
    /// [`Error::RetriesExhausted`].
    pub async fn execute<F, Fut, T, P>(&self, mut operation: F, is_retryable: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&Error) -> bool,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(val) => return Ok(val),
                Err(err) if !is_retryable(&err) => {
                    debug!("Non-retryable error: {}", err);
                    return Err(err);
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!("Giving up after {} attempts: {}", attempt, err);
                        return Err(Error::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }
                    let jitter = rand::thread_rng().gen_range(0.0..1.0);
                    let wait = self.policy.backoff(attempt - 1, jitter, err.retry_after());
                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:.2?}",
                        attempt, max_attempts, err, wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    code: i64,
    #[serde(alias = "message")]
    msg: Option<String>,
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Maps a non-success HTTP response onto the error taxonomy.
fn classify_status(
    provider: &str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Error::SourceUnavailable {
            provider: provider.to_string(),
            message: format!("HTTP {status}"),
            retry_after,
        };
    }
    if let Ok(parsed) = serde_json::from_str::<ProviderErrorBody>(body) {
        return Error::Provider {
            provider: provider.to_string(),
            code: parsed.code,
            message: parsed.msg.unwrap_or_else(|| status.to_string()),
        };
    }
    Error::Rejected {
        provider: provider.to_string(),
        status: status.as_u16(),
        message: body.chars().take(200).collect(),
    }
}

/// Sends `request` and returns the body of a successful response.
pub async fn send(provider: &str, request: reqwest::RequestBuilder) -> Result<String> {
    let response = request.send().await.map_err(|e| Error::SourceUnavailable {
        provider: provider.to_string(),
        message: format!("Request error: {e}"),
        retry_after: None,
    })?;

    let status = response.status();
    let retry_after = retry_after_header(&response);
    let body = response.text().await.map_err(|e| Error::SourceUnavailable {
        provider: provider.to_string(),
        message: format!("Failed to read response body: {e}"),
        retry_after: None,
    })?;

    if !status.is_success() {
        return Err(classify_status(provider, status, retry_after, &body));
    }
    Ok(body)
}

/// Issues a GET request and returns the body of a successful response.
pub async fn get_text(client: &reqwest::Client, provider: &str, url: &str) -> Result<String> {
    debug!("Requesting {} data from {}", provider, url);
    send(provider, client.get(url)).await
}

/// Issues a GET request and decodes the JSON body.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
) -> Result<T> {
    let body = get_text(client, provider, url).await?;
    serde_json::from_str(&body).map_err(|e| Error::Malformed {
        provider: provider.to_string(),
        message: e.to_string(),
    })
}

/// Builds the HTTP client shared by an adapter's requests.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("fisc/0.1")
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))
}
