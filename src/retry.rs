//! Bounded retry of outbound HTTP requests on transient failures.

use std::time::Duration;

use reqwest::StatusCode;

/// Statuses treated as transient server failures.
const RETRY_STATUSES: [StatusCode; 4] = [
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Retry policy for transport-level failures.
///
/// A request is retried when the connection fails, when it times out, or when the server answers
/// with one of the transient 5xx statuses. Client errors and anything that happens after a
/// response has been accepted are never retried.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt.
    pub retries: u32,
    /// Base delay, doubled on every retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Return a new RetryPolicy.
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    /// Delay before retry number `attempt` (zero based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2_u32.saturating_pow(attempt))
    }

    /// Send a request, retrying on transient failures.
    ///
    /// Returns the last response received, whatever its status, or the last transport error.
    /// Callers decide what a non-success status means.
    ///
    /// # Arguments
    ///
    /// * `request`: Builds a fresh request for each attempt
    pub async fn send<F>(&self, request: F) -> Result<reqwest::Response, reqwest::Error>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let exhausted = attempt >= self.retries;
            match request().send().await {
                Ok(response) if !exhausted && RETRY_STATUSES.contains(&response.status()) => {
                    tracing::info!(
                        "{} answered {}, retrying ({}/{})",
                        response.url(),
                        response.status(),
                        attempt + 1,
                        self.retries
                    );
                }
                Ok(response) => return Ok(response),
                Err(err) if !exhausted && (err.is_connect() || err.is_timeout()) => {
                    tracing::info!("request failed: {}, retrying ({}/{})", err, attempt + 1, self.retries);
                }
                Err(err) => return Err(err),
            }
            tokio::time::sleep(self.delay(attempt)).await;
            attempt += 1;
        }
    }
}
