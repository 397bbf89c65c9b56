//! Retrying HTTP requests with failure classification.
//!
//! The policy is pure ([`RetryPolicy`]), logging goes through a
//! [`RetryObserver`], and [`RequestClient`] ties both to `reqwest`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{PlatformError, RequestError};
use crate::metrics;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every time.
    Fixed,
    /// Delay doubles per attempt, capped at `max_delay`.
    Exponential {
        /// Upper bound on a single delay.
        max_delay: Duration,
    },
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Delay growth.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.retry_delay,
            Backoff::Exponential { max_delay } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.retry_delay.saturating_mul(factor).min(max_delay)
            }
        }
    }

    /// Whether another attempt should follow failed attempt `attempt`.
    pub fn should_retry(&self, error: &RequestError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }
}

/// Hook for retry side effects (logging, metrics).
pub trait RetryObserver: Send + Sync {
    /// An attempt failed and another will follow after `delay`.
    fn on_retry(
        &self,
        operation: &str,
        attempt: u32,
        max_attempts: u32,
        error: &RequestError,
        delay: Duration,
    );

    /// The operation failed for good.
    fn on_give_up(&self, operation: &str, attempts: u32, error: &RequestError) {
        let _ = (operation, attempts, error);
    }
}

/// Default observer: `tracing` warnings plus retry counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_retry(
        &self,
        operation: &str,
        attempt: u32,
        max_attempts: u32,
        error: &RequestError,
        delay: Duration,
    ) {
        metrics::inc_request_retries(operation);
        warn!(
            "{} attempt {}/{} failed: {}. Retrying in {:?}",
            operation, attempt, max_attempts, error, delay
        );
    }

    fn on_give_up(&self, operation: &str, attempts: u32, error: &RequestError) {
        if let RequestError::Auth { .. } = error {
            metrics::inc_auth_failures();
        }
        warn!(operation, attempts, error = %error, "Request abandoned");
    }
}

/// A successful value and the attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    /// Parsed result.
    pub value: T,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Run `op` under `policy`.
///
/// Authentication failures return immediately; transient and parse failures
/// are retried until `max_attempts` is reached, then the last one surfaces.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    observer: &dyn RetryObserver,
    operation: &'static str,
    mut op: F,
) -> Result<Attempted<T>, PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                })
            }
            Err(error) if policy.should_retry(&error, attempt) => {
                let delay = policy.delay_for(attempt);
                observer.on_retry(operation, attempt, max_attempts, &error, delay);
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                observer.on_give_up(operation, attempt, &error);
                return Err(match error {
                    RequestError::Auth { status } => PlatformError::Unauthorized { operation, status },
                    other => PlatformError::Exhausted {
                        operation,
                        attempts: attempt,
                        source: other,
                    },
                });
            }
        }
    }
}

/// Map a non-success status to its failure class.
pub fn classify_status(status: StatusCode) -> Option<RequestError> {
    if status.is_success() {
        return None;
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(RequestError::Auth {
            status: status.as_u16(),
        }),
        _ => Some(RequestError::Transient(format!("HTTP {}", status))),
    }
}

/// Decode a JSON body; empty or malformed bodies are parse failures.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, RequestError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RequestError::Parse("empty body".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| RequestError::Parse(e.to_string()))
}

/// `reqwest` client with retries and classification.
#[derive(Clone)]
pub struct RequestClient {
    http: reqwest::Client,
    policy: RetryPolicy,
    observer: Arc<dyn RetryObserver>,
}

impl fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RequestClient {
    /// Wrap an HTTP client with the default tracing observer.
    pub fn new(http: reqwest::Client, policy: RetryPolicy) -> Self {
        Self::with_observer(http, policy, Arc::new(TracingObserver))
    }

    /// Wrap an HTTP client with a custom observer.
    pub fn with_observer(
        http: reqwest::Client,
        policy: RetryPolicy,
        observer: Arc<dyn RetryObserver>,
    ) -> Self {
        Self {
            http,
            policy,
            observer,
        }
    }

    /// Underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Send the request produced by `build` and decode its JSON body.
    ///
    /// `build` is called once per attempt.
    pub async fn send_json<T, B>(&self, operation: &'static str, build: B) -> Result<T, PlatformError>
    where
        T: DeserializeOwned,
        B: Fn() -> reqwest::RequestBuilder,
    {
        let attempted = retry(&self.policy, self.observer.as_ref(), operation, || async {
            let start = Instant::now();
            let response = build()
                .send()
                .await
                .map_err(|e| RequestError::Transient(e.to_string()))?;
            metrics::record_http_latency(start, operation);

            if let Some(error) = classify_status(response.status()) {
                return Err(error);
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| RequestError::Transient(e.to_string()))?;
            parse_body::<T>(&body)
        })
        .await?;

        Ok(attempted.value)
    }
}
