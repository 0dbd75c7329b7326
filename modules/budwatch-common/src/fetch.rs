use std::time::Duration;

use tracing::warn;

use crate::error::BudwatchError;
use crate::retry::{jittered_delay, RetryOptions};

/// Options for [`fetch_with_retry`]. The timeout applies per attempt.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub retry: RetryOptions,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryOptions::default(),
        }
    }
}

impl FetchOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }
}

/// HTTP with bounded retries. `build` produces a fresh request per attempt.
/// 429 and 5xx responses are retried; any other response is returned for the
/// caller to triage. Once attempts are exhausted the last response (or
/// transport error) is returned as-is.
pub async fn fetch_with_retry<F>(build: F, opts: &FetchOptions) -> Result<reqwest::Response, BudwatchError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = build().timeout(opts.timeout).send().await;

        let exhausted = attempt > opts.retry.max_retries;
        match result {
            Ok(resp) => {
                let status = resp.status();
                let retryable = status.as_u16() == 429 || status.is_server_error();
                if !retryable || exhausted {
                    return Ok(resp);
                }
                warn!(
                    attempt,
                    status = status.as_u16(),
                    url = %resp.url(),
                    "Retryable HTTP status"
                );
            }
            Err(err) => {
                if exhausted {
                    return Err(BudwatchError::Http(err.to_string()));
                }
                warn!(attempt, error = %err, "HTTP request failed, retrying");
            }
        }

        tokio::time::sleep(jittered_delay(&opts.retry, attempt)).await;
    }
}
