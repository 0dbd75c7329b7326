use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Options for [`with_retry`]. Total attempts = `max_retries + 1`.
#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Case-folded substrings that mark an error retryable. HTTP 429/502/503
    /// mentions are always retryable regardless of this list.
    pub retryable_errors: Vec<String>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            retryable_errors: vec![
                "timeout".to_string(),
                "connection reset".to_string(),
                "connection refused".to_string(),
                "network".to_string(),
                "temporarily unavailable".to_string(),
            ],
        }
    }
}

impl RetryOptions {
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    pub fn retry_on(mut self, needle: impl Into<String>) -> Self {
        self.retryable_errors.push(needle.into());
        self
    }
}

/// Backoff for the given attempt (1-indexed), without jitter. Capped at
/// `max_delay`.
pub fn backoff_delay(opts: &RetryOptions, attempt: u32) -> Duration {
    let exp = opts.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
    let raw = opts.base_delay.as_millis() as f64 * exp;
    Duration::from_millis((raw as u64).min(opts.max_delay.as_millis() as u64))
}

/// Backoff plus 0–30% jitter, still capped at `max_delay`.
pub fn jittered_delay(opts: &RetryOptions, attempt: u32) -> Duration {
    let base = backoff_delay(opts, attempt);
    let jitter = base.as_millis() as f64 * rand::rng().random_range(0.0..0.3);
    let total = base.as_millis() as u64 + jitter as u64;
    Duration::from_millis(total.min(opts.max_delay.as_millis() as u64))
}

/// Whether an error message warrants another attempt.
pub fn is_retryable(opts: &RetryOptions, message: &str) -> bool {
    let folded = message.to_lowercase();
    if folded.contains("429") || folded.contains("502") || folded.contains("503") {
        return true;
    }
    opts.retryable_errors
        .iter()
        .any(|needle| folded.contains(needle.as_str()))
}

/// Run `op`, retrying transient failures with exponential backoff and jitter.
/// Non-retryable errors and the final attempt's error propagate unchanged.
pub async fn with_retry<T, E, F, Fut>(label: &str, opts: &RetryOptions, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let message = err.to_string();
                if attempt > opts.max_retries || !is_retryable(opts, &message) {
                    return Err(err);
                }
                let delay = jittered_delay(opts, attempt);
                warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_opts() -> RetryOptions {
        RetryOptions {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            retryable_errors: vec!["flaky".to_string()],
        }
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let opts = RetryOptions {
            max_retries: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            retryable_errors: vec![],
        };
        assert_eq!(backoff_delay(&opts, 1), Duration::from_secs(5));
        assert_eq!(backoff_delay(&opts, 2), Duration::from_secs(10));
        assert_eq!(backoff_delay(&opts, 3), Duration::from_secs(20));
        assert_eq!(backoff_delay(&opts, 7), Duration::from_secs(300));
    }

    #[test]
    fn http_429_and_5xx_are_always_retryable() {
        let opts = RetryOptions {
            retryable_errors: vec![],
            ..RetryOptions::default()
        };
        assert!(is_retryable(&opts, "upstream returned HTTP 429"));
        assert!(is_retryable(&opts, "got 502 Bad Gateway"));
        assert!(is_retryable(&opts, "HTTP 503 Service Unavailable"));
        assert!(!is_retryable(&opts, "HTTP 404 Not Found"));
    }

    #[test]
    fn retryable_match_is_case_folded() {
        let opts = fast_opts();
        assert!(is_retryable(&opts, "FLAKY upstream"));
        assert!(!is_retryable(&opts, "permanent failure"));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retry("test", &fast_opts(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("flaky".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry("test", &fast_opts(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("permanent".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded_by_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry("test", &fast_opts(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("flaky".to_string()) }
        })
        .await;
        assert!(result.is_err());
        // max_retries = 3 → 4 total attempts
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
