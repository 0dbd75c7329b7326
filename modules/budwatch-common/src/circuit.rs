use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

/// Options for one logical upstream's breaker.
#[derive(Debug, Clone, Copy)]
pub struct CircuitOptions {
    pub failure_threshold: u32,
    pub reset_time: Duration,
    pub half_open_requests: u32,
}

impl Default for CircuitOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_time: Duration::from_secs(120),
            half_open_requests: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Error, Debug)]
pub enum CircuitError<E> {
    #[error("circuit '{key}' is open, retry after {}s", retry_after.as_secs())]
    Open { key: String, retry_after: Duration },

    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct Entry {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    probes_in_flight: u32,
}

impl Entry {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probes_in_flight: 0,
        }
    }
}

/// Process-wide circuit breaker registry, keyed by logical upstream
/// ("browserbase", "ingest", per-host if desired). One instance is created at
/// startup and passed by reference; there is no hidden global.
#[derive(Debug, Default)]
pub struct CircuitRegistry {
    circuits: Mutex<HashMap<String, Entry>>,
}

impl CircuitRegistry {
    pub fn new() -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// Current state for a key. Unknown keys read as closed.
    pub fn state(&self, key: &str) -> CircuitState {
        self.circuits
            .lock()
            .expect("circuit registry lock poisoned")
            .get(key)
            .map(|e| e.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Admit or reject a call at `now`. Open circuits reject with the time
    /// remaining until a probe is allowed; an open circuit past its reset time
    /// transitions to half-open and admits up to `half_open_requests` probes.
    pub fn begin(
        &self,
        key: &str,
        opts: &CircuitOptions,
        now: DateTime<Utc>,
    ) -> Result<(), Duration> {
        let mut circuits = self.circuits.lock().expect("circuit registry lock poisoned");
        let entry = circuits.entry(key.to_string()).or_insert_with(Entry::new);

        match entry.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let opened_at = entry.opened_at.unwrap_or(now);
                let elapsed = (now - opened_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if elapsed >= opts.reset_time {
                    info!(key, "Circuit half-open, allowing probe");
                    entry.state = CircuitState::HalfOpen;
                    entry.probes_in_flight = 1;
                    Ok(())
                } else {
                    Err(opts.reset_time - elapsed)
                }
            }
            CircuitState::HalfOpen => {
                if entry.probes_in_flight < opts.half_open_requests {
                    entry.probes_in_flight += 1;
                    Ok(())
                } else {
                    Err(opts.reset_time)
                }
            }
        }
    }

    /// Record a successful call. Half-open success closes the circuit.
    pub fn record_success(&self, key: &str) {
        let mut circuits = self.circuits.lock().expect("circuit registry lock poisoned");
        if let Some(entry) = circuits.get_mut(key) {
            if entry.state != CircuitState::Closed {
                info!(key, "Circuit closed");
            }
            entry.state = CircuitState::Closed;
            entry.consecutive_failures = 0;
            entry.opened_at = None;
            entry.probes_in_flight = entry.probes_in_flight.saturating_sub(1);
        }
    }

    /// Record a failed call at `now`. A failed half-open probe reopens; a
    /// closed circuit opens once `failure_threshold` consecutive failures
    /// accumulate.
    pub fn record_failure(&self, key: &str, opts: &CircuitOptions, now: DateTime<Utc>) {
        let mut circuits = self.circuits.lock().expect("circuit registry lock poisoned");
        let entry = circuits.entry(key.to_string()).or_insert_with(Entry::new);

        match entry.state {
            CircuitState::HalfOpen => {
                warn!(key, "Probe failed, circuit re-opened");
                entry.state = CircuitState::Open;
                entry.opened_at = Some(now);
                entry.probes_in_flight = entry.probes_in_flight.saturating_sub(1);
            }
            _ => {
                entry.consecutive_failures += 1;
                if entry.consecutive_failures >= opts.failure_threshold {
                    warn!(
                        key,
                        failures = entry.consecutive_failures,
                        "Failure threshold reached, circuit opened"
                    );
                    entry.state = CircuitState::Open;
                    entry.opened_at = Some(now);
                }
            }
        }
    }

    /// Run `op` under the breaker for `key`.
    pub async fn call<T, E, F, Fut>(
        &self,
        key: &str,
        opts: &CircuitOptions,
        op: F,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(retry_after) = self.begin(key, opts, Utc::now()) {
            return Err(CircuitError::Open {
                key: key.to_string(),
                retry_after,
            });
        }

        match op().await {
            Ok(value) => {
                self.record_success(key);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(key, opts, Utc::now());
                Err(CircuitError::Inner(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn opts() -> CircuitOptions {
        CircuitOptions {
            failure_threshold: 3,
            reset_time: Duration::from_secs(120),
            half_open_requests: 1,
        }
    }

    #[test]
    fn opens_after_threshold_failures() {
        let registry = CircuitRegistry::new();
        let now = Utc::now();

        for _ in 0..2 {
            registry.begin("browserbase", &opts(), now).unwrap();
            registry.record_failure("browserbase", &opts(), now);
        }
        assert_eq!(registry.state("browserbase"), CircuitState::Closed);

        registry.begin("browserbase", &opts(), now).unwrap();
        registry.record_failure("browserbase", &opts(), now);
        assert_eq!(registry.state("browserbase"), CircuitState::Open);
    }

    #[test]
    fn open_circuit_rejects_with_retry_after() {
        let registry = CircuitRegistry::new();
        let now = Utc::now();

        for _ in 0..3 {
            registry.record_failure("browserbase", &opts(), now);
        }

        let later = now + ChronoDuration::seconds(30);
        let retry_after = registry.begin("browserbase", &opts(), later).unwrap_err();
        assert_eq!(retry_after, Duration::from_secs(90));
    }

    #[test]
    fn half_open_probe_success_closes() {
        let registry = CircuitRegistry::new();
        let now = Utc::now();

        for _ in 0..3 {
            registry.record_failure("browserbase", &opts(), now);
        }

        // Past the reset window: one probe is admitted.
        let later = now + ChronoDuration::seconds(121);
        registry.begin("browserbase", &opts(), later).unwrap();
        assert_eq!(registry.state("browserbase"), CircuitState::HalfOpen);

        registry.record_success("browserbase");
        assert_eq!(registry.state("browserbase"), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let registry = CircuitRegistry::new();
        let now = Utc::now();

        for _ in 0..3 {
            registry.record_failure("browserbase", &opts(), now);
        }

        let later = now + ChronoDuration::seconds(121);
        registry.begin("browserbase", &opts(), later).unwrap();
        registry.record_failure("browserbase", &opts(), later);
        assert_eq!(registry.state("browserbase"), CircuitState::Open);

        // Freshly re-opened: rejected again until another reset window passes.
        assert!(registry.begin("browserbase", &opts(), later).is_err());
    }

    #[test]
    fn half_open_admits_at_most_configured_probes() {
        let registry = CircuitRegistry::new();
        let now = Utc::now();

        for _ in 0..3 {
            registry.record_failure("browserbase", &opts(), now);
        }

        let later = now + ChronoDuration::seconds(121);
        registry.begin("browserbase", &opts(), later).unwrap();
        // Second concurrent probe exceeds half_open_requests = 1.
        assert!(registry.begin("browserbase", &opts(), later).is_err());
    }

    #[test]
    fn keys_are_independent() {
        let registry = CircuitRegistry::new();
        let now = Utc::now();

        for _ in 0..3 {
            registry.record_failure("browserbase", &opts(), now);
        }
        assert_eq!(registry.state("browserbase"), CircuitState::Open);
        assert_eq!(registry.state("ingest"), CircuitState::Closed);
        registry.begin("ingest", &opts(), now).unwrap();
    }
}
