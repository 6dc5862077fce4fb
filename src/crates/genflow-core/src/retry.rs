//! Transport-level retries for transient generator faults
//!
//! Two retry loops exist in this crate and they must not be confused:
//!
//! ```text
//! RetryingWorkflow            - semantic attempts (validation, review)
//! └── RetryingGenerator       - transport retries (this module)
//!     └── Generator           - one model call
//! ```
//!
//! The workflow counts every generator call it makes against
//! `max_attempts`. A [`RetryingGenerator`] sits *below* that count: a
//! rate-limited or dropped connection is retried here with exponential
//! backoff and the workflow only ever sees the final result. Permanent
//! faults (`Provider`, `InvalidRequest`, `Cancelled`) are passed straight up.
//!
//! # Backoff
//!
//! ```text
//! delay = initial × factor^retry     capped at max_interval
//! jitter: delay × random(0.5..=1.5)
//! ```
//!
//! # Example
//!
//! ```rust
//! use genflow_core::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(4)
//!     .with_initial_interval(Duration::from_millis(250))
//!     .with_backoff_factor(2.0)
//!     .with_jitter(false);
//!
//! assert_eq!(policy.calculate_delay(0), Duration::from_millis(250));
//! assert_eq!(policy.calculate_delay(2), Duration::from_secs(1));
//! assert!(policy.should_retry(3));
//! assert!(!policy.should_retry(4));
//! ```

use crate::error::GenerationError;
use crate::generator::{GenerationRequest, Generator, RawResponse};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff configuration for transient faults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total calls allowed, including the first
    pub max_attempts: usize,

    /// Delay before the first retry
    #[serde(with = "duration_secs")]
    pub initial_interval: Duration,

    /// Multiplier applied per retry
    pub backoff_factor: f64,

    /// Upper bound for any single delay
    #[serde(with = "duration_secs")]
    pub max_interval: Duration,

    /// Randomize delays
    pub jitter: bool,
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` calls with default backoff.
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_interval: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(30),
            jitter: true,
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self::new(1)
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn calculate_delay(&self, retry: usize) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.initial_interval.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = base.min(self.max_interval.as_secs_f64());

        let secs = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..=1.5)
        } else {
            capped
        };

        // Jittered delays near Duration::MAX do not fit; saturate instead.
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Whether call number `calls_made + 1` is still allowed.
    pub fn should_retry(&self, calls_made: usize) -> bool {
        calls_made < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Tracks calls and the last fault for a retry loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    /// Calls made so far
    pub attempts: usize,

    /// Most recent fault message
    pub last_error: Option<String>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call and its fault, if any.
    pub fn record_attempt(&mut self, error: Option<String>) {
        self.attempts += 1;
        self.last_error = error;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// [`Generator`] decorator that retries transient faults with backoff.
pub struct RetryingGenerator<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: Generator> RetryingGenerator<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: Generator> Generator for RetryingGenerator<G> {
    async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, GenerationError> {
        let mut state = RetryState::new();

        loop {
            match self.inner.generate(request).await {
                Ok(response) => {
                    if state.attempts > 0 {
                        debug!(
                            generator = self.inner.name(),
                            retries = state.attempts,
                            "Transport retry succeeded"
                        );
                    }
                    return Ok(response);
                }
                Err(err) => {
                    state.record_attempt(Some(err.to_string()));

                    if !err.is_transient() || !self.policy.should_retry(state.attempts) {
                        if err.is_transient() {
                            warn!(
                                generator = self.inner.name(),
                                calls = state.attempts,
                                error = %err,
                                "Transport retries exhausted"
                            );
                        }
                        return Err(err);
                    }

                    let delay = self.policy.calculate_delay(state.attempts - 1);
                    warn!(
                        generator = self.inner.name(),
                        call = state.attempts,
                        max_calls = self.policy.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Transient generator fault, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("interval must be a non-negative number of seconds"));
        }
        Duration::try_from_secs_f64(secs)
            .map_err(|e| serde::de::Error::custom(format!("interval of {} seconds: {}", secs, e)))
    }
}
