//! Circuit breaker for the enrichment service.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: service assumed down, calls fail fast
//! - HalfOpen: one trial call tests recovery
//!
//! # Transitions
//! ```text
//! Closed   -> Open:     failure_count reaches failure_threshold
//! Open     -> HalfOpen: next call after recovery_timeout since last failure
//! HalfOpen -> Closed:   trial call succeeds (failure_count reset)
//! HalfOpen -> Open:     trial call fails (last_failure_time refreshed)
//! ```
//!
//! Failures are consecutive: any success in Closed resets the count. The
//! clock is `tokio::time::Instant` so paused-time tests can drive recovery.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{EnrichError, EnrichResult};
use crate::metrics;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl BreakerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            failure_threshold: std::env::var("ENRICH_BREAKER_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(5),
            recovery_timeout: Duration::from_secs(
                std::env::var("ENRICH_BREAKER_RECOVERY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    trial_in_flight: bool,
}

/// Shared circuit breaker. Clones observe the same state.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: BreakerConfig,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        metrics::record_breaker_state(&name, CircuitState::Closed);
        Self {
            name,
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
                trial_in_flight: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask to make a call.
    ///
    /// Returns `CircuitOpen` while the breaker is open, and in HalfOpen when
    /// the single trial slot is taken. The returned permit must be settled
    /// with `success` or `failure`; dropping it unsettled abandons the call.
    pub fn try_acquire(&self) -> EnrichResult<CallPermit> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(self.permit(false)),
            CircuitState::Open => {
                let recovered = inner
                    .last_failure_time
                    .map_or(true, |at| at.elapsed() >= self.config.recovery_timeout);
                if !recovered {
                    return Err(EnrichError::CircuitOpen);
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.trial_in_flight = true;
                Ok(self.permit(true))
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(EnrichError::CircuitOpen);
                }
                inner.trial_in_flight = true;
                Ok(self.permit(true))
            }
        }
    }

    fn permit(&self, trial: bool) -> CallPermit {
        CallPermit {
            breaker: self.clone(),
            trial,
            settled: false,
        }
    }

    /// Run `operation` under the breaker.
    ///
    /// Only remote failures count against the breaker; a rejected request is
    /// treated as abandoned.
    pub async fn call<F, Fut, T>(&self, operation: F) -> EnrichResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EnrichResult<T>>,
    {
        let permit = self.try_acquire()?;
        match operation().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(e) if e.is_remote_failure() => {
                permit.failure();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen if trial => {
                inner.trial_in_flight = false;
                inner.failure_count = 0;
                self.transition(&mut inner, CircuitState::Closed);
            }
            // Outcomes of calls admitted before the breaker tripped
            _ => {}
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                inner.last_failure_time = Some(Instant::now());
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if trial => {
                inner.trial_in_flight = false;
                inner.failure_count += 1;
                inner.last_failure_time = Some(Instant::now());
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn on_abandon(&self, trial: bool) {
        if trial {
            let mut inner = self.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.trial_in_flight = false;
            }
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        metrics::record_breaker_state(&self.name, to);
        match to {
            CircuitState::Open => warn!(
                breaker = %self.name,
                from = from.as_str(),
                failure_count = inner.failure_count,
                "Circuit opened"
            ),
            _ => info!(
                breaker = %self.name,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit state changed"
            ),
        }
    }

    /// Current state for monitoring.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn last_failure_time(&self) -> Option<Instant> {
        self.lock().last_failure_time
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new("enrichment", BreakerConfig::default())
    }
}

/// Admission to make one call through a breaker.
pub struct CallPermit {
    breaker: CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CallPermit {
    /// True when this is the HalfOpen trial call.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandon(self.trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold: 5,
                recovery_timeout: Duration::from_secs(30),
            },
        )
    }

    async fn fail(breaker: &CircuitBreaker, calls: &AtomicU32) -> EnrichResult<()> {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EnrichError::remote("503"))
            })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker, calls: &AtomicU32) -> EnrichResult<()> {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_fails_fast() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);

        for i in 1..=4 {
            assert!(fail(&breaker, &calls).await.is_err());
            assert_eq!(breaker.state(), CircuitState::Closed);
            assert_eq!(breaker.failure_count(), i);
        }
        assert!(fail(&breaker, &calls).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        // Sixth call inside the recovery window never reaches the service.
        tokio::time::advance(Duration::from_secs(10)).await;
        let err = succeed(&breaker, &calls).await.unwrap_err();
        assert!(matches!(err, EnrichError::CircuitOpen));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);
        for _ in 0..5 {
            let _ = fail(&breaker, &calls).await;
        }

        tokio::time::advance(Duration::from_secs(30)).await;
        succeed(&breaker, &calls).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);
        for _ in 0..5 {
            let _ = fail(&breaker, &calls).await;
        }
        let first_failure = breaker.last_failure_time().unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(fail(&breaker, &calls).await.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.last_failure_time().unwrap() > first_failure);

        // The recovery window restarts from the trial failure.
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(matches!(
            succeed(&breaker, &calls).await,
            Err(EnrichError::CircuitOpen)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);
        for _ in 0..5 {
            let _ = fail(&breaker, &calls).await;
        }
        tokio::time::advance(Duration::from_secs(30)).await;

        let trial = breaker.try_acquire().unwrap();
        assert!(trial.is_trial());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(matches!(breaker.try_acquire(), Err(EnrichError::CircuitOpen)));

        // Abandoning the trial frees the slot without changing state.
        drop(trial);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let retry = breaker.try_acquire().unwrap();
        retry.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let breaker = breaker();
        let calls = AtomicU32::new(0);
        for _ in 0..4 {
            let _ = fail(&breaker, &calls).await;
        }
        succeed(&breaker, &calls).await.unwrap();
        assert_eq!(breaker.failure_count(), 0);

        for _ in 0..4 {
            let _ = fail(&breaker, &calls).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_rejected_request_does_not_count() {
        let breaker = breaker();
        for _ in 0..10 {
            let result: EnrichResult<()> = breaker
                .call(|| async { Err(EnrichError::InvalidRequest("empty prompt".into())) })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }
}
