//! Per-device circuit breakers.
//!
//! Each device gets its own breaker, created lazily through the
//! registry. The accept/reject decision is always taken under the
//! breaker's mutex; the guarded remote call runs outside it via the
//! `try_acquire` / `record_success` / `record_failure` protocol.

use crate::cast::error::CastError;
use minaret_types::api::{BreakerState, BreakerStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    next_attempt: Option<Instant>,
    /// Set while the single HalfOpen trial call is in flight.
    trial_in_flight: bool,
    total_calls: u64,
    successful_calls: u64,
    failure_reasons: HashMap<String, u32>,
}

/// Failure/backoff state machine for one device.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        CircuitBreaker {
            name: name.into(),
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                next_attempt: None,
                trial_in_flight: false,
                total_calls: 0,
                successful_calls: 0,
                failure_reasons: HashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decide whether a guarded call may proceed.
    ///
    /// An `Ok` from an Open breaker means this call became the HalfOpen
    /// trial; the caller must report back via `record_success` or
    /// `record_failure`.
    pub fn try_acquire(&self) -> Result<(), CastError> {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;

        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let deadline = inner.next_attempt.unwrap_or_else(Instant::now);
                if Instant::now() >= deadline {
                    debug!("circuit breaker for {} entering half-open trial", self.name);
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_in_flight = true;
                    Ok(())
                } else {
                    Err(CastError::CircuitOpen {
                        device: self.name.clone(),
                        retry_in: deadline.saturating_duration_since(Instant::now()),
                    })
                }
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    // One trial at a time; everyone else waits it out.
                    let retry_in = inner
                        .next_attempt
                        .map(|d| d.saturating_duration_since(Instant::now()))
                        .unwrap_or_default();
                    Err(CastError::CircuitOpen {
                        device: self.name.clone(),
                        retry_in,
                    })
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Report a successful guarded call. Returns true when this closed a
    /// previously open breaker.
    pub fn record_success(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.successful_calls += 1;
        inner.failure_count = 0;
        inner.trial_in_flight = false;
        inner.next_attempt = None;
        let recovered = inner.state != BreakerState::Closed;
        if recovered {
            info!("circuit breaker for {} closed after successful trial", self.name);
        }
        inner.state = BreakerState::Closed;
        recovered
    }

    /// Report a failed guarded call. Returns true when this tripped the
    /// breaker open.
    pub fn record_failure(&self, reason: &str) -> bool {
        let mut inner = self.inner.lock();
        *inner.failure_reasons.entry(reason.to_string()).or_insert(0) += 1;
        inner.trial_in_flight = false;
        inner.failure_count += 1;

        let should_trip = match inner.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => inner.failure_count >= self.failure_threshold,
            BreakerState::Open => false,
        };
        if should_trip {
            inner.state = BreakerState::Open;
            inner.next_attempt = Some(Instant::now() + self.recovery_timeout);
            warn!(
                "circuit breaker for {} opened after {} failures (reason: {}), retry in {}s",
                self.name,
                inner.failure_count,
                reason,
                self.recovery_timeout.as_secs()
            );
        }
        should_trip
    }

    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner.lock();
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.failure_threshold,
            total_calls: inner.total_calls,
            successful_calls: inner.successful_calls,
            retry_in_secs: inner
                .next_attempt
                .filter(|_| inner.state == BreakerState::Open)
                .map(|d| d.saturating_duration_since(Instant::now()).as_secs()),
            failure_reasons: inner.failure_reasons.clone(),
        }
    }

    /// Force the breaker back to closed, dropping all failure state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.next_attempt = None;
        inner.trial_in_flight = false;
    }
}

/// Lazy registry of breakers keyed by device identity.
pub struct BreakerRegistry {
    failure_threshold: u32,
    recovery_timeout: Duration,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        BreakerRegistry {
            failure_threshold,
            recovery_timeout,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Get the breaker for a device, creating it on first access.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    name,
                    self.failure_threshold,
                    self.recovery_timeout,
                ))
            })
            .clone()
    }

    /// Snapshot of a single breaker, if it exists.
    pub fn status_of(&self, name: &str) -> Option<BreakerStatus> {
        self.breakers.lock().get(name).map(|b| b.status())
    }

    /// Snapshot of every registered breaker.
    pub fn statuses(&self) -> HashMap<String, BreakerStatus> {
        self.breakers
            .lock()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.status()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("Adahn", 3, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_closed_allows_calls_and_resets_on_success() {
        let b = breaker();
        assert!(b.try_acquire().is_ok());
        b.record_failure("unreachable");
        b.record_failure("unreachable");
        assert_eq!(b.status().failure_count, 2);

        assert!(b.try_acquire().is_ok());
        b.record_success();
        assert_eq!(b.status().failure_count, 0);
        assert_eq!(b.status().state, BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_opens_at_threshold_and_rejects() {
        let b = breaker();
        for _ in 0..3 {
            assert!(b.try_acquire().is_ok());
            b.record_failure("handshake");
        }
        assert_eq!(b.status().state, BreakerState::Open);

        // Fourth call is rejected without reaching the wrapped call.
        match b.try_acquire() {
            Err(CastError::CircuitOpen { device, retry_in }) => {
                assert_eq!(device, "Adahn");
                assert!(retry_in <= Duration::from_secs(60));
            }
            other => panic!("expected CircuitOpen, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let b = breaker();
        for _ in 0..3 {
            let _ = b.try_acquire();
            b.record_failure("handshake");
        }
        assert_eq!(b.status().state, BreakerState::Open);

        tokio::time::advance(Duration::from_secs(61)).await;

        // First call after the deadline becomes the trial.
        assert!(b.try_acquire().is_ok());
        assert_eq!(b.status().state, BreakerState::HalfOpen);

        // A second caller during the trial is rejected.
        assert!(matches!(b.try_acquire(), Err(CastError::CircuitOpen { .. })));

        assert!(b.record_success());
        let status = b.status();
        assert_eq!(status.state, BreakerState::Closed);
        assert_eq!(status.failure_count, 0);
        assert!(status.retry_in_secs.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens() {
        let b = breaker();
        for _ in 0..3 {
            let _ = b.try_acquire();
            b.record_failure("handshake");
        }
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(b.try_acquire().is_ok());
        assert!(b.record_failure("handshake"));

        let status = b.status();
        assert_eq!(status.state, BreakerState::Open);
        // Fresh deadline was computed.
        assert!(status.retry_in_secs.unwrap() > 58);
        assert!(matches!(b.try_acquire(), Err(CastError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn test_failure_reason_histogram() {
        let b = breaker();
        b.record_failure("unreachable");
        b.record_failure("unreachable");
        b.record_failure("handshake");
        let status = b.status();
        assert_eq!(status.failure_reasons.get("unreachable"), Some(&2));
        assert_eq!(status.failure_reasons.get("handshake"), Some(&1));
    }

    #[tokio::test]
    async fn test_registry_is_lazy_and_shared() {
        let registry = BreakerRegistry::new(5, Duration::from_secs(60));
        assert!(registry.status_of("Adahn").is_none());

        let first = registry.get("Adahn");
        let second = registry.get("Adahn");
        assert!(Arc::ptr_eq(&first, &second));

        first.record_failure("unreachable");
        assert_eq!(registry.status_of("Adahn").unwrap().failure_count, 1);
        assert_eq!(registry.statuses().len(), 1);
    }
}
