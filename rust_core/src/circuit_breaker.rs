//! Circuit breaker for the stats, generation and speech APIs.
//!
//! After `failure_threshold` consecutive transient failures the breaker opens
//! and every call fails fast with `UpstreamUnavailable`. Once
//! `recovery_timeout` has passed the next call goes through on trial; enough
//! successful trial calls close it again, a failed one reopens it.
//!
//! Only retriable errors count as failures. A content-policy rejection or a
//! malformed payload means the service answered, so it keeps the circuit closed.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{CommentaryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    /// Successful trial calls needed to close a half-open circuit
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// State plus the counter that matters in that state
#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

impl Phase {
    fn state(&self) -> BreakerState {
        match self {
            Phase::Closed { .. } => BreakerState::Closed,
            Phase::Open { .. } => BreakerState::Open,
            Phase::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    service: &'static str,
    config: BreakerConfig,
    phase: Mutex<Phase>,
}

impl CircuitBreaker {
    pub fn new(service: &'static str, config: BreakerConfig) -> Self {
        Self {
            service,
            config,
            phase: Mutex::new(Phase::Closed { failures: 0 }),
        }
    }

    pub fn with_defaults(service: &'static str) -> Self {
        Self::new(service, BreakerConfig::default())
    }

    pub fn state(&self) -> BreakerState {
        self.phase.lock().state()
    }

    /// Whether a call may go out now. Moves an expired open circuit to half-open.
    fn admit(&self) -> bool {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Closed { .. } | Phase::HalfOpen { .. } => true,
            Phase::Open { since } if since.elapsed() >= self.config.recovery_timeout => {
                *phase = Phase::HalfOpen { successes: 0 };
                tracing::info!(service = self.service, "circuit half-open, allowing trial calls");
                true
            }
            Phase::Open { .. } => false,
        }
    }

    /// Run `call` through the breaker, failing fast with `UpstreamUnavailable` while open.
    pub async fn call<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if !self.admit() {
            return Err(CommentaryError::upstream(self.service, "circuit breaker open"));
        }

        let result = call.await;
        match &result {
            Err(e) if e.is_retriable() => self.on_failure(),
            _ => self.on_success(),
        }
        result
    }

    fn on_success(&self) {
        let mut phase = self.phase.lock();
        *phase = match *phase {
            Phase::HalfOpen { successes } if successes + 1 < self.config.success_threshold => {
                Phase::HalfOpen {
                    successes: successes + 1,
                }
            }
            Phase::HalfOpen { successes } => {
                tracing::info!(
                    service = self.service,
                    successes = successes + 1,
                    "circuit closed after successful trial calls"
                );
                Phase::Closed { failures: 0 }
            }
            _ => Phase::Closed { failures: 0 },
        };
    }

    fn on_failure(&self) {
        let mut phase = self.phase.lock();
        *phase = match *phase {
            Phase::Closed { failures } if failures + 1 >= self.config.failure_threshold => {
                tracing::warn!(
                    service = self.service,
                    failures = failures + 1,
                    "circuit OPENED after consecutive failures"
                );
                Phase::Open {
                    since: Instant::now(),
                }
            }
            Phase::Closed { failures } => Phase::Closed {
                failures: failures + 1,
            },
            Phase::HalfOpen { .. } => {
                tracing::warn!(service = self.service, "circuit re-OPENED during half-open trial");
                Phase::Open {
                    since: Instant::now(),
                }
            }
            // a call admitted before the circuit opened; keep the original open time
            open @ Phase::Open { .. } => open,
        };
    }
}
