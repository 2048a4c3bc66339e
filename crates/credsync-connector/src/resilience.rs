//! Circuit breaker for connectivity probing.
//!
//! Each external system (identity provider, broker) gets its own breaker.
//! The breaker only protects health/readiness probes; reconciliation
//! fetch/sync calls carry their own timeouts and are retried by the next
//! scheduled tick instead.

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{ConnectorError, ConnectorResult};
use crate::types::{CircuitState, ProbeTarget};

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Minimum number of recorded outcomes before the failure ratio is
    /// evaluated.
    pub volume_threshold: usize,
    /// Failure ratio over the rolling window that opens the circuit.
    pub failure_ratio: f64,
    /// Duration the circuit stays open before admitting trial probes.
    pub cooldown: Duration,
    /// Consecutive trial successes required to close the circuit.
    pub success_threshold: u32,
    /// Timeout applied to each probe executed through the breaker.
    pub probe_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            volume_threshold: 4,
            failure_ratio: 0.75,
            cooldown: Duration::from_secs(60),
            success_threshold: 2,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// Rolling window of recent outcomes; `true` = failure.
    window: VecDeque<bool>,
    trial_successes: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker guarding connectivity probes to one external system.
#[derive(Debug)]
pub struct CircuitBreaker {
    target: ProbeTarget,
    config: CircuitBreakerConfig,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(target: ProbeTarget, config: CircuitBreakerConfig) -> Self {
        Self {
            target,
            config,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                trial_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Create a new circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults(target: ProbeTarget) -> Self {
        Self::new(target, CircuitBreakerConfig::default())
    }

    /// The external system this breaker is protecting.
    #[must_use]
    pub fn target(&self) -> ProbeTarget {
        self.target
    }

    /// Get the current circuit state.
    pub async fn state(&self) -> CircuitState {
        self.maybe_transition_to_half_open().await;
        self.inner.read().await.state
    }

    /// Check if a probe is currently allowed through.
    pub async fn is_allowed(&self) -> bool {
        self.state().await.allows_requests()
    }

    /// Record a successful probe.
    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed => {
                Self::push_outcome(&mut inner.window, false, self.config.volume_threshold);
            }
            CircuitState::HalfOpen => {
                inner.trial_successes += 1;
                if inner.trial_successes >= self.config.success_threshold {
                    debug!(
                        probe_target = %self.target,
                        successes = inner.trial_successes,
                        "circuit breaker closing after trial successes"
                    );
                    inner.state = CircuitState::Closed;
                    inner.window.clear();
                    inner.trial_successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed probe.
    pub async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed => {
                Self::push_outcome(&mut inner.window, true, self.config.volume_threshold);
                if inner.window.len() >= self.config.volume_threshold {
                    let failures = inner.window.iter().filter(|failed| **failed).count();
                    let ratio = failures as f64 / inner.window.len() as f64;
                    if ratio >= self.config.failure_ratio {
                        warn!(
                            probe_target = %self.target,
                            failures,
                            window = inner.window.len(),
                            "circuit breaker opening"
                        );
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(Instant::now());
                        inner.window.clear();
                    }
                }
            }
            CircuitState::HalfOpen => {
                warn!(probe_target = %self.target, "circuit breaker reopening after trial failure");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Execute a probe with breaker gating and the per-probe timeout.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> ConnectorResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConnectorResult<T>>,
    {
        if !self.is_allowed().await {
            return Err(ConnectorError::CircuitOpen {
                target: self.target,
            });
        }

        match tokio::time::timeout(self.config.probe_timeout, operation()).await {
            Ok(Ok(value)) => {
                self.record_success().await;
                Ok(value)
            }
            Ok(Err(e)) => {
                if e.is_transient() {
                    self.record_failure().await;
                }
                Err(e)
            }
            Err(_) => {
                self.record_failure().await;
                Err(ConnectorError::ConnectionTimeout {
                    timeout_secs: self.config.probe_timeout.as_secs(),
                })
            }
        }
    }

    /// Reset the breaker to closed state.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Closed;
        inner.window.clear();
        inner.trial_successes = 0;
        inner.opened_at = None;
    }

    async fn maybe_transition_to_half_open(&self) {
        {
            let inner = self.inner.read().await;
            if inner.state != CircuitState::Open {
                return;
            }
        }

        let mut inner = self.inner.write().await;
        if inner.state != CircuitState::Open {
            return;
        }
        let cooled_down = inner
            .opened_at
            .map(|at| at.elapsed() >= self.config.cooldown)
            .unwrap_or(true);
        if cooled_down {
            debug!(probe_target = %self.target, "circuit breaker admitting trial probes");
            inner.state = CircuitState::HalfOpen;
            inner.trial_successes = 0;
        }
    }

    fn push_outcome(window: &mut VecDeque<bool>, failed: bool, capacity: usize) {
        window.push_back(failed);
        while window.len() > capacity {
            window.pop_front();
        }
    }
}
