//! Connectivity health service.
//!
//! Fronts the two external systems' connectivity probes with one circuit
//! breaker each. Only probing goes through the breakers; the
//! orchestrator's fetch and sync calls carry their own timeouts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use credsync_connector::{
    BrokerAdmin, CircuitBreaker, CircuitBreakerConfig, CircuitState, ConnectorResult,
    IdentityProvider, ProbeTarget,
};

/// Point-in-time connectivity snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub provider_ok: bool,
    pub broker_ok: bool,
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    /// Both dependencies reachable.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.provider_ok && self.broker_ok
    }
}

/// Breaker-guarded connectivity probing for both external systems.
pub struct HealthService<I, B> {
    provider: Arc<I>,
    broker: Arc<B>,
    provider_breaker: CircuitBreaker,
    broker_breaker: CircuitBreaker,
}

impl<I, B> HealthService<I, B>
where
    I: IdentityProvider,
    B: BrokerAdmin,
{
    /// Create a health service with default breaker configuration.
    pub fn new(provider: Arc<I>, broker: Arc<B>) -> Self {
        Self::with_config(provider, broker, CircuitBreakerConfig::default())
    }

    /// Create a health service with a shared breaker configuration.
    pub fn with_config(provider: Arc<I>, broker: Arc<B>, config: CircuitBreakerConfig) -> Self {
        Self {
            provider,
            broker,
            provider_breaker: CircuitBreaker::new(ProbeTarget::IdentityProvider, config.clone()),
            broker_breaker: CircuitBreaker::new(ProbeTarget::Broker, config),
        }
    }

    /// Probe the identity provider through its breaker.
    pub async fn probe_provider(&self) -> ConnectorResult<()> {
        self.provider_breaker
            .execute(|| self.provider.check_connection())
            .await
    }

    /// Probe the broker through its breaker.
    pub async fn probe_broker(&self) -> ConnectorResult<()> {
        self.broker_breaker
            .execute(|| self.broker.check_connection())
            .await
    }

    /// Probe both systems and report a combined status.
    pub async fn status(&self) -> HealthStatus {
        let provider_ok = self.probe_provider().await.is_ok();
        let broker_ok = self.probe_broker().await.is_ok();
        debug!(provider_ok, broker_ok, "connectivity probed");

        HealthStatus {
            provider_ok,
            broker_ok,
            checked_at: Utc::now(),
        }
    }

    /// Current state of the identity-provider breaker.
    pub async fn provider_breaker_state(&self) -> CircuitState {
        self.provider_breaker.state().await
    }

    /// Current state of the broker breaker.
    pub async fn broker_breaker_state(&self) -> CircuitState {
        self.broker_breaker.state().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use credsync_connector::{
        AlterationOutcome, ConnectorError, CredentialAlteration, ProviderUser, ScramMechanism,
    };
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Stub {
        down: AtomicBool,
    }

    impl Stub {
        fn check(&self) -> ConnectorResult<()> {
            if self.down.load(Ordering::SeqCst) {
                Err(ConnectorError::unavailable("down"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for Stub {
        async fn fetch_enabled_users(&self) -> ConnectorResult<Vec<ProviderUser>> {
            Ok(vec![])
        }

        async fn check_connection(&self) -> ConnectorResult<()> {
            self.check()
        }
    }

    #[async_trait]
    impl BrokerAdmin for Stub {
        async fn describe_credentials(
            &self,
            _principals: Option<&BTreeSet<String>>,
        ) -> ConnectorResult<BTreeMap<String, Vec<ScramMechanism>>> {
            Ok(BTreeMap::new())
        }

        async fn alter_credentials(
            &self,
            _alterations: Vec<CredentialAlteration>,
        ) -> ConnectorResult<BTreeMap<String, AlterationOutcome>> {
            Ok(BTreeMap::new())
        }

        async fn check_connection(&self) -> ConnectorResult<()> {
            self.check()
        }
    }

    fn fast_breaker_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            volume_threshold: 2,
            failure_ratio: 0.5,
            cooldown: Duration::from_secs(60),
            success_threshold: 1,
            probe_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn healthy_when_both_reachable() {
        let service = HealthService::new(Arc::new(Stub::default()), Arc::new(Stub::default()));
        let status = service.status().await;
        assert!(status.is_healthy());
    }

    #[tokio::test]
    async fn one_failing_dependency_degrades_status() {
        let broker = Arc::new(Stub::default());
        broker.down.store(true, Ordering::SeqCst);
        let service = HealthService::new(Arc::new(Stub::default()), broker);

        let status = service.status().await;
        assert!(status.provider_ok);
        assert!(!status.broker_ok);
        assert!(!status.is_healthy());
    }

    #[tokio::test]
    async fn repeated_failures_open_only_that_breaker() {
        let broker = Arc::new(Stub::default());
        broker.down.store(true, Ordering::SeqCst);
        let service = HealthService::with_config(
            Arc::new(Stub::default()),
            broker,
            fast_breaker_config(),
        );

        for _ in 0..3 {
            let _ = service.status().await;
        }

        assert_eq!(service.broker_breaker_state().await, CircuitState::Open);
        assert_eq!(
            service.provider_breaker_state().await,
            CircuitState::Closed
        );

        // Next broker probe short-circuits without touching the stub.
        let result = service.probe_broker().await;
        assert!(matches!(result, Err(ConnectorError::CircuitOpen { .. })));
    }
}
