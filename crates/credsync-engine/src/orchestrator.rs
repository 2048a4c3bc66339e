//! Reconciliation orchestrator.
//!
//! Composes snapshot fetching, diffing, credential generation, the
//! batched sync client, and the audit sink into one cycle:
//! FETCHING -> DIFFING -> SYNCING -> FINALIZING, with failure at any
//! point aborting the cycle. The scheduler guarantees at most one cycle
//! is in flight, so the walk is strictly sequential.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use credsync_connector::{
    generate_credential, generate_password, BrokerAdmin, ConnectorError, ConnectorResult,
    CredentialSyncClient, IdentityProvider, ScramCredential,
};

use crate::audit::{
    AuditError, AuditStore, OperationKind, SyncBatch, SyncOperation, TriggerSource,
};
use crate::config::SyncConfig;
use crate::diff::SyncPlan;

/// Why a reconciliation cycle failed.
#[derive(Debug, Error)]
pub enum CycleError {
    /// The identity-provider snapshot could not be fetched.
    #[error("identity provider fetch failed: {0}")]
    ProviderFetch(#[source] ConnectorError),

    /// The broker principal snapshot could not be fetched.
    #[error("broker state fetch failed: {0}")]
    BrokerFetch(#[source] ConnectorError),

    /// Credential material could not be generated. Fatal: there is no
    /// degraded mode for credential generation.
    #[error("credential generation failed: {0}")]
    CredentialGeneration(#[source] ConnectorError),

    /// The audit trail could not be written.
    #[error("audit store failure: {0}")]
    Audit(#[from] AuditError),
}

/// Result of one completed reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub correlation_id: Uuid,
    pub trigger: TriggerSource,
    pub items_total: i32,
    pub items_success: i32,
    pub items_error: i32,
    pub duration_ms: u64,
}

/// Drives one full fetch -> diff -> sync -> audit pass.
pub struct ReconciliationOrchestrator<I, B, S> {
    provider: Arc<I>,
    broker: Arc<B>,
    client: CredentialSyncClient<B>,
    store: Arc<S>,
    config: SyncConfig,
}

impl<I, B, S> ReconciliationOrchestrator<I, B, S>
where
    I: IdentityProvider,
    B: BrokerAdmin,
    S: AuditStore,
{
    /// Create a new orchestrator over the two external seams and the
    /// audit store.
    pub fn new(provider: Arc<I>, broker: Arc<B>, store: Arc<S>, config: SyncConfig) -> Self {
        let client = CredentialSyncClient::new(
            Arc::clone(&broker),
            config.alteration_timeout,
            config.mechanism,
        );
        Self {
            provider,
            broker,
            client,
            store,
            config,
        }
    }

    /// Run one reconciliation cycle.
    ///
    /// Exactly one batch row is persisted per initiated cycle. On failure
    /// the batch header is finalized best-effort and the error propagates
    /// to the scheduler; the next tick retries from scratch.
    pub async fn run_cycle(&self, trigger: TriggerSource) -> Result<CycleSummary, CycleError> {
        let correlation_id = Uuid::new_v4();
        let started = Instant::now();
        let mut batch = SyncBatch::started(correlation_id, trigger);
        self.store.insert_batch(&batch).await?;

        info!(
            correlation_id = %correlation_id,
            trigger = %trigger,
            "reconciliation cycle started"
        );

        match self.execute(correlation_id, &mut batch, started).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                batch.finished_at = Some(Utc::now());
                if let Err(audit_err) = self.store.update_batch(&batch).await {
                    warn!(
                        correlation_id = %correlation_id,
                        error = %audit_err,
                        "could not finalize batch header after cycle failure"
                    );
                }
                warn!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "reconciliation cycle failed"
                );
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        correlation_id: Uuid,
        batch: &mut SyncBatch,
        started: Instant,
    ) -> Result<CycleSummary, CycleError> {
        // FETCHING
        let users = self
            .bounded(self.provider.fetch_enabled_users())
            .await
            .map_err(CycleError::ProviderFetch)?;
        let provider_set: BTreeSet<String> = users.into_iter().map(|u| u.username).collect();

        let described = self
            .bounded(self.broker.describe_credentials(None))
            .await
            .map_err(CycleError::BrokerFetch)?;
        let broker_set: BTreeSet<String> = described.into_keys().collect();

        // DIFFING
        let plan = SyncPlan::compute(&provider_set, &broker_set);
        info!(
            correlation_id = %correlation_id,
            upserts = plan.upserts.len(),
            deletes = plan.deletes.len(),
            "sync plan computed"
        );

        let mut items_success = 0i32;
        let mut items_error = 0i32;

        if plan.is_empty() {
            debug!(correlation_id = %correlation_id, "nothing to synchronize");
        } else {
            // SYNCING: upserts first, then orphan deletes.
            let credentials = self.generate_credentials(&plan.upserts)?;

            let upsert_started = Instant::now();
            let failures = self.client.upsert_credentials(&credentials).await;
            let duration_ms = upsert_started.elapsed().as_millis() as i64;
            for principal in &plan.upserts {
                let operation = match failures.get(principal) {
                    None => {
                        items_success += 1;
                        SyncOperation::success(
                            correlation_id,
                            principal,
                            OperationKind::CredentialUpsert,
                            duration_ms,
                        )
                    }
                    Some(failure) => {
                        items_error += 1;
                        SyncOperation::error(
                            correlation_id,
                            principal,
                            OperationKind::CredentialUpsert,
                            failure.code(),
                            &failure.to_string(),
                            duration_ms,
                        )
                    }
                };
                self.store.insert_operation(&operation).await?;
            }

            let delete_started = Instant::now();
            let failures = self.client.delete_credentials(&plan.deletes).await;
            let duration_ms = delete_started.elapsed().as_millis() as i64;
            for principal in &plan.deletes {
                let operation = match failures.get(principal) {
                    None => {
                        items_success += 1;
                        SyncOperation::success(
                            correlation_id,
                            principal,
                            OperationKind::CredentialDelete,
                            duration_ms,
                        )
                    }
                    // Orphan vanished between describe and delete: nothing
                    // left to remove, not a failure.
                    Some(failure) if failure.is_already_absent() => SyncOperation::skipped(
                        correlation_id,
                        principal,
                        OperationKind::CredentialDelete,
                        &failure.to_string(),
                        duration_ms,
                    ),
                    Some(failure) => {
                        items_error += 1;
                        SyncOperation::error(
                            correlation_id,
                            principal,
                            OperationKind::CredentialDelete,
                            failure.code(),
                            &failure.to_string(),
                            duration_ms,
                        )
                    }
                };
                self.store.insert_operation(&operation).await?;
            }
        }

        // FINALIZING
        batch.items_total = plan.len() as i32;
        batch.items_success = items_success;
        batch.items_error = items_error;
        batch.finished_at = Some(Utc::now());
        self.store.update_batch(batch).await?;

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            correlation_id = %correlation_id,
            duration_ms,
            items_total = batch.items_total,
            items_success,
            items_error,
            "reconciliation cycle finished"
        );

        Ok(CycleSummary {
            correlation_id,
            trigger: batch.trigger,
            items_total: batch.items_total,
            items_success,
            items_error,
            duration_ms,
        })
    }

    /// Draw one fresh password per principal and derive its credential.
    fn generate_credentials(
        &self,
        principals: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, ScramCredential>, CycleError> {
        let mut credentials = BTreeMap::new();
        for principal in principals {
            let password = generate_password(self.config.password_length);
            let credential =
                generate_credential(&password, self.config.mechanism, self.config.iterations)
                    .map_err(CycleError::CredentialGeneration)?;
            credentials.insert(principal.clone(), credential);
        }
        Ok(credentials)
    }

    /// Bound one snapshot fetch with the configured timeout.
    async fn bounded<T>(
        &self,
        fut: impl Future<Output = ConnectorResult<T>>,
    ) -> ConnectorResult<T> {
        match tokio::time::timeout(self.config.fetch_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ConnectorError::ConnectionTimeout {
                timeout_secs: self.config.fetch_timeout.as_secs(),
            }),
        }
    }
}
