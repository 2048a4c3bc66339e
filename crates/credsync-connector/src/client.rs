//! Batched credential sync client.
//!
//! Wraps the broker admin seam with batch assembly, a bounded wait, and
//! per-principal outcome collection. One principal's rejection never
//! aborts its siblings; only a failure to submit the batch itself marks
//! every principal failed with the same cause.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::scram::ScramCredential;
use crate::traits::BrokerAdmin;
use crate::types::{CredentialAlteration, RejectionCode, ScramMechanism};

/// Why one principal's credential alteration failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncFailure {
    /// The broker rejected this principal's alteration.
    Rejected { code: RejectionCode, message: String },
    /// No outcome for this principal within the bounded wait.
    Timeout { timeout_secs: u64 },
    /// The entire batch could not be submitted.
    BatchFailed { message: String },
}

impl SyncFailure {
    /// Stable classification code for audit records.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::Rejected { code, .. } => code.to_string(),
            Self::Timeout { .. } => "TIMEOUT".to_string(),
            Self::BatchFailed { .. } => "BATCH_FAILED".to_string(),
        }
    }

    /// Whether the failure means the principal was already absent at the
    /// broker (a delete that found nothing to remove).
    #[must_use]
    pub fn is_already_absent(&self) -> bool {
        matches!(
            self,
            Self::Rejected {
                code: RejectionCode::UnknownPrincipal,
                ..
            }
        )
    }
}

impl std::fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected { code, message } => write!(f, "rejected ({code}): {message}"),
            Self::Timeout { timeout_secs } => {
                write!(f, "no outcome within {timeout_secs} seconds")
            }
            Self::BatchFailed { message } => write!(f, "batch submission failed: {message}"),
        }
    }
}

/// Client issuing batched credential alterations against the broker.
pub struct CredentialSyncClient<B> {
    admin: Arc<B>,
    alteration_timeout: Duration,
    default_mechanism: ScramMechanism,
}

impl<B: BrokerAdmin> CredentialSyncClient<B> {
    /// Create a new sync client.
    ///
    /// `default_mechanism` is the fallback used when the broker reports
    /// no registered mechanisms for an orphaned principal.
    pub fn new(
        admin: Arc<B>,
        alteration_timeout: Duration,
        default_mechanism: ScramMechanism,
    ) -> Self {
        Self {
            admin,
            alteration_timeout,
            default_mechanism,
        }
    }

    /// Create or replace credentials for a set of principals in one batch.
    ///
    /// Returns a failure per principal; an absent entry means success.
    pub async fn upsert_credentials(
        &self,
        credentials: &BTreeMap<String, ScramCredential>,
    ) -> BTreeMap<String, SyncFailure> {
        if credentials.is_empty() {
            return BTreeMap::new();
        }

        let principals: BTreeSet<String> = credentials.keys().cloned().collect();
        let alterations: Vec<CredentialAlteration> = credentials
            .iter()
            .map(|(principal, credential)| CredentialAlteration::Upsert {
                principal: principal.clone(),
                credential: credential.clone(),
            })
            .collect();

        debug!(count = alterations.len(), "submitting credential upsert batch");
        self.submit(alterations, &principals).await
    }

    /// Delete every registered credential for a set of orphaned principals.
    ///
    /// Resolves the full mechanism set per principal first, so stale
    /// credentials under any mechanism are removed, not just the default
    /// one. Returns a failure per principal; an absent entry means success.
    pub async fn delete_credentials(
        &self,
        principals: &BTreeSet<String>,
    ) -> BTreeMap<String, SyncFailure> {
        if principals.is_empty() {
            return BTreeMap::new();
        }

        let described = match tokio::time::timeout(
            self.alteration_timeout,
            self.admin.describe_credentials(Some(principals)),
        )
        .await
        {
            Ok(Ok(described)) => described,
            Ok(Err(e)) => {
                warn!(error = %e, "describe before delete failed");
                return self.fail_all(principals, |_| SyncFailure::BatchFailed {
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!("describe before delete timed out");
                return self.fail_all(principals, |timeout_secs| SyncFailure::Timeout {
                    timeout_secs,
                });
            }
        };

        let mut alterations = Vec::new();
        for principal in principals {
            let mechanisms = match described.get(principal) {
                Some(mechanisms) if !mechanisms.is_empty() => mechanisms.clone(),
                _ => vec![self.default_mechanism],
            };
            for mechanism in mechanisms {
                alterations.push(CredentialAlteration::Delete {
                    principal: principal.clone(),
                    mechanism,
                });
            }
        }

        debug!(count = alterations.len(), "submitting credential delete batch");
        self.submit(alterations, principals).await
    }

    /// Submit one batch and collect per-principal failures.
    async fn submit(
        &self,
        alterations: Vec<CredentialAlteration>,
        expected: &BTreeSet<String>,
    ) -> BTreeMap<String, SyncFailure> {
        let outcome = tokio::time::timeout(
            self.alteration_timeout,
            self.admin.alter_credentials(alterations),
        )
        .await;

        match outcome {
            Ok(Ok(outcomes)) => {
                let mut failures = BTreeMap::new();
                for principal in expected {
                    match outcomes.get(principal) {
                        Some(Ok(())) => {}
                        Some(Err(rejection)) => {
                            failures.insert(
                                principal.clone(),
                                SyncFailure::Rejected {
                                    code: rejection.code,
                                    message: rejection.message.clone(),
                                },
                            );
                        }
                        // Still pending when the call returned.
                        None => {
                            failures.insert(
                                principal.clone(),
                                SyncFailure::Timeout {
                                    timeout_secs: self.alteration_timeout.as_secs(),
                                },
                            );
                        }
                    }
                }
                failures
            }
            Ok(Err(e)) => {
                warn!(error = %e, "credential alteration batch could not be submitted");
                self.fail_all(expected, |_| SyncFailure::BatchFailed {
                    message: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.alteration_timeout.as_secs(),
                    "credential alteration batch timed out"
                );
                self.fail_all(expected, |timeout_secs| SyncFailure::Timeout { timeout_secs })
            }
        }
    }

    fn fail_all(
        &self,
        principals: &BTreeSet<String>,
        failure: impl Fn(u64) -> SyncFailure,
    ) -> BTreeMap<String, SyncFailure> {
        let timeout_secs = self.alteration_timeout.as_secs();
        principals
            .iter()
            .map(|p| (p.clone(), failure(timeout_secs)))
            .collect()
    }
}

// Not strictly required, but lets the orchestrator be cloned cheaply.
impl<B> Clone for CredentialSyncClient<B> {
    fn clone(&self) -> Self {
        Self {
            admin: Arc::clone(&self.admin),
            alteration_timeout: self.alteration_timeout,
            default_mechanism: self.default_mechanism,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectorError, ConnectorResult};
    use crate::scram::{generate_credential, DEFAULT_ITERATIONS};
    use crate::types::{AlterationOutcome, BrokerRejection};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBroker {
        /// Mechanisms registered per principal.
        registered: BTreeMap<String, Vec<ScramMechanism>>,
        /// Principals to reject, with the rejection to return.
        rejections: BTreeMap<String, BrokerRejection>,
        /// Principals to silently omit from the outcome map.
        omit: BTreeSet<String>,
        /// Whole-batch submission failure.
        fail_batch: bool,
        /// Artificial latency before answering.
        delay: Option<Duration>,
        /// Alterations seen, for assertions.
        seen: Mutex<Vec<CredentialAlteration>>,
    }

    #[async_trait]
    impl BrokerAdmin for FakeBroker {
        async fn describe_credentials(
            &self,
            principals: Option<&BTreeSet<String>>,
        ) -> ConnectorResult<BTreeMap<String, Vec<ScramMechanism>>> {
            let mut result = self.registered.clone();
            if let Some(principals) = principals {
                result.retain(|p, _| principals.contains(p));
            }
            Ok(result)
        }

        async fn alter_credentials(
            &self,
            alterations: Vec<CredentialAlteration>,
        ) -> ConnectorResult<BTreeMap<String, AlterationOutcome>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_batch {
                return Err(ConnectorError::batch_submission("broker unreachable"));
            }

            let mut outcomes = BTreeMap::new();
            for alteration in &alterations {
                let principal = alteration.principal().to_string();
                if self.omit.contains(&principal) {
                    continue;
                }
                let outcome = match self.rejections.get(&principal) {
                    Some(rejection) => Err(rejection.clone()),
                    None => Ok(()),
                };
                outcomes.insert(principal, outcome);
            }
            self.seen.lock().unwrap().extend(alterations);
            Ok(outcomes)
        }

        async fn check_connection(&self) -> ConnectorResult<()> {
            Ok(())
        }
    }

    fn client(broker: FakeBroker) -> (CredentialSyncClient<FakeBroker>, Arc<FakeBroker>) {
        let admin = Arc::new(broker);
        (
            CredentialSyncClient::new(
                Arc::clone(&admin),
                Duration::from_millis(200),
                ScramMechanism::Sha512,
            ),
            admin,
        )
    }

    fn credential() -> ScramCredential {
        generate_credential("pw", ScramMechanism::Sha512, DEFAULT_ITERATIONS).unwrap()
    }

    #[tokio::test]
    async fn all_successes_return_empty_failure_map() {
        let (client, _) = client(FakeBroker::default());
        let mut creds = BTreeMap::new();
        creds.insert("alice".to_string(), credential());
        creds.insert("bob".to_string(), credential());

        let failures = client.upsert_credentials(&creds).await;
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn one_rejection_does_not_affect_siblings() {
        let mut broker = FakeBroker::default();
        broker.rejections.insert(
            "bob".to_string(),
            BrokerRejection::new(RejectionCode::UnsupportedMechanism, "bad mechanism"),
        );
        let (client, _) = client(broker);

        let mut creds = BTreeMap::new();
        for name in ["alice", "bob", "carol"] {
            creds.insert(name.to_string(), credential());
        }

        let failures = client.upsert_credentials(&creds).await;
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures.get("bob"),
            Some(SyncFailure::Rejected {
                code: RejectionCode::UnsupportedMechanism,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn batch_failure_marks_every_principal() {
        let broker = FakeBroker {
            fail_batch: true,
            ..FakeBroker::default()
        };
        let (client, _) = client(broker);

        let mut creds = BTreeMap::new();
        creds.insert("alice".to_string(), credential());
        creds.insert("bob".to_string(), credential());

        let failures = client.upsert_credentials(&creds).await;
        assert_eq!(failures.len(), 2);
        for failure in failures.values() {
            assert!(matches!(failure, SyncFailure::BatchFailed { .. }));
        }
    }

    #[tokio::test]
    async fn timeout_marks_every_principal() {
        let broker = FakeBroker {
            delay: Some(Duration::from_secs(5)),
            ..FakeBroker::default()
        };
        let (client, _) = client(broker);

        let mut creds = BTreeMap::new();
        creds.insert("alice".to_string(), credential());

        let failures = client.upsert_credentials(&creds).await;
        assert!(matches!(
            failures.get("alice"),
            Some(SyncFailure::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn pending_principal_is_treated_as_error() {
        let mut broker = FakeBroker::default();
        broker.omit.insert("bob".to_string());
        let (client, _) = client(broker);

        let mut creds = BTreeMap::new();
        creds.insert("alice".to_string(), credential());
        creds.insert("bob".to_string(), credential());

        let failures = client.upsert_credentials(&creds).await;
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures.get("bob"),
            Some(SyncFailure::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn delete_covers_every_registered_mechanism() {
        let mut broker = FakeBroker::default();
        broker.registered.insert(
            "carol".to_string(),
            vec![ScramMechanism::Sha256, ScramMechanism::Sha512],
        );
        let (client, admin) = client(broker);

        let principals: BTreeSet<String> = ["carol".to_string()].into();
        let failures = client.delete_credentials(&principals).await;
        assert!(failures.is_empty());

        let seen = admin.seen.lock().unwrap();
        let mut mechanisms: Vec<ScramMechanism> = seen
            .iter()
            .filter_map(|a| match a {
                CredentialAlteration::Delete {
                    principal,
                    mechanism,
                } if principal == "carol" => Some(*mechanism),
                _ => None,
            })
            .collect();
        mechanisms.sort();
        assert_eq!(
            mechanisms,
            vec![ScramMechanism::Sha256, ScramMechanism::Sha512]
        );
    }

    #[tokio::test]
    async fn delete_falls_back_to_default_mechanism() {
        let (client, admin) = client(FakeBroker::default());

        let principals: BTreeSet<String> = ["ghost".to_string()].into();
        let failures = client.delete_credentials(&principals).await;
        assert!(failures.is_empty());

        let seen = admin.seen.lock().unwrap();
        assert!(matches!(
            seen.as_slice(),
            [CredentialAlteration::Delete {
                mechanism: ScramMechanism::Sha512,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn already_absent_classification() {
        let failure = SyncFailure::Rejected {
            code: RejectionCode::UnknownPrincipal,
            message: "not found".to_string(),
        };
        assert!(failure.is_already_absent());

        let failure = SyncFailure::Rejected {
            code: RejectionCode::Other,
            message: "nope".to_string(),
        };
        assert!(!failure.is_already_absent());
    }

    #[tokio::test]
    async fn empty_batches_are_not_submitted() {
        let (client, admin) = client(FakeBroker::default());

        let failures = client.upsert_credentials(&BTreeMap::new()).await;
        assert!(failures.is_empty());
        let failures = client.delete_credentials(&BTreeSet::new()).await;
        assert!(failures.is_empty());

        assert!(admin.seen.lock().unwrap().is_empty());
    }
}
