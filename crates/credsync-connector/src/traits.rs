//! Trait seams for the consumed external systems.
//!
//! The identity-provider and broker clients are collaborators this crate
//! does not implement; the reconciliation engine is written against these
//! traits and tested against in-memory fakes.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::ConnectorResult;
use crate::types::{AlterationOutcome, CredentialAlteration, ProviderUser, ScramMechanism};

/// Read access to the identity provider's enabled-user population.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetch every currently-enabled user in the realm.
    ///
    /// Pagination against the provider is an implementation detail; the
    /// returned list is always the full population.
    async fn fetch_enabled_users(&self) -> ConnectorResult<Vec<ProviderUser>>;

    /// Lightweight connectivity probe.
    async fn check_connection(&self) -> ConnectorResult<()>;
}

/// Administrative access to the broker's SCRAM credential store.
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    /// Describe the mechanisms currently registered per principal.
    ///
    /// `principals = None` lists every principal that has credentials.
    async fn describe_credentials(
        &self,
        principals: Option<&BTreeSet<String>>,
    ) -> ConnectorResult<BTreeMap<String, Vec<ScramMechanism>>>;

    /// Submit one batched credential alteration request.
    ///
    /// Returns an outcome per principal; a rejected principal never
    /// aborts its siblings. An `Err` return means the batch itself could
    /// not be submitted.
    async fn alter_credentials(
        &self,
        alterations: Vec<CredentialAlteration>,
    ) -> ConnectorResult<BTreeMap<String, AlterationOutcome>>;

    /// Lightweight connectivity probe.
    async fn check_connection(&self) -> ConnectorResult<()>;
}
