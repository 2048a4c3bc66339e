//! # credsync Connector
//!
//! External-system surface for credsync: everything that touches the
//! identity provider or the broker lives here, behind trait seams the
//! reconciliation engine consumes.
//!
//! - [`config`] - Connection configuration for both systems
//! - [`error`] - Error taxonomy with transient/permanent classification
//! - [`traits`] - `IdentityProvider` and `BrokerAdmin` seams
//! - [`scram`] - SCRAM credential generation (RFC 5802)
//! - [`password`] - Random password generation
//! - [`resilience`] - Circuit breaker for connectivity probes
//! - [`client`] - Batched credential sync client

pub mod client;
pub mod config;
pub mod error;
pub mod password;
pub mod resilience;
pub mod scram;
pub mod traits;
pub mod types;

pub use client::{CredentialSyncClient, SyncFailure};
pub use config::{BrokerConfig, ProviderConfig, SaslCredentials, SecurityProtocol};
pub use error::{ConnectorError, ConnectorResult};
pub use password::{generate_password, DEFAULT_PASSWORD_LEN};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig};
pub use scram::{generate_credential, verify_password, ScramCredential, DEFAULT_ITERATIONS};
pub use traits::{BrokerAdmin, IdentityProvider};
pub use types::{
    AlterationOutcome, BrokerRejection, CircuitState, CredentialAlteration, ProbeTarget,
    ProviderUser, RejectionCode, ScramMechanism,
};
