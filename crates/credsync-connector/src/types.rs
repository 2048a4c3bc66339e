//! Shared connector types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ConnectorError;

/// SCRAM mechanism variants supported by the broker (RFC 5802 / RFC 7677).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScramMechanism {
    /// SCRAM-SHA-256.
    Sha256,
    /// SCRAM-SHA-512.
    Sha512,
}

impl ScramMechanism {
    /// SASL mechanism name as the broker advertises it.
    #[must_use]
    pub fn sasl_name(&self) -> &'static str {
        match self {
            Self::Sha256 => "SCRAM-SHA-256",
            Self::Sha512 => "SCRAM-SHA-512",
        }
    }

    /// Native output width of the mechanism's hash, in bytes.
    ///
    /// Also the derived-key length used by credential generation.
    #[must_use]
    pub fn key_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }
}

impl std::fmt::Display for ScramMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.sasl_name())
    }
}

impl FromStr for ScramMechanism {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('_', "-").as_str() {
            "SCRAM-SHA-256" | "SHA-256" | "SHA256" => Ok(Self::Sha256),
            "SCRAM-SHA-512" | "SHA-512" | "SHA512" => Ok(Self::Sha512),
            _ => Err(ConnectorError::invalid_config(format!(
                "unknown SCRAM mechanism: {s}"
            ))),
        }
    }
}

/// External system protected by a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeTarget {
    /// The identity provider holding the enabled-user population.
    IdentityProvider,
    /// The message broker holding SCRAM credentials.
    Broker,
}

impl std::fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdentityProvider => f.write_str("identity provider"),
            Self::Broker => f.write_str("broker"),
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests pass through.
    Closed,
    /// Requests short-circuit with a breaker-open failure.
    Open,
    /// A limited number of trial requests are allowed through.
    HalfOpen,
}

impl CircuitState {
    /// Whether a request may be issued in this state.
    #[must_use]
    pub fn allows_requests(&self) -> bool {
        matches!(self, Self::Closed | Self::HalfOpen)
    }
}

/// A user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    /// Unique username within the realm; the join key with the broker.
    pub username: String,
}

impl ProviderUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

/// One credential alteration inside a batched broker request.
#[derive(Debug, Clone)]
pub enum CredentialAlteration {
    /// Create or replace the credential for a principal.
    Upsert {
        principal: String,
        credential: crate::scram::ScramCredential,
    },
    /// Remove the credential registered under one mechanism.
    Delete {
        principal: String,
        mechanism: ScramMechanism,
    },
}

impl CredentialAlteration {
    /// The principal this alteration applies to.
    #[must_use]
    pub fn principal(&self) -> &str {
        match self {
            Self::Upsert { principal, .. } | Self::Delete { principal, .. } => principal,
        }
    }
}

/// Why the broker rejected one principal's alteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCode {
    /// The principal does not exist at the broker.
    UnknownPrincipal,
    /// The requested mechanism is not supported or malformed.
    UnsupportedMechanism,
    /// The alteration request itself was malformed.
    InvalidRequest,
    /// Any other broker-side refusal.
    Other,
}

impl std::fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UnknownPrincipal => "UNKNOWN_PRINCIPAL",
            Self::UnsupportedMechanism => "UNSUPPORTED_MECHANISM",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::Other => "OTHER",
        };
        f.write_str(s)
    }
}

/// Per-principal rejection detail returned by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRejection {
    pub code: RejectionCode,
    pub message: String,
}

impl BrokerRejection {
    pub fn new(code: RejectionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for BrokerRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome of one principal's alteration within a batch.
pub type AlterationOutcome = Result<(), BrokerRejection>;
