//! Connector error types.
//!
//! Error definitions with transient/permanent classification. Transient
//! errors abort the current reconciliation cycle and are retried by the
//! next scheduled tick; permanent errors require configuration changes.

use thiserror::Error;

use crate::types::ProbeTarget;

/// Error that can occur while talking to the identity provider or the broker.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connectivity errors (transient)
    /// Failed to establish a connection to the target system.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A remote call exceeded its deadline.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// Target system answered but reported itself unavailable.
    #[error("target system unavailable: {message}")]
    TargetUnavailable { message: String },

    /// Circuit breaker refused the call without contacting the target.
    #[error("circuit breaker open for {target}")]
    CircuitOpen { target: ProbeTarget },

    // Authentication / configuration errors (permanent)
    /// The configured service credentials were rejected.
    #[error("authentication failed: invalid service credentials")]
    AuthenticationFailed,

    /// Connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A required configuration value is absent.
    #[error("missing configuration: {var}")]
    MissingConfiguration { var: String },

    // Credential generation errors
    /// Credential generation input was rejected (empty password, zero iterations).
    #[error("invalid credential input: {message}")]
    InvalidCredentialInput { message: String },

    /// A cryptographic primitive could not be instantiated.
    ///
    /// There is no degraded mode for credential generation; callers must
    /// treat this as fatal for the whole cycle.
    #[error("crypto unavailable: {message}")]
    CryptoUnavailable { message: String },

    // Batch errors
    /// An entire alteration batch could not be submitted to the broker.
    #[error("batch submission failed: {message}")]
    BatchSubmission {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectorError {
    /// Check if this error is transient and the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. }
                | ConnectorError::ConnectionTimeout { .. }
                | ConnectorError::TargetUnavailable { .. }
                | ConnectorError::CircuitOpen { .. }
                | ConnectorError::BatchSubmission { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Stable code for classification in audit records and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            ConnectorError::TargetUnavailable { .. } => "TARGET_UNAVAILABLE",
            ConnectorError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            ConnectorError::AuthenticationFailed => "AUTH_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::MissingConfiguration { .. } => "MISSING_CONFIG",
            ConnectorError::InvalidCredentialInput { .. } => "INVALID_CREDENTIAL_INPUT",
            ConnectorError::CryptoUnavailable { .. } => "CRYPTO_UNAVAILABLE",
            ConnectorError::BatchSubmission { .. } => "BATCH_SUBMISSION_FAILED",
            ConnectorError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a target unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        ConnectorError::TargetUnavailable {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a batch submission error.
    pub fn batch_submission(message: impl Into<String>) -> Self {
        ConnectorError::BatchSubmission {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: None,
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_classified() {
        let transient = vec![
            ConnectorError::connection_failed("test"),
            ConnectorError::ConnectionTimeout { timeout_secs: 30 },
            ConnectorError::unavailable("down"),
            ConnectorError::CircuitOpen {
                target: ProbeTarget::Broker,
            },
            ConnectorError::batch_submission("send failed"),
        ];

        for err in transient {
            assert!(
                err.is_transient(),
                "expected {} to be transient",
                err.error_code()
            );
        }
    }

    #[test]
    fn permanent_errors_classified() {
        let permanent = vec![
            ConnectorError::AuthenticationFailed,
            ConnectorError::invalid_config("bad url"),
            ConnectorError::InvalidCredentialInput {
                message: "empty password".to_string(),
            },
            ConnectorError::CryptoUnavailable {
                message: "no hmac".to_string(),
            },
        ];

        for err in permanent {
            assert!(
                err.is_permanent(),
                "expected {} to be permanent",
                err.error_code()
            );
        }
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            ConnectorError::AuthenticationFailed.error_code(),
            "AUTH_FAILED"
        );
        assert_eq!(
            ConnectorError::connection_failed("x").error_code(),
            "CONNECTION_FAILED"
        );
        assert_eq!(
            ConnectorError::CircuitOpen {
                target: ProbeTarget::IdentityProvider,
            }
            .error_code(),
            "CIRCUIT_OPEN"
        );
    }

    #[test]
    fn error_display() {
        let err = ConnectorError::ConnectionTimeout { timeout_secs: 5 };
        assert_eq!(err.to_string(), "connection timeout after 5 seconds");

        let err = ConnectorError::CircuitOpen {
            target: ProbeTarget::Broker,
        };
        assert_eq!(err.to_string(), "circuit breaker open for broker");
    }
}
