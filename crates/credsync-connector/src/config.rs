//! Connection configuration for the two external systems.
//!
//! Configuration is assembled once at process start (environment or
//! builder), validated eagerly, and passed by reference into component
//! constructors. Invalid values fail startup, not the first use.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConnectorError, ConnectorResult};

/// Security protocol for the broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityProtocol {
    /// Plaintext connection (no encryption or auth).
    Plaintext,
    /// TLS encryption without SASL auth.
    Ssl,
    /// SASL authentication without encryption.
    SaslPlaintext,
    /// SASL authentication over TLS.
    SaslSsl,
}

impl SecurityProtocol {
    /// Whether this protocol requires SASL credentials.
    #[must_use]
    pub fn requires_sasl(&self) -> bool {
        matches!(self, Self::SaslPlaintext | Self::SaslSsl)
    }

    /// Wire-format string for the protocol.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plaintext => "PLAINTEXT",
            Self::Ssl => "SSL",
            Self::SaslPlaintext => "SASL_PLAINTEXT",
            Self::SaslSsl => "SASL_SSL",
        }
    }
}

impl FromStr for SecurityProtocol {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PLAINTEXT" => Ok(Self::Plaintext),
            "SSL" => Ok(Self::Ssl),
            "SASL_PLAINTEXT" => Ok(Self::SaslPlaintext),
            "SASL_SSL" => Ok(Self::SaslSsl),
            _ => Err(ConnectorError::invalid_config(format!(
                "unknown security protocol: {s}"
            ))),
        }
    }
}

/// SASL credentials the sync service itself authenticates with.
#[derive(Clone)]
pub struct SaslCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Identity-provider connection settings.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Base URL of the identity provider, e.g. `https://sso.example.com`.
    pub base_url: String,
    /// Realm whose enabled users are mirrored to the broker.
    pub realm: String,
    /// Service-account client id used for admin API access.
    pub client_id: String,
    /// Service-account client secret.
    pub client_secret: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Load configuration from environment variables.
    ///
    /// Required: `CREDSYNC_PROVIDER_URL`, `CREDSYNC_PROVIDER_REALM`,
    /// `CREDSYNC_PROVIDER_CLIENT_ID`, `CREDSYNC_PROVIDER_CLIENT_SECRET`.
    /// Optional: `CREDSYNC_PROVIDER_TIMEOUT_SECS` (default 30).
    pub fn from_env() -> ConnectorResult<Self> {
        let config = Self {
            base_url: require_env("CREDSYNC_PROVIDER_URL")?,
            realm: require_env("CREDSYNC_PROVIDER_REALM")?,
            client_id: require_env("CREDSYNC_PROVIDER_CLIENT_ID")?,
            client_secret: require_env("CREDSYNC_PROVIDER_CLIENT_SECRET")?,
            request_timeout: Duration::from_secs(parse_env_or(
                "CREDSYNC_PROVIDER_TIMEOUT_SECS",
                30,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration eagerly.
    pub fn validate(&self) -> ConnectorResult<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConnectorError::invalid_config(format!(
                "provider base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.realm.is_empty() {
            return Err(ConnectorError::invalid_config("provider realm is empty"));
        }
        if self.client_id.is_empty() {
            return Err(ConnectorError::invalid_config(
                "provider client_id is empty",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConnectorError::invalid_config(
                "provider request timeout must be positive",
            ));
        }
        Ok(())
    }
}

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Comma-separated list of broker addresses.
    pub bootstrap_servers: String,
    /// Security protocol for the admin connection.
    pub security_protocol: SecurityProtocol,
    /// SASL credentials (required when the protocol uses SASL).
    pub sasl: Option<SaslCredentials>,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Per-request timeout for admin calls.
    pub request_timeout: Duration,
}

impl BrokerConfig {
    /// Load configuration from environment variables.
    ///
    /// Required: `CREDSYNC_BROKER_BOOTSTRAP_SERVERS`.
    /// Optional: `CREDSYNC_BROKER_SECURITY_PROTOCOL` (default PLAINTEXT),
    /// `CREDSYNC_BROKER_CLIENT_ID` (default "credsync"),
    /// `CREDSYNC_BROKER_TIMEOUT_SECS` (default 30),
    /// `CREDSYNC_BROKER_SASL_USERNAME` / `CREDSYNC_BROKER_SASL_PASSWORD`
    /// (required when the protocol uses SASL).
    pub fn from_env() -> ConnectorResult<Self> {
        let security_protocol = match env::var("CREDSYNC_BROKER_SECURITY_PROTOCOL") {
            Ok(v) => SecurityProtocol::from_str(&v)?,
            Err(_) => SecurityProtocol::Plaintext,
        };

        let sasl = if security_protocol.requires_sasl() {
            Some(SaslCredentials {
                username: require_env("CREDSYNC_BROKER_SASL_USERNAME")?,
                password: require_env("CREDSYNC_BROKER_SASL_PASSWORD")?,
            })
        } else {
            None
        };

        let config = Self {
            bootstrap_servers: require_env("CREDSYNC_BROKER_BOOTSTRAP_SERVERS")?,
            security_protocol,
            sasl,
            client_id: env::var("CREDSYNC_BROKER_CLIENT_ID")
                .unwrap_or_else(|_| "credsync".to_string()),
            request_timeout: Duration::from_secs(parse_env_or("CREDSYNC_BROKER_TIMEOUT_SECS", 30)?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration eagerly.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.bootstrap_servers.is_empty() {
            return Err(ConnectorError::invalid_config(
                "broker bootstrap_servers is empty",
            ));
        }
        if self.security_protocol.requires_sasl() && self.sasl.is_none() {
            return Err(ConnectorError::invalid_config(format!(
                "security protocol {} requires SASL credentials",
                self.security_protocol.as_str()
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ConnectorError::invalid_config(
                "broker request timeout must be positive",
            ));
        }
        Ok(())
    }
}

fn require_env(var: &str) -> ConnectorResult<String> {
    env::var(var).map_err(|_| ConnectorError::MissingConfiguration {
        var: var.to_string(),
    })
}

fn parse_env_or(var: &str, default: u64) -> ConnectorResult<u64> {
    match env::var(var) {
        Ok(v) => v.parse().map_err(|_| {
            ConnectorError::invalid_config(format!("{var} must be an integer, got '{v}'"))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_config() -> ProviderConfig {
        ProviderConfig {
            base_url: "https://sso.example.com".to_string(),
            realm: "platform".to_string(),
            client_id: "credsync".to_string(),
            client_secret: "s3cret".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn security_protocol_from_str() {
        assert_eq!(
            "PLAINTEXT".parse::<SecurityProtocol>().unwrap(),
            SecurityProtocol::Plaintext
        );
        assert_eq!(
            "sasl_ssl".parse::<SecurityProtocol>().unwrap(),
            SecurityProtocol::SaslSsl
        );
        assert!("INVALID".parse::<SecurityProtocol>().is_err());
    }

    #[test]
    fn valid_provider_config_passes() {
        assert!(provider_config().validate().is_ok());
    }

    #[test]
    fn provider_config_rejects_non_http_url() {
        let mut config = provider_config();
        config.base_url = "ldap://sso.example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn provider_config_rejects_empty_realm() {
        let mut config = provider_config();
        config.realm = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn provider_debug_redacts_secret() {
        let debug = format!("{:?}", provider_config());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn broker_config_requires_sasl_credentials() {
        let config = BrokerConfig {
            bootstrap_servers: "broker-0:9092".to_string(),
            security_protocol: SecurityProtocol::SaslSsl,
            sasl: None,
            client_id: "credsync".to_string(),
            request_timeout: Duration::from_secs(30),
        };
        assert!(config.validate().is_err());

        let config = BrokerConfig {
            sasl: Some(SaslCredentials {
                username: "admin".to_string(),
                password: "pw".to_string(),
            }),
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn broker_config_rejects_empty_servers() {
        let config = BrokerConfig {
            bootstrap_servers: String::new(),
            security_protocol: SecurityProtocol::Plaintext,
            sasl: None,
            client_id: "credsync".to_string(),
            request_timeout: Duration::from_secs(30),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sasl_debug_redacts_password() {
        let sasl = SaslCredentials {
            username: "admin".to_string(),
            password: "topsecret".to_string(),
        };
        let debug = format!("{sasl:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("topsecret"));
    }
}
