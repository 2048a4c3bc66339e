//! Engine configuration.
//!
//! One immutable [`AppConfig`] is assembled at process start, validated
//! eagerly, and handed by reference to component constructors. Anything
//! invalid fails startup rather than the first reconciliation cycle.

use std::env;
use std::time::Duration;

use credsync_connector::{
    BrokerConfig, ConnectorError, ConnectorResult, ProviderConfig, ScramMechanism,
    DEFAULT_ITERATIONS, DEFAULT_PASSWORD_LEN,
};

use crate::retention::RetentionSettings;

/// Tuning for the reconciliation cycle itself.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval between scheduled reconciliation ticks.
    pub interval: Duration,
    /// Bound on each snapshot fetch (provider users, broker principals).
    pub fetch_timeout: Duration,
    /// Bound on each batched credential alteration call.
    pub alteration_timeout: Duration,
    /// Mechanism newly generated credentials are derived for.
    pub mechanism: ScramMechanism,
    /// PBKDF2 iteration count for generated credentials.
    pub iterations: u32,
    /// Length of the per-principal throwaway passwords.
    pub password_length: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(30),
            alteration_timeout: Duration::from_secs(30),
            mechanism: ScramMechanism::Sha512,
            iterations: DEFAULT_ITERATIONS,
            password_length: DEFAULT_PASSWORD_LEN,
        }
    }
}

impl SyncConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// Optional: `CREDSYNC_SYNC_INTERVAL_SECS`,
    /// `CREDSYNC_SYNC_FETCH_TIMEOUT_SECS`,
    /// `CREDSYNC_SYNC_ALTERATION_TIMEOUT_SECS`, `CREDSYNC_SCRAM_MECHANISM`,
    /// `CREDSYNC_SCRAM_ITERATIONS`, `CREDSYNC_PASSWORD_LENGTH`.
    pub fn from_env() -> ConnectorResult<Self> {
        let defaults = Self::default();
        let config = Self {
            interval: Duration::from_secs(parse_env_or(
                "CREDSYNC_SYNC_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )?),
            fetch_timeout: Duration::from_secs(parse_env_or(
                "CREDSYNC_SYNC_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )?),
            alteration_timeout: Duration::from_secs(parse_env_or(
                "CREDSYNC_SYNC_ALTERATION_TIMEOUT_SECS",
                defaults.alteration_timeout.as_secs(),
            )?),
            mechanism: match env::var("CREDSYNC_SCRAM_MECHANISM") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.mechanism,
            },
            iterations: parse_env_or("CREDSYNC_SCRAM_ITERATIONS", u64::from(defaults.iterations))?
                as u32,
            password_length: parse_env_or(
                "CREDSYNC_PASSWORD_LENGTH",
                defaults.password_length as u64,
            )? as usize,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration eagerly.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.interval.is_zero() {
            return Err(ConnectorError::invalid_config(
                "sync interval must be positive",
            ));
        }
        if self.fetch_timeout.is_zero() || self.alteration_timeout.is_zero() {
            return Err(ConnectorError::invalid_config(
                "sync timeouts must be positive",
            ));
        }
        if self.iterations == 0 {
            return Err(ConnectorError::invalid_config(
                "scram iterations must be positive",
            ));
        }
        if self.password_length < 16 {
            return Err(ConnectorError::invalid_config(
                "password length must be at least 16",
            ));
        }
        Ok(())
    }
}

/// Top-level configuration assembled once at process start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub broker: BrokerConfig,
    pub sync: SyncConfig,
    pub retention: RetentionSettings,
    /// Interval between retention purge passes.
    pub retention_interval: Duration,
}

impl AppConfig {
    /// Load and validate the whole configuration from the environment.
    ///
    /// Retention: `CREDSYNC_RETENTION_MAX_AGE_DAYS`,
    /// `CREDSYNC_RETENTION_MAX_BYTES` (both optional, unset = unbounded),
    /// `CREDSYNC_RETENTION_INTERVAL_SECS` (default 3600).
    pub fn from_env() -> ConnectorResult<Self> {
        let retention = RetentionSettings {
            max_age_days: parse_env_opt("CREDSYNC_RETENTION_MAX_AGE_DAYS")?,
            max_bytes: parse_env_opt("CREDSYNC_RETENTION_MAX_BYTES")?,
        };
        retention
            .validate()
            .map_err(|e| ConnectorError::invalid_config(e.to_string()))?;

        Ok(Self {
            provider: ProviderConfig::from_env()?,
            broker: BrokerConfig::from_env()?,
            sync: SyncConfig::from_env()?,
            retention,
            retention_interval: Duration::from_secs(parse_env_or(
                "CREDSYNC_RETENTION_INTERVAL_SECS",
                3600,
            )?),
        })
    }
}

fn parse_env_or(var: &str, default: u64) -> ConnectorResult<u64> {
    match env::var(var) {
        Ok(v) => v.parse().map_err(|_| {
            ConnectorError::invalid_config(format!("{var} must be an integer, got '{v}'"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_opt(var: &str) -> ConnectorResult<Option<i64>> {
    match env::var(var) {
        Ok(v) => v.parse().map(Some).map_err(|_| {
            ConnectorError::invalid_config(format!("{var} must be an integer, got '{v}'"))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn default_mechanism_and_iterations() {
        let config = SyncConfig::default();
        assert_eq!(config.mechanism, ScramMechanism::Sha512);
        assert_eq!(config.iterations, 4096);
        assert_eq!(config.password_length, 64);
    }

    #[test]
    fn zero_interval_rejected() {
        let config = SyncConfig {
            interval: Duration::ZERO,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let config = SyncConfig {
            iterations: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn short_passwords_rejected() {
        let config = SyncConfig {
            password_length: 8,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
