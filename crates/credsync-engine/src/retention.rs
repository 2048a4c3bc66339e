//! Retention/purge engine for the audit trail.
//!
//! Two independent, idempotent strategies bound the operation store: an
//! age cutoff (single bulk delete) and a size budget (oldest-first batch
//! deletion until under budget). Both run on their own timer, safely
//! concurrent with reconciliation writes: they only ever delete rows
//! strictly older than anything a live cycle is appending.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditError, AuditStore, RetentionState};

/// Upper bound for the configurable age limit.
pub const MAX_AGE_DAYS_LIMIT: i64 = 3650;

/// Upper bound for the configurable size limit: 10 GiB.
pub const MAX_BYTES_LIMIT: i64 = 10 * 1024 * 1024 * 1024;

/// Rows deleted per size-purge round.
pub const PURGE_BATCH_SIZE: u32 = 100;

/// Configured retention limits. Unset means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionSettings {
    /// Operation rows older than this many days are purged.
    pub max_age_days: Option<i64>,
    /// Audit storage is kept at or under this many bytes.
    pub max_bytes: Option<i64>,
}

impl RetentionSettings {
    /// Validate both bounds; out-of-range values are rejected before any
    /// state is mutated.
    pub fn validate(&self) -> Result<(), RetentionError> {
        if let Some(days) = self.max_age_days {
            if !(0..=MAX_AGE_DAYS_LIMIT).contains(&days) {
                return Err(RetentionError::InvalidBounds {
                    message: format!(
                        "max_age_days must be between 0 and {MAX_AGE_DAYS_LIMIT}, got {days}"
                    ),
                });
            }
        }
        if let Some(bytes) = self.max_bytes {
            if !(0..=MAX_BYTES_LIMIT).contains(&bytes) {
                return Err(RetentionError::InvalidBounds {
                    message: format!(
                        "max_bytes must be between 0 and {MAX_BYTES_LIMIT}, got {bytes}"
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Errors from retention operations.
#[derive(Debug, Error)]
pub enum RetentionError {
    /// A retention bound was out of range.
    #[error("invalid retention bounds: {message}")]
    InvalidBounds { message: String },

    /// The record store failed.
    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// What one purge pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    /// Rows removed by the age cutoff.
    pub expired_deleted: u64,
    /// Rows removed to get under the size budget.
    pub size_deleted: u64,
    /// Approximate storage after the pass.
    pub approximate_bytes: i64,
}

/// Bounds the audit store by age and size.
pub struct RetentionEngine<S> {
    store: Arc<S>,
    settings: RwLock<RetentionSettings>,
    purge_interval: Duration,
    shutdown: AtomicBool,
}

impl<S: AuditStore> RetentionEngine<S> {
    /// Create a new retention engine with the given initial limits.
    pub fn new(store: Arc<S>, settings: RetentionSettings, purge_interval: Duration) -> Self {
        Self {
            store,
            settings: RwLock::new(settings),
            purge_interval,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Current retention limits.
    pub async fn settings(&self) -> RetentionSettings {
        *self.settings.read().await
    }

    /// Replace the retention limits.
    ///
    /// Validation happens first; an out-of-range request leaves both the
    /// in-memory limits and the persisted state untouched.
    pub async fn update_settings(&self, new: RetentionSettings) -> Result<(), RetentionError> {
        new.validate()?;

        *self.settings.write().await = new;
        let approximate_bytes = self.store.approximate_size_bytes().await?;
        self.persist_state(new, approximate_bytes, Utc::now()).await?;

        info!(
            max_age_days = ?new.max_age_days,
            max_bytes = ?new.max_bytes,
            "retention limits updated"
        );
        Ok(())
    }

    /// Last persisted retention state, for status reporting.
    pub async fn state(&self) -> Result<Option<RetentionState>, RetentionError> {
        Ok(self.store.load_retention_state().await?)
    }

    /// Run one purge pass now.
    pub async fn purge(&self) -> Result<PurgeOutcome, RetentionError> {
        self.purge_at(Utc::now()).await
    }

    /// Run one purge pass with an explicit clock, for deterministic tests.
    pub async fn purge_at(&self, now: DateTime<Utc>) -> Result<PurgeOutcome, RetentionError> {
        let settings = self.settings().await;

        let mut expired_deleted = 0;
        if let Some(days) = settings.max_age_days {
            let cutoff = now - chrono::Duration::days(days);
            expired_deleted = self.store.delete_operations_before(cutoff).await?;
            if expired_deleted > 0 {
                info!(deleted = expired_deleted, %cutoff, "age-based purge removed rows");
            }
        }

        let mut size_deleted = 0;
        let mut approximate_bytes = self.store.approximate_size_bytes().await?;
        if let Some(max_bytes) = settings.max_bytes {
            while approximate_bytes > max_bytes {
                let deleted = self.store.delete_oldest_operations(PURGE_BATCH_SIZE).await?;
                if deleted == 0 {
                    // Store is empty of operation rows; whatever remains is
                    // fixed overhead we cannot purge away.
                    break;
                }
                size_deleted += deleted;
                approximate_bytes = self.store.approximate_size_bytes().await?;
            }
            if size_deleted > 0 {
                info!(
                    deleted = size_deleted,
                    approximate_bytes, max_bytes, "size-based purge removed rows"
                );
            }
        }

        // The state row is refreshed even when nothing was deleted.
        self.persist_state(settings, approximate_bytes, now).await?;

        if expired_deleted + size_deleted >= u64::from(PURGE_BATCH_SIZE) {
            if let Err(e) = self.store.reclaim_space().await {
                warn!(error = %e, "space reclamation failed; freed space stays logical");
            }
        }

        Ok(PurgeOutcome {
            expired_deleted,
            size_deleted,
            approximate_bytes,
        })
    }

    /// Run the purge timer loop until [`stop`](Self::stop) is called.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            interval_secs = self.purge_interval.as_secs(),
            "retention engine started"
        );

        let mut ticker = interval(self.purge_interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match self.purge().await {
                Ok(outcome) => {
                    debug!(
                        expired = outcome.expired_deleted,
                        by_size = outcome.size_deleted,
                        approximate_bytes = outcome.approximate_bytes,
                        "purge pass completed"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "purge pass failed; retrying at next tick");
                }
            }
        }

        info!("retention engine stopped");
    }

    /// Request the purge loop to stop after the current tick.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    async fn persist_state(
        &self,
        settings: RetentionSettings,
        approximate_bytes: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RetentionError> {
        self.store
            .save_retention_state(&RetentionState {
                max_age_days: settings.max_age_days,
                max_bytes: settings.max_bytes,
                approximate_bytes,
                updated_at,
            })
            .await?;
        Ok(())
    }
}
