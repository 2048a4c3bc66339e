//! Audit trail records and the record-store seam.
//!
//! Every reconciliation cycle writes one [`SyncBatch`] row and one
//! [`SyncOperation`] row per principal outcome. Operation rows are
//! append-only: created as outcomes arrive, never mutated, deleted only
//! by the retention engine.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// What started a reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Scheduled timer tick.
    Timer,
    /// Operator-initiated request.
    Manual,
    /// Identity-provider webhook notification.
    Webhook,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timer => "timer",
            Self::Manual => "manual",
            Self::Webhook => "webhook",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TriggerSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timer" => Ok(Self::Timer),
            "manual" => Ok(Self::Manual),
            "webhook" => Ok(Self::Webhook),
            _ => Err(format!("unknown trigger source: {s}")),
        }
    }
}

/// Kind of per-principal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CredentialUpsert,
    CredentialDelete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CredentialUpsert => "credential_upsert",
            Self::CredentialDelete => "credential_delete",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credential_upsert" => Ok(Self::CredentialUpsert),
            "credential_delete" => Ok(Self::CredentialDelete),
            _ => Err(format!("unknown operation kind: {s}")),
        }
    }
}

/// Outcome of one per-principal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationOutcome {
    Success,
    Error,
    /// Nothing to do: e.g. a delete that found the principal already gone.
    Skipped,
}

impl std::fmt::Display for OperationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for OperationOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("unknown operation outcome: {s}")),
        }
    }
}

/// Maximum persisted length of an operation's error message.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Append-only audit row for one per-principal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Shared by every operation in one cycle.
    pub correlation_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub principal: String,
    pub kind: OperationKind,
    pub outcome: OperationOutcome,
    /// Stable failure classification, when the outcome is not a success.
    pub error_code: Option<String>,
    /// Truncated to [`MAX_ERROR_MESSAGE_LEN`] characters.
    pub error_message: Option<String>,
    pub duration_ms: i64,
}

impl SyncOperation {
    /// Record a successful operation.
    #[must_use]
    pub fn success(
        correlation_id: Uuid,
        principal: impl Into<String>,
        kind: OperationKind,
        duration_ms: i64,
    ) -> Self {
        Self {
            correlation_id,
            occurred_at: Utc::now(),
            principal: principal.into(),
            kind,
            outcome: OperationOutcome::Success,
            error_code: None,
            error_message: None,
            duration_ms,
        }
    }

    /// Record a failed operation; the message is truncated to bound storage.
    #[must_use]
    pub fn error(
        correlation_id: Uuid,
        principal: impl Into<String>,
        kind: OperationKind,
        error_code: impl Into<String>,
        error_message: &str,
        duration_ms: i64,
    ) -> Self {
        Self {
            correlation_id,
            occurred_at: Utc::now(),
            principal: principal.into(),
            kind,
            outcome: OperationOutcome::Error,
            error_code: Some(error_code.into()),
            error_message: Some(truncate_error(error_message)),
            duration_ms,
        }
    }

    /// Record a skipped operation.
    #[must_use]
    pub fn skipped(
        correlation_id: Uuid,
        principal: impl Into<String>,
        kind: OperationKind,
        reason: &str,
        duration_ms: i64,
    ) -> Self {
        Self {
            correlation_id,
            occurred_at: Utc::now(),
            principal: principal.into(),
            kind,
            outcome: OperationOutcome::Skipped,
            error_code: None,
            error_message: Some(truncate_error(reason)),
            duration_ms,
        }
    }
}

/// Truncate an error message to the persisted bound, on a char boundary.
#[must_use]
pub fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

/// One row per reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBatch {
    /// Correlation id, shared with the cycle's operation rows.
    pub correlation_id: Uuid,
    pub trigger: TriggerSource,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub items_total: i32,
    pub items_success: i32,
    pub items_error: i32,
}

impl SyncBatch {
    /// Create the batch header row at cycle start.
    #[must_use]
    pub fn started(correlation_id: Uuid, trigger: TriggerSource) -> Self {
        Self {
            correlation_id,
            trigger,
            started_at: Utc::now(),
            finished_at: None,
            items_total: 0,
            items_success: 0,
            items_error: 0,
        }
    }
}

/// Singleton retention bookkeeping row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionState {
    pub max_age_days: Option<i64>,
    pub max_bytes: Option<i64>,
    pub approximate_bytes: i64,
    pub updated_at: DateTime<Utc>,
}

/// Errors from the audit record store.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Batch row missing for an update.
    #[error("sync batch not found: {correlation_id}")]
    BatchNotFound { correlation_id: Uuid },
}

/// Result type for audit store operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Append-only audit sink plus the query surface the retention engine needs.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a new batch header row.
    async fn insert_batch(&self, batch: &SyncBatch) -> AuditResult<()>;

    /// Update a batch row in place (counts, finish timestamp).
    async fn update_batch(&self, batch: &SyncBatch) -> AuditResult<()>;

    /// Append one operation row.
    async fn insert_operation(&self, operation: &SyncOperation) -> AuditResult<()>;

    /// Number of operation rows recorded for one cycle.
    async fn count_operations(&self, correlation_id: Uuid) -> AuditResult<u64>;

    /// Bulk-delete operation rows strictly older than `cutoff`.
    /// Returns the number of rows deleted.
    async fn delete_operations_before(&self, cutoff: DateTime<Utc>) -> AuditResult<u64>;

    /// Delete up to `limit` operation rows, oldest first.
    /// Returns the number of rows deleted.
    async fn delete_oldest_operations(&self, limit: u32) -> AuditResult<u64>;

    /// Approximate storage consumed by the audit trail, in bytes.
    async fn approximate_size_bytes(&self) -> AuditResult<i64>;

    /// Load the singleton retention state row.
    async fn load_retention_state(&self) -> AuditResult<Option<RetentionState>>;

    /// Upsert the singleton retention state row.
    async fn save_retention_state(&self, state: &RetentionState) -> AuditResult<()>;

    /// Best-effort reclamation of already-freed logical space.
    async fn reclaim_space(&self) -> AuditResult<()>;
}
