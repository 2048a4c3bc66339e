//! # credsync Engine
//!
//! Reconciliation core keeping a broker's SCRAM credential store in sync
//! with an identity provider's enabled-user population.
//!
//! One cycle flows in a single direction: provider snapshot -> diff ->
//! credential generation -> broker alteration -> audit records; the
//! retention engine independently bounds the audit trail afterwards.
//!
//! - [`config`] - Immutable process configuration
//! - [`diff`] - Set algebra producing the per-cycle [`diff::SyncPlan`]
//! - [`audit`] - Batch/operation records and the record-store seam
//! - [`orchestrator`] - The fetch -> diff -> sync -> audit state machine
//! - [`scheduler`] - Timer loop and single-flight trigger front door
//! - [`retention`] - Age- and size-based audit purging
//! - [`health`] - Breaker-guarded connectivity probing

pub mod audit;
pub mod config;
pub mod diff;
pub mod health;
pub mod orchestrator;
pub mod retention;
pub mod scheduler;

pub use audit::{
    memory::MemoryAuditStore, postgres::PgAuditStore, AuditError, AuditResult, AuditStore,
    OperationKind, OperationOutcome, RetentionState, SyncBatch, SyncOperation, TriggerSource,
    MAX_ERROR_MESSAGE_LEN,
};
pub use config::{AppConfig, SyncConfig};
pub use diff::SyncPlan;
pub use health::{HealthService, HealthStatus};
pub use orchestrator::{CycleError, CycleSummary, ReconciliationOrchestrator};
pub use retention::{
    PurgeOutcome, RetentionEngine, RetentionError, RetentionSettings, MAX_AGE_DAYS_LIMIT,
    MAX_BYTES_LIMIT, PURGE_BATCH_SIZE,
};
pub use scheduler::{SyncScheduler, TriggerError};
