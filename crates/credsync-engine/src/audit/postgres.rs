//! Postgres-backed audit store.
//!
//! Runtime-checked queries against three tables: `sync_batches`,
//! `sync_operations`, and the singleton `retention_state` row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    AuditError, AuditResult, AuditStore, RetentionState, SyncBatch, SyncOperation, TriggerSource,
};

/// Audit store over a Postgres pool.
#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    /// Create a new store over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the audit tables when they do not exist yet.
    pub async fn ensure_schema(&self) -> AuditResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sync_batches (
                correlation_id UUID PRIMARY KEY,
                trigger_source TEXT NOT NULL,
                started_at TIMESTAMPTZ NOT NULL,
                finished_at TIMESTAMPTZ,
                items_total INTEGER NOT NULL DEFAULT 0,
                items_success INTEGER NOT NULL DEFAULT 0,
                items_error INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sync_operations (
                id BIGSERIAL PRIMARY KEY,
                correlation_id UUID NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                principal TEXT NOT NULL,
                kind TEXT NOT NULL,
                outcome TEXT NOT NULL,
                error_code TEXT,
                error_message TEXT,
                duration_ms BIGINT NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_sync_operations_occurred_at
                ON sync_operations (occurred_at)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS retention_state (
                id SMALLINT PRIMARY KEY DEFAULT 1 CHECK (id = 1),
                max_age_days BIGINT,
                max_bytes BIGINT,
                approximate_bytes BIGINT NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn insert_batch(&self, batch: &SyncBatch) -> AuditResult<()> {
        sqlx::query(
            r"
            INSERT INTO sync_batches
                (correlation_id, trigger_source, started_at, finished_at,
                 items_total, items_success, items_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(batch.correlation_id)
        .bind(batch.trigger.to_string())
        .bind(batch.started_at)
        .bind(batch.finished_at)
        .bind(batch.items_total)
        .bind(batch.items_success)
        .bind(batch.items_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_batch(&self, batch: &SyncBatch) -> AuditResult<()> {
        let result = sqlx::query(
            r"
            UPDATE sync_batches
            SET finished_at = $2,
                items_total = $3,
                items_success = $4,
                items_error = $5
            WHERE correlation_id = $1
            ",
        )
        .bind(batch.correlation_id)
        .bind(batch.finished_at)
        .bind(batch.items_total)
        .bind(batch.items_success)
        .bind(batch.items_error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuditError::BatchNotFound {
                correlation_id: batch.correlation_id,
            });
        }
        Ok(())
    }

    async fn insert_operation(&self, operation: &SyncOperation) -> AuditResult<()> {
        sqlx::query(
            r"
            INSERT INTO sync_operations
                (correlation_id, occurred_at, principal, kind, outcome,
                 error_code, error_message, duration_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(operation.correlation_id)
        .bind(operation.occurred_at)
        .bind(&operation.principal)
        .bind(operation.kind.to_string())
        .bind(operation.outcome.to_string())
        .bind(&operation.error_code)
        .bind(&operation.error_message)
        .bind(operation.duration_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_operations(&self, correlation_id: Uuid) -> AuditResult<u64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sync_operations WHERE correlation_id = $1")
                .bind(correlation_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0 as u64)
    }

    async fn delete_operations_before(&self, cutoff: DateTime<Utc>) -> AuditResult<u64> {
        let result = sqlx::query("DELETE FROM sync_operations WHERE occurred_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_oldest_operations(&self, limit: u32) -> AuditResult<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM sync_operations
            WHERE id IN (
                SELECT id FROM sync_operations
                ORDER BY occurred_at ASC, id ASC
                LIMIT $1
            )
            ",
        )
        .bind(i64::from(limit))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn approximate_size_bytes(&self) -> AuditResult<i64> {
        let row: (i64,) = sqlx::query_as(
            r"
            SELECT COALESCE(pg_total_relation_size('sync_operations'), 0)
                 + COALESCE(pg_total_relation_size('sync_batches'), 0)
            ",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn load_retention_state(&self) -> AuditResult<Option<RetentionState>> {
        let row: Option<(Option<i64>, Option<i64>, i64, DateTime<Utc>)> = sqlx::query_as(
            r"
            SELECT max_age_days, max_bytes, approximate_bytes, updated_at
            FROM retention_state
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(max_age_days, max_bytes, approximate_bytes, updated_at)| RetentionState {
                max_age_days,
                max_bytes,
                approximate_bytes,
                updated_at,
            },
        ))
    }

    async fn save_retention_state(&self, state: &RetentionState) -> AuditResult<()> {
        sqlx::query(
            r"
            INSERT INTO retention_state (id, max_age_days, max_bytes, approximate_bytes, updated_at)
            VALUES (1, $1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET max_age_days = EXCLUDED.max_age_days,
                max_bytes = EXCLUDED.max_bytes,
                approximate_bytes = EXCLUDED.approximate_bytes,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(state.max_age_days)
        .bind(state.max_bytes)
        .bind(state.approximate_bytes)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reclaim_space(&self) -> AuditResult<()> {
        // VACUUM cannot be prepared; it has to go over the simple protocol.
        sqlx::raw_sql("VACUUM sync_operations")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Row shape for batch queries, used by operational tooling.
#[derive(Debug, sqlx::FromRow)]
pub struct SyncBatchRow {
    pub correlation_id: Uuid,
    pub trigger_source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub items_total: i32,
    pub items_success: i32,
    pub items_error: i32,
}

impl SyncBatchRow {
    /// Convert into the domain record.
    #[must_use]
    pub fn into_batch(self) -> SyncBatch {
        SyncBatch {
            correlation_id: self.correlation_id,
            trigger: self
                .trigger_source
                .parse()
                .unwrap_or(TriggerSource::Timer),
            started_at: self.started_at,
            finished_at: self.finished_at,
            items_total: self.items_total,
            items_success: self.items_success,
            items_error: self.items_error,
        }
    }
}

impl PgAuditStore {
    /// List the most recent batches, newest first.
    pub async fn recent_batches(&self, limit: i64) -> AuditResult<Vec<SyncBatch>> {
        let rows: Vec<SyncBatchRow> = sqlx::query_as(
            r"
            SELECT correlation_id, trigger_source, started_at, finished_at,
                   items_total, items_success, items_error
            FROM sync_batches
            ORDER BY started_at DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SyncBatchRow::into_batch).collect())
    }
}
