//! In-memory audit store.
//!
//! Backs unit and integration tests; also usable as a throwaway store
//! for dry runs where no database is available. Storage size is an
//! estimate from row contents, mirroring what the relational store
//! reports only approximately anyway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AuditError, AuditResult, AuditStore, RetentionState, SyncBatch, SyncOperation,
};

/// Fixed per-row overhead added to the variable text content.
const OPERATION_ROW_OVERHEAD: usize = 96;
const BATCH_ROW_OVERHEAD: usize = 128;

fn estimated_operation_size(operation: &SyncOperation) -> usize {
    OPERATION_ROW_OVERHEAD
        + operation.principal.len()
        + operation.error_code.as_ref().map_or(0, String::len)
        + operation.error_message.as_ref().map_or(0, String::len)
}

#[derive(Default)]
struct MemoryInner {
    batches: BTreeMap<Uuid, SyncBatch>,
    operations: Vec<SyncOperation>,
    retention: Option<RetentionState>,
}

/// Audit store held entirely in process memory.
#[derive(Default)]
pub struct MemoryAuditStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryAuditStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all operation rows, for assertions.
    pub async fn operations(&self) -> Vec<SyncOperation> {
        self.inner.read().await.operations.clone()
    }

    /// Snapshot of one batch row, for assertions.
    pub async fn batch(&self, correlation_id: Uuid) -> Option<SyncBatch> {
        self.inner.read().await.batches.get(&correlation_id).cloned()
    }

    /// Number of batch rows.
    pub async fn batch_count(&self) -> usize {
        self.inner.read().await.batches.len()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn insert_batch(&self, batch: &SyncBatch) -> AuditResult<()> {
        let mut inner = self.inner.write().await;
        inner.batches.insert(batch.correlation_id, batch.clone());
        Ok(())
    }

    async fn update_batch(&self, batch: &SyncBatch) -> AuditResult<()> {
        let mut inner = self.inner.write().await;
        match inner.batches.get_mut(&batch.correlation_id) {
            Some(existing) => {
                *existing = batch.clone();
                Ok(())
            }
            None => Err(AuditError::BatchNotFound {
                correlation_id: batch.correlation_id,
            }),
        }
    }

    async fn insert_operation(&self, operation: &SyncOperation) -> AuditResult<()> {
        let mut inner = self.inner.write().await;
        inner.operations.push(operation.clone());
        Ok(())
    }

    async fn count_operations(&self, correlation_id: Uuid) -> AuditResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .operations
            .iter()
            .filter(|op| op.correlation_id == correlation_id)
            .count() as u64)
    }

    async fn delete_operations_before(&self, cutoff: DateTime<Utc>) -> AuditResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.operations.len();
        inner.operations.retain(|op| op.occurred_at >= cutoff);
        Ok((before - inner.operations.len()) as u64)
    }

    async fn delete_oldest_operations(&self, limit: u32) -> AuditResult<u64> {
        let mut inner = self.inner.write().await;
        inner
            .operations
            .sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        let remove = (limit as usize).min(inner.operations.len());
        inner.operations.drain(..remove);
        Ok(remove as u64)
    }

    async fn approximate_size_bytes(&self) -> AuditResult<i64> {
        let inner = self.inner.read().await;
        let operations: usize = inner.operations.iter().map(estimated_operation_size).sum();
        let batches = inner.batches.len() * BATCH_ROW_OVERHEAD;
        Ok((operations + batches) as i64)
    }

    async fn load_retention_state(&self) -> AuditResult<Option<RetentionState>> {
        Ok(self.inner.read().await.retention.clone())
    }

    async fn save_retention_state(&self, state: &RetentionState) -> AuditResult<()> {
        self.inner.write().await.retention = Some(state.clone());
        Ok(())
    }

    async fn reclaim_space(&self) -> AuditResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{OperationKind, TriggerSource};
    use chrono::Duration;

    fn operation_at(occurred_at: DateTime<Utc>) -> SyncOperation {
        SyncOperation {
            occurred_at,
            ..SyncOperation::success(
                Uuid::new_v4(),
                "alice",
                OperationKind::CredentialUpsert,
                5,
            )
        }
    }

    #[tokio::test]
    async fn batch_update_requires_existing_row() {
        let store = MemoryAuditStore::new();
        let batch = SyncBatch::started(Uuid::new_v4(), TriggerSource::Timer);

        let result = store.update_batch(&batch).await;
        assert!(matches!(result, Err(AuditError::BatchNotFound { .. })));

        store.insert_batch(&batch).await.unwrap();
        assert!(store.update_batch(&batch).await.is_ok());
    }

    #[tokio::test]
    async fn delete_before_cutoff_is_exact() {
        let store = MemoryAuditStore::new();
        let now = Utc::now();

        store
            .insert_operation(&operation_at(now - Duration::days(10)))
            .await
            .unwrap();
        store
            .insert_operation(&operation_at(now - Duration::days(1)))
            .await
            .unwrap();

        let deleted = store
            .delete_operations_before(now - Duration::days(5))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.operations().await.len(), 1);
    }

    #[tokio::test]
    async fn oldest_first_deletion() {
        let store = MemoryAuditStore::new();
        let now = Utc::now();

        for days_ago in [3, 1, 2] {
            store
                .insert_operation(&operation_at(now - Duration::days(days_ago)))
                .await
                .unwrap();
        }

        let deleted = store.delete_oldest_operations(2).await.unwrap();
        assert_eq!(deleted, 2);

        let remaining = store.operations().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].occurred_at, now - Duration::days(1));
    }

    #[tokio::test]
    async fn size_tracks_row_contents() {
        let store = MemoryAuditStore::new();
        let empty = store.approximate_size_bytes().await.unwrap();
        assert_eq!(empty, 0);

        store
            .insert_operation(&operation_at(Utc::now()))
            .await
            .unwrap();
        let with_row = store.approximate_size_bytes().await.unwrap();
        assert!(with_row > empty);
    }

    #[tokio::test]
    async fn retention_state_round_trip() {
        let store = MemoryAuditStore::new();
        assert!(store.load_retention_state().await.unwrap().is_none());

        let state = RetentionState {
            max_age_days: Some(30),
            max_bytes: None,
            approximate_bytes: 1024,
            updated_at: Utc::now(),
        };
        store.save_retention_state(&state).await.unwrap();
        assert_eq!(store.load_retention_state().await.unwrap(), Some(state));
    }
}
