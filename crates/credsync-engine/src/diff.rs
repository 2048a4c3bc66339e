//! Diff engine: identity-provider state vs broker state.
//!
//! Pure set algebra over a single consistent snapshot pair. Every enabled
//! user is re-issued a fresh credential every cycle (passwords are never
//! retained in plaintext across cycles, so "unchanged" cannot be
//! detected); broker principals without a matching enabled user are
//! orphans to delete.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Synchronization plan for one reconciliation cycle.
///
/// The two sets are disjoint by construction: a principal in the
/// provider snapshot is always an upsert, never a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPlan {
    /// Principals to create-or-update at the broker.
    pub upserts: BTreeSet<String>,
    /// Orphaned broker principals to delete.
    pub deletes: BTreeSet<String>,
}

impl SyncPlan {
    /// Compute the plan from the provider's enabled-user set and the
    /// broker's credentialed-principal set.
    ///
    /// An empty provider snapshot yields a delete-all plan. That is
    /// deliberate: an empty-but-successful provider response is
    /// indistinguishable from a realm that genuinely has no enabled
    /// users, and this engine does not second-guess it.
    #[must_use]
    pub fn compute(provider: &BTreeSet<String>, broker: &BTreeSet<String>) -> Self {
        Self {
            upserts: provider.clone(),
            deletes: broker.difference(provider).cloned().collect(),
        }
    }

    /// Terminal no-op case: nothing to create, nothing to delete.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    /// Total number of principals the plan touches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn upserts_equal_provider_set() {
        let plan = SyncPlan::compute(&set(&["alice", "bob"]), &set(&["bob", "carol"]));
        assert_eq!(plan.upserts, set(&["alice", "bob"]));
    }

    #[test]
    fn deletes_are_broker_minus_provider() {
        let plan = SyncPlan::compute(&set(&["alice", "bob"]), &set(&["bob", "carol"]));
        assert_eq!(plan.deletes, set(&["carol"]));
    }

    #[test]
    fn sets_are_always_disjoint() {
        let provider = set(&["a", "b", "c"]);
        let broker = set(&["b", "c", "d", "e"]);
        let plan = SyncPlan::compute(&provider, &broker);
        assert!(plan.upserts.is_disjoint(&plan.deletes));
    }

    #[test]
    fn identical_sets_still_upsert_everyone() {
        let users = set(&["alice", "bob"]);
        let plan = SyncPlan::compute(&users, &users);
        assert_eq!(plan.upserts, users);
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn both_empty_is_terminal() {
        let plan = SyncPlan::compute(&BTreeSet::new(), &BTreeSet::new());
        assert!(plan.is_empty());
        assert_eq!(plan.len(), 0);
    }

    #[test]
    fn empty_provider_yields_delete_all() {
        let broker = set(&["alice", "bob", "carol"]);
        let plan = SyncPlan::compute(&BTreeSet::new(), &broker);
        assert!(plan.upserts.is_empty());
        assert_eq!(plan.deletes, broker);
    }

    #[test]
    fn empty_broker_yields_upsert_all() {
        let provider = set(&["alice", "bob"]);
        let plan = SyncPlan::compute(&provider, &BTreeSet::new());
        assert_eq!(plan.upserts, provider);
        assert!(plan.deletes.is_empty());
    }
}
