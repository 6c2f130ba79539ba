use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::id::{BoundaryId, UniqueId};
use crate::info::LockInfo;

/// Concurrency-safe ordered table of active lock records for one strategy.
///
/// Keyed by boundary; within a boundary, insertion order is preserved and is
/// load-bearing: it is the arrival order used for tie-breaks and the LIFO
/// unwind order for composites. Every operation is a short critical section
/// under one mutex; different strategies own independent tables and never
/// contend with each other.
pub struct LockState {
    table: Mutex<HashMap<BoundaryId, Vec<LockInfo>>>,
}

impl LockState {
    pub fn new() -> Self {
        LockState {
            table: Mutex::new(HashMap::new()),
        }
    }

    // A panicked holder leaves the table structurally intact (all mutations
    // are single push/retain/remove calls), so recover instead of propagating
    // poison: unlock must never fail.
    fn guard(&self) -> MutexGuard<'_, HashMap<BoundaryId, Vec<LockInfo>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record to the boundary's partition.
    pub fn add(&self, boundary: &BoundaryId, info: LockInfo) {
        let mut table = self.guard();
        table.entry(boundary.clone()).or_default().push(info);
    }

    /// Run a decision against the boundary's records under one critical
    /// section, the try-and-commit primitive. The closure may inspect and
    /// mutate the partition; check and commit are never split across two
    /// lock acquisitions.
    pub fn decide<T, E>(
        &self,
        boundary: &BoundaryId,
        decision: impl FnOnce(&mut Vec<LockInfo>) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut table = self.guard();
        let records = table.entry(boundary.clone()).or_default();
        let outcome = decision(records);
        if table.get(boundary).is_some_and(Vec::is_empty) {
            table.remove(boundary);
        }
        outcome
    }

    /// Remove the one record with the matching unique id.
    ///
    /// A miss is a no-op, not an error: callers may race a cancellation
    /// against a completion. Returns the removed record when there was one.
    pub fn remove(&self, boundary: &BoundaryId, unique_id: UniqueId) -> Option<LockInfo> {
        let mut table = self.guard();
        let records = table.get_mut(boundary)?;
        let position = records
            .iter()
            .position(|record| record.unique_id() == unique_id)?;
        let removed = records.remove(position);
        if records.is_empty() {
            table.remove(boundary);
        }
        Some(removed)
    }

    /// Wipe one boundary's partition.
    pub fn remove_all(&self, boundary: &BoundaryId) {
        self.guard().remove(boundary);
    }

    /// Wipe every partition.
    pub fn clear(&self) {
        self.guard().clear();
    }

    /// Owned copy of the boundary's records, in insertion order.
    ///
    /// Never aliases internal storage; callers cannot observe concurrent
    /// mutation mid-iteration.
    pub fn snapshot(&self, boundary: &BoundaryId) -> Vec<LockInfo> {
        self.guard().get(boundary).cloned().unwrap_or_default()
    }

    /// Owned copy of every partition, for introspection.
    pub fn snapshot_all(&self) -> HashMap<BoundaryId, Vec<LockInfo>> {
        self.guard().clone()
    }

    pub fn is_empty(&self, boundary: &BoundaryId) -> bool {
        self.guard().get(boundary).map_or(true, Vec::is_empty)
    }
}

impl Default for LockState {
    fn default() -> Self {
        Self::new()
    }
}
