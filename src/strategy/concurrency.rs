use std::collections::HashMap;

use tracing::debug;

use super::{snapshot_table, Admission, Strategy};
use crate::error::LockError;
use crate::id::{BoundaryId, StrategyId};
use crate::info::{ConcurrencyLimit, LockInfo, LockSnapshot, StrategyPayload};
use crate::state::LockState;

/// Admits up to a cap of concurrent holders sharing one concurrency id.
///
/// The count is per concurrency id within a boundary, independent of action
/// id; distinct concurrency ids are independent counters. A pure counting
/// strategy: it only accepts or rejects, never cancels.
pub struct ConcurrencyLimitedStrategy {
    id: StrategyId,
    state: LockState,
}

impl ConcurrencyLimitedStrategy {
    pub fn new() -> Self {
        ConcurrencyLimitedStrategy {
            id: StrategyId::from("concurrency_limited"),
            state: LockState::new(),
        }
    }

    fn params_of<'a>(
        &self,
        info: &'a LockInfo,
    ) -> Result<(&'a str, ConcurrencyLimit), LockError> {
        match info.payload() {
            StrategyPayload::Concurrency {
                concurrency_id,
                limit,
            } => Ok((concurrency_id.as_str(), *limit)),
            _ => Err(LockError::InfoMismatch {
                strategy: self.id.clone(),
                expected: "concurrency",
            }),
        }
    }
}

impl Default for ConcurrencyLimitedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn shares_group(record: &LockInfo, concurrency_id: &str) -> bool {
    matches!(
        record.payload(),
        StrategyPayload::Concurrency { concurrency_id: existing, .. }
            if existing == concurrency_id
    )
}

impl Strategy for ConcurrencyLimitedStrategy {
    fn id(&self) -> StrategyId {
        self.id.clone()
    }

    fn can_lock(
        &self,
        boundary: &BoundaryId,
        info: &LockInfo,
    ) -> Result<Admission, LockError> {
        let (concurrency_id, limit) = self.params_of(info)?;

        self.state.decide(boundary, |records| {
            let peers: Vec<LockInfo> = records
                .iter()
                .filter(|record| shares_group(record, concurrency_id))
                .cloned()
                .collect();

            if let ConcurrencyLimit::Limited(cap) = limit {
                if peers.len() >= cap {
                    debug!(
                        boundary = %boundary,
                        action = %info.action_id(),
                        group = concurrency_id,
                        current = peers.len(),
                        cap,
                        "concurrency limit reached"
                    );
                    let current = peers.len();
                    return Err(LockError::ConcurrencyLimitReached {
                        requested: info.clone(),
                        existing: peers,
                        current,
                    });
                }
            }

            records.push(info.clone());
            Ok(Admission::Granted)
        })
    }

    fn unlock(&self, boundary: &BoundaryId, info: &LockInfo) {
        self.state.remove(boundary, info.unique_id());
    }

    fn cleanup_boundary(&self, boundary: &BoundaryId) {
        self.state.remove_all(boundary);
    }

    fn cleanup(&self) {
        self.state.clear();
    }

    fn current_locks(&self) -> HashMap<BoundaryId, Vec<LockSnapshot>> {
        snapshot_table(self.state.snapshot_all())
    }
}
