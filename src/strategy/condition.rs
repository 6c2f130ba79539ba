use std::collections::HashMap;

use tracing::debug;

use super::{snapshot_table, Admission, Strategy};
use crate::error::LockError;
use crate::id::{BoundaryId, StrategyId};
use crate::info::{LockInfo, LockSnapshot, StrategyPayload};
use crate::state::LockState;

/// Defers the admit/reject decision to a caller-supplied predicate.
///
/// The predicate is evaluated at decision time, once per `can_lock` call,
/// so it can read live external state. Its result passes through unchanged:
/// success admits, failure becomes [`LockError::ConditionRejected`] carrying
/// the predicate's own error. Admitted infos are recorded so they are
/// inspectable and unlockable, but each evaluation is independent: the stored
/// records never feed back into a decision.
pub struct DynamicConditionStrategy {
    id: StrategyId,
    state: LockState,
}

impl DynamicConditionStrategy {
    pub fn new() -> Self {
        DynamicConditionStrategy {
            id: StrategyId::from("dynamic_condition"),
            state: LockState::new(),
        }
    }
}

impl Default for DynamicConditionStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for DynamicConditionStrategy {
    fn id(&self) -> StrategyId {
        self.id.clone()
    }

    fn can_lock(
        &self,
        boundary: &BoundaryId,
        info: &LockInfo,
    ) -> Result<Admission, LockError> {
        let condition = match info.payload() {
            StrategyPayload::Condition { condition } => condition,
            _ => {
                return Err(LockError::InfoMismatch {
                    strategy: self.id.clone(),
                    expected: "condition",
                })
            }
        };

        match condition() {
            Ok(()) => {
                self.state.add(boundary, info.clone());
                Ok(Admission::Granted)
            }
            Err(cause) => {
                debug!(
                    boundary = %boundary,
                    action = %info.action_id(),
                    cause = %cause,
                    "condition rejected"
                );
                Err(LockError::ConditionRejected(cause))
            }
        }
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
