use std::collections::HashMap;

use tracing::debug;

use super::{snapshot_table, Admission, Strategy};
use crate::error::LockError;
use crate::id::{BoundaryId, StrategyId};
use crate::info::{ExecutionMode, LockInfo, LockSnapshot, StrategyPayload};
use crate::state::LockState;

/// Prevents duplicate concurrent activity.
///
/// Boundary mode admits at most one active action per boundary; action mode
/// admits at most one active action per action id. Mode `None` is an escape
/// hatch: always admitted, never recorded. This strategy only accepts or
/// rejects; it never cancels a preceding action.
pub struct SingleExecutionStrategy {
    id: StrategyId,
    state: LockState,
}

impl SingleExecutionStrategy {
    pub fn new() -> Self {
        SingleExecutionStrategy {
            id: StrategyId::from("single_execution"),
            state: LockState::new(),
        }
    }

    fn mode_of(&self, info: &LockInfo) -> Result<ExecutionMode, LockError> {
        match info.payload() {
            StrategyPayload::SingleExecution { mode } => Ok(*mode),
            _ => Err(LockError::InfoMismatch {
                strategy: self.id.clone(),
                expected: "single_execution",
            }),
        }
    }
}

impl Default for SingleExecutionStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for SingleExecutionStrategy {
    fn id(&self) -> StrategyId {
        self.id.clone()
    }

    fn can_lock(
        &self,
        boundary: &BoundaryId,
        info: &LockInfo,
    ) -> Result<Admission, LockError> {
        let mode = self.mode_of(info)?;
        match mode {
            ExecutionMode::None => Ok(Admission::Granted),
            ExecutionMode::Boundary => self.state.decide(boundary, |records| {
                if let Some(holder) = records.first() {
                    debug!(
                        boundary = %boundary,
                        action = %info.action_id(),
                        holder = %holder.action_id(),
                        "boundary already locked"
                    );
                    return Err(LockError::BoundaryAlreadyLocked {
                        existing: holder.clone(),
                    });
                }
                records.push(info.clone());
                Ok(Admission::Granted)
            }),
            ExecutionMode::Action => self.state.decide(boundary, |records| {
                if let Some(duplicate) = records
                    .iter()
                    .find(|record| record.action_id() == info.action_id())
                {
                    debug!(
                        boundary = %boundary,
                        action = %info.action_id(),
                        "action already running"
                    );
                    return Err(LockError::ActionAlreadyRunning {
                        existing: duplicate.clone(),
                    });
                }
                records.push(info.clone());
                Ok(Admission::Granted)
            }),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockErrorKind;

    fn boundary() -> BoundaryId {
        BoundaryId::from("screen")
    }

    #[test]
    fn none_mode_always_admits_and_records_nothing() {
        let strategy = SingleExecutionStrategy::new();
        let b = boundary();
        for _ in 0..3 {
            let info = LockInfo::single_execution("anything", ExecutionMode::None);
            assert!(matches!(
                strategy.can_lock(&b, &info),
                Ok(Admission::Granted)
            ));
        }
        assert!(strategy.current_locks().is_empty());
    }

    #[test]
    fn boundary_mode_admits_one_per_boundary() {
        let strategy = SingleExecutionStrategy::new();
        let b = boundary();
        let first = LockInfo::single_execution("save", ExecutionMode::Boundary);
        let second = LockInfo::single_execution("load", ExecutionMode::Boundary);

        strategy.can_lock(&b, &first).unwrap();
        let err = strategy.can_lock(&b, &second).unwrap_err();
        assert_eq!(err.kind(), LockErrorKind::BoundaryAlreadyLocked);

        strategy.unlock(&b, &first);
        strategy.can_lock(&b, &second).unwrap();
    }

    #[test]
    fn action_mode_blocks_same_action_only() {
        let strategy = SingleExecutionStrategy::new();
        let b = boundary();
        let save = LockInfo::single_execution("save", ExecutionMode::Action);
        let save_again = LockInfo::single_execution("save", ExecutionMode::Action);
        let load = LockInfo::single_execution("load", ExecutionMode::Action);

        strategy.can_lock(&b, &save).unwrap();
        let err = strategy.can_lock(&b, &save_again).unwrap_err();
        assert_eq!(err.kind(), LockErrorKind::ActionAlreadyRunning);

        // Different action ids run concurrently.
        strategy.can_lock(&b, &load).unwrap();

        // Unlock the first; the same action id is admissible again.
        strategy.unlock(&b, &save);
        strategy.can_lock(&b, &save_again).unwrap();
    }

    #[test]
    fn boundaries_do_not_interact() {
        let strategy = SingleExecutionStrategy::new();
        let b1 = BoundaryId::from("b1");
        let b2 = BoundaryId::from("b2");

        let first = LockInfo::single_execution("save", ExecutionMode::Boundary);
        let second = LockInfo::single_execution("save", ExecutionMode::Boundary);
        strategy.can_lock(&b1, &first).unwrap();
        strategy.can_lock(&b2, &second).unwrap();
    }

    #[test]
    fn rejects_foreign_payload() {
        let strategy = SingleExecutionStrategy::new();
        let foreign = LockInfo::priority("sync", crate::info::Priority::None);
        let err = strategy.can_lock(&boundary(), &foreign).unwrap_err();
        assert_eq!(err.kind(), LockErrorKind::InfoMismatch);
    }

    #[test]
    fn failure_names_the_blocking_record() {
        let strategy = SingleExecutionStrategy::new();
        let b = boundary();
        let holder = LockInfo::single_execution("save", ExecutionMode::Action);
        strategy.can_lock(&b, &holder).unwrap();

        let challenger = LockInfo::single_execution("save", ExecutionMode::Action);
        match strategy.can_lock(&b, &challenger) {
            Err(LockError::ActionAlreadyRunning { existing }) => {
                assert!(existing.is_same_lock(&holder));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
