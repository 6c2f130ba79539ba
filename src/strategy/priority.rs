use std::collections::HashMap;

use tracing::debug;

use super::{snapshot_table, Admission, Strategy};
use crate::error::LockError;
use crate::id::{BoundaryId, StrategyId};
use crate::info::{Behavior, LockInfo, LockSnapshot, Priority, StrategyPayload};
use crate::state::LockState;

/// Admits based on a three-level priority (`None < Low < High`).
///
/// `Priority::None` bypasses the priority system in both directions: it is
/// recorded so it can be unlocked, but never blocks and is never blocked.
/// A higher-priority admission cancels every lower-priority holder at once:
/// it clears the field beneath it, not a single victim.
pub struct PriorityBasedStrategy {
    id: StrategyId,
    state: LockState,
}

impl PriorityBasedStrategy {
    pub fn new() -> Self {
        PriorityBasedStrategy {
            id: StrategyId::from("priority_based"),
            state: LockState::new(),
        }
    }

    fn priority_of(&self, info: &LockInfo) -> Result<Priority, LockError> {
        match info.payload() {
            StrategyPayload::Priority { priority } => Ok(*priority),
            _ => Err(LockError::InfoMismatch {
                strategy: self.id.clone(),
                expected: "priority",
            }),
        }
    }
}

impl Default for PriorityBasedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn record_priority(record: &LockInfo) -> Priority {
    match record.payload() {
        StrategyPayload::Priority { priority } => *priority,
        // Foreign variants cannot be stored here; can_lock rejects them.
        _ => Priority::None,
    }
}

impl Strategy for PriorityBasedStrategy {
    fn id(&self) -> StrategyId {
        self.id.clone()
    }

    fn can_lock(
        &self,
        boundary: &BoundaryId,
        info: &LockInfo,
    ) -> Result<Admission, LockError> {
        let priority = self.priority_of(info)?;

        self.state.decide(boundary, |records| {
            // None participates in nothing; just track it.
            if priority == Priority::None {
                records.push(info.clone());
                return Ok(Admission::Granted);
            }

            let rank = priority.rank();
            let contenders: Vec<&LockInfo> = records
                .iter()
                .filter(|record| record_priority(record) != Priority::None)
                .collect();

            if let Some(blocker) = contenders
                .iter()
                .find(|record| record_priority(record).rank() > rank)
            {
                debug!(
                    boundary = %boundary,
                    action = %info.action_id(),
                    blocker = %blocker.action_id(),
                    "higher priority exists"
                );
                return Err(LockError::HigherPriorityExists {
                    requested: info.clone(),
                    current: (*blocker).clone(),
                });
            }

            if let Some(blocker) = contenders.iter().find(|record| {
                let existing = record_priority(record);
                existing.rank() == rank && existing.behavior() == Some(Behavior::Exclusive)
            }) {
                debug!(
                    boundary = %boundary,
                    action = %info.action_id(),
                    blocker = %blocker.action_id(),
                    "same priority conflict"
                );
                return Err(LockError::SamePriorityConflict {
                    requested: info.clone(),
                    current: (*blocker).clone(),
                });
            }

            // Victims: everything strictly beneath the newcomer, plus
            // equal-priority replaceables. All of them, in arrival order.
            let victims: Vec<LockInfo> = records
                .iter()
                .filter(|record| {
                    let existing = record_priority(record);
                    if existing == Priority::None {
                        return false;
                    }
                    existing.rank() < rank
                        || (existing.rank() == rank
                            && existing.behavior() == Some(Behavior::Replaceable))
                })
                .cloned()
                .collect();

            records.retain(|record| {
                !victims
                    .iter()
                    .any(|victim| victim.is_same_lock(record))
            });
            records.push(info.clone());

            if victims.is_empty() {
                Ok(Admission::Granted)
            } else {
                debug!(
                    boundary = %boundary,
                    action = %info.action_id(),
                    cancelled = victims.len(),
                    "admitted with preceding cancellation"
                );
                Ok(Admission::cancelling(victims))
            }
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
