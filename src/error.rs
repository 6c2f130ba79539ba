use std::fmt;

use crate::id::StrategyId;
use crate::info::{ConditionError, LockInfo};

/// Decision-level failure taxonomy.
///
/// Every admission failure is a typed, inspectable value; callers
/// pattern-match on [`LockError::kind`] to decide feedback. Nothing here
/// aborts the process; every variant is a normal return value.
#[derive(Debug, Clone)]
pub enum LockError {
    /// Single-execution, boundary mode: the boundary already holds a lock.
    BoundaryAlreadyLocked { existing: LockInfo },
    /// Single-execution, action mode: the same action id is already running.
    ActionAlreadyRunning { existing: LockInfo },
    /// A strictly higher-priority lock is active.
    HigherPriorityExists { requested: LockInfo, current: LockInfo },
    /// An equal-priority exclusive lock is active.
    SamePriorityConflict { requested: LockInfo, current: LockInfo },
    /// Not an admission failure: names previously admitted locks that the
    /// new admission voided. Carried as the `reason` of a
    /// granted-with-cancellation result so error handlers can surface it.
    PrecedingActionCancelled { cancelled: Vec<LockInfo> },
    /// The concurrency group is at capacity. `existing` is the full set of
    /// records sharing the concurrency id, so callers can report
    /// "current/limit active".
    ConcurrencyLimitReached {
        requested: LockInfo,
        existing: Vec<LockInfo>,
        current: usize,
    },
    /// A member tried to join a group with no active participants.
    MemberCannotJoinEmptyGroup { group_id: String },
    /// A leader with the empty-group policy found participants.
    LeaderCannotJoinNonEmptyGroup { group_id: String },
    /// A leader with the without-members policy found member participants.
    LeaderCannotJoinGroupWithMembers { group_id: String },
    /// A leader with the without-leader policy found a leader participant.
    LeaderCannotJoinGroupWithLeader { group_id: String },
    /// The dynamic condition said no; carries the predicate's own error
    /// unchanged.
    ConditionRejected(ConditionError),
    /// The lock info's payload variant does not belong to the strategy it
    /// was handed to.
    InfoMismatch {
        strategy: StrategyId,
        expected: &'static str,
    },
}

/// Payload-free discriminant of [`LockError`], for pattern-matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockErrorKind {
    BoundaryAlreadyLocked,
    ActionAlreadyRunning,
    HigherPriorityExists,
    SamePriorityConflict,
    PrecedingActionCancelled,
    ConcurrencyLimitReached,
    MemberCannotJoinEmptyGroup,
    LeaderCannotJoinNonEmptyGroup,
    LeaderCannotJoinGroupWithMembers,
    LeaderCannotJoinGroupWithLeader,
    ConditionRejected,
    InfoMismatch,
}

impl LockError {
    pub fn kind(&self) -> LockErrorKind {
        match self {
            LockError::BoundaryAlreadyLocked { .. } => LockErrorKind::BoundaryAlreadyLocked,
            LockError::ActionAlreadyRunning { .. } => LockErrorKind::ActionAlreadyRunning,
            LockError::HigherPriorityExists { .. } => LockErrorKind::HigherPriorityExists,
            LockError::SamePriorityConflict { .. } => LockErrorKind::SamePriorityConflict,
            LockError::PrecedingActionCancelled { .. } => LockErrorKind::PrecedingActionCancelled,
            LockError::ConcurrencyLimitReached { .. } => LockErrorKind::ConcurrencyLimitReached,
            LockError::MemberCannotJoinEmptyGroup { .. } => {
                LockErrorKind::MemberCannotJoinEmptyGroup
            }
            LockError::LeaderCannotJoinNonEmptyGroup { .. } => {
                LockErrorKind::LeaderCannotJoinNonEmptyGroup
            }
            LockError::LeaderCannotJoinGroupWithMembers { .. } => {
                LockErrorKind::LeaderCannotJoinGroupWithMembers
            }
            LockError::LeaderCannotJoinGroupWithLeader { .. } => {
                LockErrorKind::LeaderCannotJoinGroupWithLeader
            }
            LockError::ConditionRejected(_) => LockErrorKind::ConditionRejected,
            LockError::InfoMismatch { .. } => LockErrorKind::InfoMismatch,
        }
    }
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::BoundaryAlreadyLocked { existing } => write!(
                f,
                "boundary already locked by action '{}'",
                existing.action_id()
            ),
            LockError::ActionAlreadyRunning { existing } => {
                write!(f, "action '{}' is already running", existing.action_id())
            }
            LockError::HigherPriorityExists { requested, current } => write!(
                f,
                "higher priority action '{}' blocks '{}'",
                current.action_id(),
                requested.action_id()
            ),
            LockError::SamePriorityConflict { requested, current } => write!(
                f,
                "same priority exclusive action '{}' blocks '{}'",
                current.action_id(),
                requested.action_id()
            ),
            LockError::PrecedingActionCancelled { cancelled } => {
                let names: Vec<&str> = cancelled
                    .iter()
                    .map(|info| info.action_id().as_str())
                    .collect();
                write!(f, "preceding action(s) cancelled: {}", names.join(", "))
            }
            LockError::ConcurrencyLimitReached {
                requested, current, ..
            } => write!(
                f,
                "concurrency limit reached for '{}' ({} active)",
                requested.action_id(),
                current
            ),
            LockError::MemberCannotJoinEmptyGroup { group_id } => {
                write!(f, "member cannot join empty group '{}'", group_id)
            }
            LockError::LeaderCannotJoinNonEmptyGroup { group_id } => {
                write!(f, "leader cannot join non-empty group '{}'", group_id)
            }
            LockError::LeaderCannotJoinGroupWithMembers { group_id } => {
                write!(f, "leader cannot join group '{}' with members", group_id)
            }
            LockError::LeaderCannotJoinGroupWithLeader { group_id } => {
                write!(f, "leader cannot join group '{}' with a leader", group_id)
            }
            LockError::ConditionRejected(err) => write!(f, "condition rejected: {}", err),
            LockError::InfoMismatch { strategy, expected } => write!(
                f,
                "strategy '{}' expects {} lock info",
                strategy, expected
            ),
        }
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LockError::ConditionRejected(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
