//! Admission-decision strategies.
//!
//! A strategy owns its own [`LockState`](crate::state::LockState) and makes a
//! try-and-commit decision: `can_lock` checks and records under one critical
//! section, never check-then-commit. Five leaf strategies plus the composite
//! combinator.

mod composite;
mod concurrency;
mod condition;
mod group;
mod priority;
mod single_execution;

pub use composite::{CompositeArityError, CompositeStrategy};
pub use concurrency::ConcurrencyLimitedStrategy;
pub use condition::DynamicConditionStrategy;
pub use group::GroupCoordinationStrategy;
pub use priority::PriorityBasedStrategy;
pub use single_execution::SingleExecutionStrategy;

use std::collections::HashMap;

use crate::error::LockError;
use crate::id::{BoundaryId, StrategyId};
use crate::info::{LockInfo, LockSnapshot};

/// Outcome of a successful admission.
#[derive(Debug, Clone)]
pub enum Admission {
    /// Admitted with no side effects on other locks.
    Granted,
    /// Admitted, and the named previously-admitted locks were removed from
    /// state. The caller must tear down their in-flight work; `reason` is the
    /// [`LockError::PrecedingActionCancelled`] value to hand to an error
    /// handler when cancellation surfacing is enabled.
    GrantedWithCancellation {
        cancelled: Vec<LockInfo>,
        reason: LockError,
    },
}

impl Admission {
    pub(crate) fn cancelling(cancelled: Vec<LockInfo>) -> Self {
        let reason = LockError::PrecedingActionCancelled {
            cancelled: cancelled.clone(),
        };
        Admission::GrantedWithCancellation { cancelled, reason }
    }

    /// The locks this admission voided, if any.
    pub fn cancelled(&self) -> &[LockInfo] {
        match self {
            Admission::Granted => &[],
            Admission::GrantedWithCancellation { cancelled, .. } => cancelled,
        }
    }
}

/// One pluggable admission-decision algorithm plus its state.
///
/// Implementations are process-wide singletons: constructed once, registered
/// in the [`StrategyRegistry`](crate::registry::StrategyRegistry), alive for
/// the process. State never crosses boundaries, and different strategies'
/// states are independent.
pub trait Strategy: Send + Sync {
    fn id(&self) -> StrategyId;

    /// Decide admission for `info` within `boundary` and, on success, record
    /// it. Atomic with respect to this strategy's own state.
    fn can_lock(&self, boundary: &BoundaryId, info: &LockInfo)
        -> Result<Admission, LockError>;

    /// Remove the record matching `info`'s unique id. Idempotent on absence;
    /// never fails.
    fn unlock(&self, boundary: &BoundaryId, info: &LockInfo);

    /// Purge one boundary's partition, bypassing unlock bookkeeping.
    fn cleanup_boundary(&self, boundary: &BoundaryId);

    /// Purge all state for this strategy.
    fn cleanup(&self);

    /// Read-only view of everything currently held, per boundary.
    fn current_locks(&self) -> HashMap<BoundaryId, Vec<LockSnapshot>>;
}

impl std::fmt::Debug for dyn Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy").field("id", &self.id()).finish()
    }
}

pub(crate) fn snapshot_table(
    table: HashMap<BoundaryId, Vec<LockInfo>>,
) -> HashMap<BoundaryId, Vec<LockSnapshot>> {
    table
        .into_iter()
        .map(|(boundary, records)| {
            let snapshots = records.iter().map(LockInfo::snapshot).collect();
            (boundary, snapshots)
        })
        .collect()
}
