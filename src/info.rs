use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::id::{ActionId, UniqueId};

/// Error produced by a dynamic condition predicate.
///
/// Wrapped in `Arc` so the engine can hand the caller's own error back
/// unchanged while lock infos stay cloneable.
pub type ConditionError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A caller-supplied predicate evaluated at decision time (never at
/// construction time), exactly once per `can_lock` call.
pub type Condition = Arc<dyn Fn() -> Result<(), ConditionError> + Send + Sync>;

/// How the single-execution strategy scopes exclusivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// No exclusion; always admitted, never recorded.
    None,
    /// At most one active action per boundary.
    Boundary,
    /// At most one active action per action id within the boundary.
    Action,
}

/// What happens when two actions of equal priority collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// The incumbent wins; the newcomer is rejected.
    Exclusive,
    /// The newcomer wins; the incumbent is cancelled.
    Replaceable,
}

/// Three-level priority. `None` bypasses the priority system in both
/// directions: it is tracked so it can be unlocked, but never blocks and is
/// never blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    None,
    Low(Behavior),
    High(Behavior),
}

impl Priority {
    pub(crate) fn rank(self) -> u8 {
        match self {
            Priority::None => 0,
            Priority::Low(_) => 1,
            Priority::High(_) => 2,
        }
    }

    pub(crate) fn behavior(self) -> Option<Behavior> {
        match self {
            Priority::None => None,
            Priority::Low(b) | Priority::High(b) => Some(b),
        }
    }
}

/// Cap on the number of concurrent holders sharing one concurrency id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyLimit {
    Unlimited,
    Limited(usize),
}

/// Gate applied per named group when a leader requests entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPolicy {
    /// The group must be completely empty.
    EmptyGroup,
    /// No member-role participants (other leaders tolerated).
    WithoutMembers,
    /// No leader-role participants (members tolerated).
    WithoutLeader,
}

/// Coordination role within named groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRole {
    /// Observer: always admitted, recorded for inspection, never a
    /// participant for emptiness/policy checks.
    None,
    Leader(EntryPolicy),
    Member,
}

/// Strategy-specific payload of a lock info: one variant per strategy, so
/// one state table can hold every shape without downcasting. Each strategy
/// pattern-matches its own variant and rejects the rest.
#[derive(Clone)]
pub enum StrategyPayload {
    SingleExecution {
        mode: ExecutionMode,
    },
    Priority {
        priority: Priority,
    },
    Concurrency {
        concurrency_id: String,
        limit: ConcurrencyLimit,
    },
    Group {
        group_ids: BTreeSet<String>,
        role: GroupRole,
    },
    Condition {
        condition: Condition,
    },
    Composite(Vec<LockInfo>),
}

impl StrategyPayload {
    /// Short label used in snapshots and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            StrategyPayload::SingleExecution { .. } => "single_execution",
            StrategyPayload::Priority { .. } => "priority",
            StrategyPayload::Concurrency { .. } => "concurrency",
            StrategyPayload::Group { .. } => "group",
            StrategyPayload::Condition { .. } => "condition",
            StrategyPayload::Composite(_) => "composite",
        }
    }
}

impl fmt::Debug for StrategyPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyPayload::SingleExecution { mode } => f
                .debug_struct("SingleExecution")
                .field("mode", mode)
                .finish(),
            StrategyPayload::Priority { priority } => f
                .debug_struct("Priority")
                .field("priority", priority)
                .finish(),
            StrategyPayload::Concurrency {
                concurrency_id,
                limit,
            } => f
                .debug_struct("Concurrency")
                .field("concurrency_id", concurrency_id)
                .field("limit", limit)
                .finish(),
            StrategyPayload::Group { group_ids, role } => f
                .debug_struct("Group")
                .field("group_ids", group_ids)
                .field("role", role)
                .finish(),
            // The predicate is opaque; print only the variant.
            StrategyPayload::Condition { .. } => f.debug_struct("Condition").finish_non_exhaustive(),
            StrategyPayload::Composite(children) => {
                f.debug_tuple("Composite").field(children).finish()
            }
        }
    }
}

/// One admission attempt: stable logical name, process-unique instance
/// identity, and the strategy-specific parameters of the request.
///
/// Constructors generate a fresh [`UniqueId`] per call, so building two infos
/// from the same action id still yields two distinct locks.
#[derive(Debug, Clone)]
pub struct LockInfo {
    action_id: ActionId,
    unique_id: UniqueId,
    payload: StrategyPayload,
}

impl LockInfo {
    pub fn new(action_id: impl Into<ActionId>, payload: StrategyPayload) -> Self {
        LockInfo {
            action_id: action_id.into(),
            unique_id: UniqueId::new(),
            payload,
        }
    }

    pub fn single_execution(action_id: impl Into<ActionId>, mode: ExecutionMode) -> Self {
        Self::new(action_id, StrategyPayload::SingleExecution { mode })
    }

    pub fn priority(action_id: impl Into<ActionId>, priority: Priority) -> Self {
        Self::new(action_id, StrategyPayload::Priority { priority })
    }

    pub fn concurrency(
        action_id: impl Into<ActionId>,
        concurrency_id: impl Into<String>,
        limit: ConcurrencyLimit,
    ) -> Self {
        Self::new(
            action_id,
            StrategyPayload::Concurrency {
                concurrency_id: concurrency_id.into(),
                limit,
            },
        )
    }

    pub fn group<I, S>(action_id: impl Into<ActionId>, group_ids: I, role: GroupRole) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            action_id,
            StrategyPayload::Group {
                group_ids: group_ids.into_iter().map(Into::into).collect(),
                role,
            },
        )
    }

    pub fn condition<F>(action_id: impl Into<ActionId>, condition: F) -> Self
    where
        F: Fn() -> Result<(), ConditionError> + Send + Sync + 'static,
    {
        Self::new(
            action_id,
            StrategyPayload::Condition {
                condition: Arc::new(condition),
            },
        )
    }

    pub fn composite(action_id: impl Into<ActionId>, children: Vec<LockInfo>) -> Self {
        Self::new(action_id, StrategyPayload::Composite(children))
    }

    pub fn action_id(&self) -> &ActionId {
        &self.action_id
    }

    pub fn unique_id(&self) -> UniqueId {
        self.unique_id
    }

    pub fn payload(&self) -> &StrategyPayload {
        &self.payload
    }

    /// Identity comparison: same lock iff same unique id.
    pub fn is_same_lock(&self, other: &LockInfo) -> bool {
        self.unique_id == other.unique_id
    }

    pub fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            action_id: self.action_id.clone(),
            unique_id: self.unique_id,
            strategy: self.payload.label(),
        }
    }
}

/// Serializable read-only view of one lock record, for introspection and
/// monitoring dashboards. Never aliases live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockSnapshot {
    pub action_id: ActionId,
    pub unique_id: UniqueId,
    pub strategy: &'static str,
}
