use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Caller-supplied logical name for an action.
///
/// Not required to be unique across calls; repeats are how "same action"
/// is detected by strategies that care (e.g. single-execution in action mode).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ActionId(String);

impl ActionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActionId {
    fn from(s: &str) -> Self {
        ActionId(s.to_string())
    }
}

impl From<String> for ActionId {
    fn from(s: String) -> Self {
        ActionId(s)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-unique identity of one admission attempt.
///
/// Generated fresh per attempt and never reused. Two lock records are the
/// "same lock" iff their `UniqueId` matches, never by action id alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct UniqueId(Uuid);

impl UniqueId {
    pub fn new() -> Self {
        UniqueId(Uuid::new_v4())
    }
}

impl Default for UniqueId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque key that partitions the lock universe (a screen, a subsystem, ...).
///
/// Locks never interact across boundaries; every state table is keyed by
/// boundary first. Callers render their scope to a stable string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BoundaryId(String);

impl BoundaryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BoundaryId {
    fn from(s: &str) -> Self {
        BoundaryId(s.to_string())
    }
}

impl From<String> for BoundaryId {
    fn from(s: String) -> Self {
        BoundaryId(s)
    }
}

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a strategy instance in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StrategyId(String);

impl StrategyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a composite strategy id from its children's ids.
    ///
    /// Deterministic: registering the same combination twice produces the
    /// same id, so duplicate registration is detectable.
    pub fn composite(children: &[StrategyId]) -> Self {
        let joined: Vec<&str> = children.iter().map(|id| id.as_str()).collect();
        StrategyId(format!("composite({})", joined.join("+")))
    }
}

impl From<&str> for StrategyId {
    fn from(s: &str) -> Self {
        StrategyId(s.to_string())
    }
}

impl From<String> for StrategyId {
    fn from(s: String) -> Self {
        StrategyId(s)
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
