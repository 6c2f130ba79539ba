use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::id::{BoundaryId, StrategyId};
use crate::info::LockSnapshot;
use crate::strategy::Strategy;

/// Registry-level failures, not part of the admission decision taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    StrategyNotRegistered { id: StrategyId },
    DuplicateRegistration { id: StrategyId },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::StrategyNotRegistered { id } => {
                write!(f, "strategy '{}' is not registered", id)
            }
            RegistryError::DuplicateRegistration { id } => {
                write!(f, "strategy '{}' is already registered", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Keyed map of live strategy instances: the one decision authority per
/// strategy kind. Constructed once at process start and shared by reference;
/// there is no ambient global.
pub struct StrategyRegistry {
    strategies: Mutex<HashMap<StrategyId, Arc<dyn Strategy>>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        StrategyRegistry {
            strategies: Mutex::new(HashMap::new()),
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, HashMap<StrategyId, Arc<dyn Strategy>>> {
        self.strategies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a strategy under its own id.
    pub fn register(&self, strategy: Arc<dyn Strategy>) -> Result<(), RegistryError> {
        let id = strategy.id();
        let mut strategies = self.guard();
        if strategies.contains_key(&id) {
            return Err(RegistryError::DuplicateRegistration { id });
        }
        debug!(strategy = %id, "strategy registered");
        strategies.insert(id, strategy);
        Ok(())
    }

    pub fn resolve(&self, id: &StrategyId) -> Result<Arc<dyn Strategy>, RegistryError> {
        self.guard()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::StrategyNotRegistered { id: id.clone() })
    }

    pub fn is_registered(&self, id: &StrategyId) -> bool {
        self.guard().contains_key(id)
    }

    /// Remove a strategy from the registry. Its state is untouched; absent
    /// ids are a no-op.
    pub fn unregister(&self, id: &StrategyId) {
        self.guard().remove(id);
    }

    fn all(&self) -> Vec<Arc<dyn Strategy>> {
        self.guard().values().cloned().collect()
    }

    /// Purge one boundary across every registered strategy.
    pub fn cleanup_boundary(&self, boundary: &BoundaryId) {
        for strategy in self.all() {
            strategy.cleanup_boundary(boundary);
        }
    }

    /// Purge all state across every registered strategy.
    pub fn cleanup_all(&self) {
        for strategy in self.all() {
            strategy.cleanup();
        }
    }

    /// Merged read-only view of every strategy's current locks.
    pub fn current_locks(&self) -> HashMap<BoundaryId, Vec<LockSnapshot>> {
        let mut merged: HashMap<BoundaryId, Vec<LockSnapshot>> = HashMap::new();
        for strategy in self.all() {
            for (boundary, snapshots) in strategy.current_locks() {
                merged.entry(boundary).or_default().extend(snapshots);
            }
        }
        merged
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
