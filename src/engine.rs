use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::LockError;
use crate::id::{BoundaryId, StrategyId};
use crate::info::{ConditionError, LockInfo, LockSnapshot};
use crate::registry::{RegistryError, StrategyRegistry};
use crate::release::{LockGuard, ReleaseCoordinator, ReleaseHandle, ReleaseStats, UnlockTiming};
use crate::strategy::{Admission, Strategy};

/// Failure at the engine surface: either the registry could not produce a
/// strategy, or the strategy rejected the admission.
#[derive(Debug, Clone)]
pub enum EngineError {
    Registry(RegistryError),
    Lock(LockError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Registry(err) => write!(f, "{}", err),
            EngineError::Lock(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Registry(err) => Some(err),
            EngineError::Lock(err) => Some(err),
        }
    }
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        EngineError::Registry(err)
    }
}

impl From<LockError> for EngineError {
    fn from(err: LockError) -> Self {
        EngineError::Lock(err)
    }
}

/// The boundary-facing facade: registry, configuration, and release
/// coordination behind one synchronous API.
///
/// Construct one per process and pass it by reference (or wrap it in an
/// `Arc`) to every consumer; nothing here is an ambient global.
pub struct ExclusionEngine {
    config: EngineConfig,
    registry: StrategyRegistry,
    coordinator: Mutex<Option<ReleaseCoordinator>>,
}

impl ExclusionEngine {
    pub fn new(config: EngineConfig) -> Self {
        ExclusionEngine {
            coordinator: Mutex::new(Some(ReleaseCoordinator::spawn(config.poll_interval))),
            registry: StrategyRegistry::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn register(&self, strategy: Arc<dyn Strategy>) -> Result<(), RegistryError> {
        self.registry.register(strategy)
    }

    pub fn is_registered(&self, id: &StrategyId) -> bool {
        self.registry.is_registered(id)
    }

    /// Decide admission; on success the strategy has already recorded the
    /// lock, and the caller owes exactly one release.
    pub fn can_lock(
        &self,
        boundary: &BoundaryId,
        strategy_id: &StrategyId,
        info: &LockInfo,
    ) -> Result<Admission, EngineError> {
        let strategy = self.registry.resolve(strategy_id)?;
        let admission = strategy.can_lock(boundary, info)?;
        if self.config.surface_cancellation_errors {
            if let Admission::GrantedWithCancellation { reason, .. } = &admission {
                debug!(
                    boundary = %boundary,
                    strategy = %strategy_id,
                    reason = %reason,
                    "cancellation surfaced to error handler"
                );
            }
        }
        Ok(admission)
    }

    /// Run a batch-level condition before any strategy-specific check.
    ///
    /// Same contract as the dynamic-condition strategy: the predicate's
    /// failure short-circuits the pipeline, passed through unchanged.
    pub fn can_lock_with_precheck<F>(
        &self,
        boundary: &BoundaryId,
        strategy_id: &StrategyId,
        info: &LockInfo,
        precheck: F,
    ) -> Result<Admission, EngineError>
    where
        F: FnOnce() -> Result<(), ConditionError>,
    {
        precheck().map_err(|cause| EngineError::Lock(LockError::ConditionRejected(cause)))?;
        self.can_lock(boundary, strategy_id, info)
    }

    /// Admission plus an RAII guard pairing it with exactly one release.
    pub fn acquire(
        &self,
        boundary: &BoundaryId,
        strategy_id: &StrategyId,
        info: LockInfo,
    ) -> Result<(Admission, LockGuard), EngineError> {
        let strategy = self.registry.resolve(strategy_id)?;
        let admission = strategy.can_lock(boundary, &info)?;
        let guard = LockGuard::new(
            strategy,
            boundary.clone(),
            info,
            self.release_handle(),
            self.config.default_unlock_timing,
        );
        Ok((admission, guard))
    }

    /// Release immediately. Idempotent on absence; unknown strategies are a
    /// no-op (the lock they would hold cannot exist).
    pub fn unlock(&self, boundary: &BoundaryId, strategy_id: &StrategyId, info: &LockInfo) {
        self.unlock_after(boundary, strategy_id, info, UnlockTiming::Immediate);
    }

    /// Release at a chosen timing.
    pub fn unlock_after(
        &self,
        boundary: &BoundaryId,
        strategy_id: &StrategyId,
        info: &LockInfo,
        timing: UnlockTiming,
    ) {
        let Ok(strategy) = self.registry.resolve(strategy_id) else {
            return;
        };
        self.release_handle()
            .schedule(strategy, boundary.clone(), info.clone(), timing);
    }

    /// Release with the process-wide default timing.
    pub fn unlock_default(&self, boundary: &BoundaryId, strategy_id: &StrategyId, info: &LockInfo) {
        self.unlock_after(boundary, strategy_id, info, self.config.default_unlock_timing);
    }

    /// Administrative purge of one boundary across all strategies.
    pub fn cleanup(&self, boundary: &BoundaryId) {
        self.registry.cleanup_boundary(boundary);
    }

    /// Administrative purge of everything.
    pub fn cleanup_all(&self) {
        self.registry.cleanup_all();
    }

    /// Read-only introspection over every strategy's holdings.
    pub fn current_locks(&self) -> HashMap<BoundaryId, Vec<LockSnapshot>> {
        self.registry.current_locks()
    }

    /// Stop the release coordinator, draining pending deferred releases.
    /// Subsequent deferred releases degrade to inline unlocks.
    pub fn shutdown(&self) -> ReleaseStats {
        let mut coordinator = self
            .coordinator
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match coordinator.take() {
            Some(active) => active.stop(),
            None => ReleaseStats::default(),
        }
    }

    fn release_handle(&self) -> ReleaseHandle {
        let coordinator = self
            .coordinator
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match coordinator.as_ref() {
            Some(active) => active.handle(),
            // Shut down: schedule() on a detached handle releases inline.
            None => ReleaseHandle::detached(),
        }
    }
}

impl Default for ExclusionEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
