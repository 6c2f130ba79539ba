//! In-process exclusion control for UI actions.
//!
//! Each incoming action is tagged to a boundary (a screen, a subsystem) and
//! admitted, rejected, or admitted-while-cancelling some other in-flight
//! action. Decisions are made by pluggable strategies (single execution,
//! priority preemption, concurrency caps, group coordination, dynamic
//! conditions), optionally chained through a composite with all-or-nothing
//! admission and LIFO rollback.
//!
//! ```
//! use actionguard::{
//!     BoundaryId, EngineConfig, ExclusionEngine, ExecutionMode, LockInfo,
//!     SingleExecutionStrategy, Strategy,
//! };
//! use std::sync::Arc;
//!
//! let engine = ExclusionEngine::new(EngineConfig::default());
//! let strategy = Arc::new(SingleExecutionStrategy::new());
//! let id = strategy.id();
//! engine.register(strategy).unwrap();
//!
//! let boundary = BoundaryId::from("settings-screen");
//! let info = LockInfo::single_execution("save", ExecutionMode::Action);
//! engine.can_lock(&boundary, &id, &info).unwrap();
//! // ... guarded work ...
//! engine.unlock(&boundary, &id, &info);
//! # engine.shutdown();
//! ```

mod config;
mod engine;
mod error;
mod id;
mod info;
mod registry;
mod release;
mod state;
mod strategy;

pub use config::EngineConfig;
pub use engine::{EngineError, ExclusionEngine};
pub use error::{LockError, LockErrorKind};
pub use id::{ActionId, BoundaryId, StrategyId, UniqueId};
pub use info::{
    Behavior, ConcurrencyLimit, Condition, ConditionError, EntryPolicy, ExecutionMode,
    GroupRole, LockInfo, LockSnapshot, Priority, StrategyPayload,
};
pub use registry::{RegistryError, StrategyRegistry};
pub use release::{LockGuard, ReleaseCoordinator, ReleaseHandle, ReleaseStats, UnlockTiming};
pub use state::LockState;
pub use strategy::{
    Admission, CompositeArityError, CompositeStrategy, ConcurrencyLimitedStrategy,
    DynamicConditionStrategy, GroupCoordinationStrategy, PriorityBasedStrategy,
    SingleExecutionStrategy, Strategy,
};
