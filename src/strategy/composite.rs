use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{Admission, Strategy};
use crate::error::LockError;
use crate::id::{BoundaryId, StrategyId};
use crate::info::{LockInfo, LockSnapshot, StrategyPayload};

pub const MIN_ARITY: usize = 2;
pub const MAX_ARITY: usize = 5;

/// A composite was constructed with an unsupported number of children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeArityError {
    pub got: usize,
}

impl fmt::Display for CompositeArityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "composite strategy takes {} to {} children, got {}",
            MIN_ARITY, MAX_ARITY, self.got
        )
    }
}

impl std::error::Error for CompositeArityError {}

/// Chains 2 to 5 child strategies into one all-or-nothing admission.
///
/// Children are evaluated in declared order against their positionally
/// matched infos; the first failure rolls back every already-acquired child
/// in reverse order and is returned to the caller unmodified. Release mirrors
/// acquisition: unlock fans out to the children LIFO.
///
/// The child sequence is not globally atomic; each child's own decision is,
/// and rollback guarantees no partial state survives, which is the accepted
/// trade-off instead of two-phase locking across child states. No retries
/// happen here; retry is a caller concern.
#[derive(Debug)]
pub struct CompositeStrategy {
    id: StrategyId,
    children: Vec<Arc<dyn Strategy>>,
}

impl CompositeStrategy {
    /// Build a composite from 2..=5 children. The set is fixed and immutable
    /// after construction; the composite's id derives from the children's
    /// ids, so registering the same combination twice is detectable.
    pub fn new(children: Vec<Arc<dyn Strategy>>) -> Result<Self, CompositeArityError> {
        if !(MIN_ARITY..=MAX_ARITY).contains(&children.len()) {
            return Err(CompositeArityError {
                got: children.len(),
            });
        }
        let child_ids: Vec<StrategyId> = children.iter().map(|child| child.id()).collect();
        Ok(CompositeStrategy {
            id: StrategyId::composite(&child_ids),
            children,
        })
    }

    pub fn arity(&self) -> usize {
        self.children.len()
    }

    fn child_infos<'a>(&self, info: &'a LockInfo) -> Result<&'a [LockInfo], LockError> {
        match info.payload() {
            StrategyPayload::Composite(children) if children.len() == self.children.len() => {
                Ok(children)
            }
            _ => Err(LockError::InfoMismatch {
                strategy: self.id.clone(),
                expected: "composite",
            }),
        }
    }
}

impl Strategy for CompositeStrategy {
    fn id(&self) -> StrategyId {
        self.id.clone()
    }

    fn can_lock(
        &self,
        boundary: &BoundaryId,
        info: &LockInfo,
    ) -> Result<Admission, LockError> {
        let child_infos = self.child_infos(info)?;

        let mut acquired: Vec<usize> = Vec::with_capacity(self.children.len());
        let mut first_cancellation: Option<Admission> = None;

        for (index, (child, child_info)) in
            self.children.iter().zip(child_infos.iter()).enumerate()
        {
            match child.can_lock(boundary, child_info) {
                Ok(Admission::Granted) => acquired.push(index),
                Ok(admission @ Admission::GrantedWithCancellation { .. }) => {
                    acquired.push(index);
                    // First cancellation signal wins; later ones have already
                    // taken effect on their own state but are not reported.
                    if first_cancellation.is_none() {
                        first_cancellation = Some(admission);
                    }
                }
                Err(err) => {
                    debug!(
                        boundary = %boundary,
                        action = %info.action_id(),
                        failed_child = %child.id(),
                        "composite admission failed, rolling back"
                    );
                    // Unwind most-recently-acquired first.
                    for &unwind in acquired.iter().rev() {
                        self.children[unwind].unlock(boundary, &child_infos[unwind]);
                    }
                    // The child's error, untouched.
                    return Err(err);
                }
            }
        }

        Ok(first_cancellation.unwrap_or(Admission::Granted))
    }

    fn unlock(&self, boundary: &BoundaryId, info: &LockInfo) {
        let child_infos = match info.payload() {
            StrategyPayload::Composite(children) => children,
            // Nothing of ours; unlock is idempotent-on-absence.
            _ => return,
        };
        for (child, child_info) in self.children.iter().zip(child_infos.iter()).rev() {
            child.unlock(boundary, child_info);
        }
    }

    fn cleanup_boundary(&self, boundary: &BoundaryId) {
        for child in self.children.iter().rev() {
            child.cleanup_boundary(boundary);
        }
    }

    fn cleanup(&self) {
        for child in self.children.iter().rev() {
            child.cleanup();
        }
    }

    /// The composite holds no state of its own; its view is the union of its
    /// children's views.
    fn current_locks(&self) -> HashMap<BoundaryId, Vec<LockSnapshot>> {
        let mut merged: HashMap<BoundaryId, Vec<LockSnapshot>> = HashMap::new();
        for child in &self.children {
            for (boundary, snapshots) in child.current_locks() {
                merged.entry(boundary).or_default().extend(snapshots);
            }
        }
        merged
    }
}
