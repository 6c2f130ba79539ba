use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::{snapshot_table, Admission, Strategy};
use crate::error::LockError;
use crate::id::{BoundaryId, StrategyId};
use crate::info::{EntryPolicy, GroupRole, LockInfo, LockSnapshot, StrategyPayload};
use crate::state::LockState;

/// Multi-party coordination via named groups and two roles.
///
/// A record participates in every group named in its `group_ids` (one
/// record, multiple memberships), so any one group's emptiness check sees it,
/// and unlocking it vacates all of them at once. Members require a non-empty
/// group; leaders gate entry per group by policy; role `None` is an observer
/// that is recorded but never counted as a participant.
pub struct GroupCoordinationStrategy {
    id: StrategyId,
    state: LockState,
}

impl GroupCoordinationStrategy {
    pub fn new() -> Self {
        GroupCoordinationStrategy {
            id: StrategyId::from("group_coordination"),
            state: LockState::new(),
        }
    }

    fn params_of<'a>(
        &self,
        info: &'a LockInfo,
    ) -> Result<(&'a BTreeSet<String>, GroupRole), LockError> {
        match info.payload() {
            StrategyPayload::Group { group_ids, role } => Ok((group_ids, *role)),
            _ => Err(LockError::InfoMismatch {
                strategy: self.id.clone(),
                expected: "group",
            }),
        }
    }
}

impl Default for GroupCoordinationStrategy {
    fn default() -> Self {
        Self::new()
    }
}

fn role_in_group(record: &LockInfo, group_id: &str) -> Option<GroupRole> {
    match record.payload() {
        StrategyPayload::Group { group_ids, role } if group_ids.contains(group_id) => Some(*role),
        _ => None,
    }
}

/// Participants are leaders and members only; observers never count.
fn participants<'a>(
    records: &'a [LockInfo],
    group_id: &'a str,
) -> impl Iterator<Item = (&'a LockInfo, GroupRole)> + 'a {
    records
        .iter()
        .filter_map(move |record| match role_in_group(record, group_id) {
            Some(GroupRole::None) | None => None,
            Some(role) => Some((record, role)),
        })
}

fn check_leader_entry(
    records: &[LockInfo],
    group_id: &str,
    policy: EntryPolicy,
) -> Result<(), LockError> {
    match policy {
        EntryPolicy::EmptyGroup => {
            if participants(records, group_id).next().is_some() {
                return Err(LockError::LeaderCannotJoinNonEmptyGroup {
                    group_id: group_id.to_string(),
                });
            }
        }
        EntryPolicy::WithoutMembers => {
            if participants(records, group_id).any(|(_, role)| role == GroupRole::Member) {
                return Err(LockError::LeaderCannotJoinGroupWithMembers {
                    group_id: group_id.to_string(),
                });
            }
        }
        EntryPolicy::WithoutLeader => {
            if participants(records, group_id)
                .any(|(_, role)| matches!(role, GroupRole::Leader(_)))
            {
                return Err(LockError::LeaderCannotJoinGroupWithLeader {
                    group_id: group_id.to_string(),
                });
            }
        }
    }
    Ok(())
}

impl Strategy for GroupCoordinationStrategy {
    fn id(&self) -> StrategyId {
        self.id.clone()
    }

    fn can_lock(
        &self,
        boundary: &BoundaryId,
        info: &LockInfo,
    ) -> Result<Admission, LockError> {
        let (group_ids, role) = self.params_of(info)?;

        self.state.decide(boundary, |records| {
            match role {
                GroupRole::None => {}
                GroupRole::Member => {
                    // Every named group must already have a participant.
                    for group_id in group_ids {
                        if participants(records, group_id).next().is_none() {
                            debug!(
                                boundary = %boundary,
                                action = %info.action_id(),
                                group = %group_id,
                                "member cannot join empty group"
                            );
                            return Err(LockError::MemberCannotJoinEmptyGroup {
                                group_id: group_id.clone(),
                            });
                        }
                    }
                }
                GroupRole::Leader(policy) => {
                    for group_id in group_ids {
                        check_leader_entry(records, group_id, policy).map_err(|err| {
                            debug!(
                                boundary = %boundary,
                                action = %info.action_id(),
                                group = %group_id,
                                "leader entry denied"
                            );
                            err
                        })?;
                    }
                }
            }

            records.push(info.clone());
            Ok(Admission::Granted)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LockErrorKind;

    fn boundary() -> BoundaryId {
        BoundaryId::from("screen")
    }

    fn leader(action: &str, groups: &[&str], policy: EntryPolicy) -> LockInfo {
        LockInfo::group(action, groups.iter().copied(), GroupRole::Leader(policy))
    }

    fn member(action: &str, groups: &[&str]) -> LockInfo {
        LockInfo::group(action, groups.iter().copied(), GroupRole::Member)
    }

    #[test]
    fn member_cannot_join_empty_group() {
        let strategy = GroupCoordinationStrategy::new();
        let err = strategy
            .can_lock(&boundary(), &member("worker", &["g1"]))
            .unwrap_err();
        match err {
            LockError::MemberCannotJoinEmptyGroup { group_id } => assert_eq!(group_id, "g1"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn leader_then_member_sequence() {
        let strategy = GroupCoordinationStrategy::new();
        let b = boundary();
        let lead = leader("coordinator", &["g1"], EntryPolicy::EmptyGroup);
        strategy.can_lock(&b, &lead).unwrap();
        strategy.can_lock(&b, &member("worker", &["g1"])).unwrap();
    }

    #[test]
    fn empty_group_policy_rejects_any_participant() {
        let strategy = GroupCoordinationStrategy::new();
        let b = boundary();
        strategy
            .can_lock(&b, &leader("first", &["g1"], EntryPolicy::EmptyGroup))
            .unwrap();

        let err = strategy
            .can_lock(&b, &leader("second", &["g1"], EntryPolicy::EmptyGroup))
            .unwrap_err();
        assert_eq!(err.kind(), LockErrorKind::LeaderCannotJoinNonEmptyGroup);
    }

    #[test]
    fn without_members_policy_tolerates_other_leaders() {
        let strategy = GroupCoordinationStrategy::new();
        let b = boundary();
        strategy
            .can_lock(&b, &leader("first", &["g1"], EntryPolicy::EmptyGroup))
            .unwrap();

        // A second leader is fine under WithoutMembers.
        strategy
            .can_lock(&b, &leader("second", &["g1"], EntryPolicy::WithoutMembers))
            .unwrap();

        // Once a member joins, WithoutMembers rejects.
        strategy.can_lock(&b, &member("worker", &["g1"])).unwrap();
        let err = strategy
            .can_lock(&b, &leader("third", &["g1"], EntryPolicy::WithoutMembers))
            .unwrap_err();
        assert_eq!(err.kind(), LockErrorKind::LeaderCannotJoinGroupWithMembers);
    }

    #[test]
    fn without_leader_policy_tolerates_members() {
        let strategy = GroupCoordinationStrategy::new();
        let b = boundary();
        let first = leader("first", &["g1"], EntryPolicy::EmptyGroup);
        strategy.can_lock(&b, &first).unwrap();
        strategy.can_lock(&b, &member("worker", &["g1"])).unwrap();

        // A leader is still present, so WithoutLeader rejects.
        let err = strategy
            .can_lock(&b, &leader("late", &["g1"], EntryPolicy::WithoutLeader))
            .unwrap_err();
        assert_eq!(err.kind(), LockErrorKind::LeaderCannotJoinGroupWithLeader);

        // Once the leader leaves, members alone do not block it.
        strategy.unlock(&b, &first);
        strategy
            .can_lock(&b, &leader("late", &["g1"], EntryPolicy::WithoutLeader))
            .unwrap();
    }

    #[test]
    fn unlock_by_unique_id_only() {
        let strategy = GroupCoordinationStrategy::new();
        let b = boundary();
        let lead = leader("coordinator", &["g1"], EntryPolicy::EmptyGroup);
        strategy.can_lock(&b, &lead).unwrap();

        // Same action id, different instance: a no-op.
        let impostor = leader("coordinator", &["g1"], EntryPolicy::EmptyGroup);
        strategy.unlock(&b, &impostor);
        strategy.can_lock(&b, &member("worker", &["g1"])).unwrap();

        // The real unlock vacates the group for WithoutLeader entry.
        strategy.unlock(&b, &lead);
        strategy
            .can_lock(&b, &leader("late", &["g1"], EntryPolicy::WithoutLeader))
            .unwrap();
    }

    #[test]
    fn one_record_participates_in_all_its_groups() {
        let strategy = GroupCoordinationStrategy::new();
        let b = boundary();
        let lead = leader("coordinator", &["g1", "g2"], EntryPolicy::EmptyGroup);
        strategy.can_lock(&b, &lead).unwrap();

        // Both groups are non-empty for members.
        strategy.can_lock(&b, &member("w1", &["g1"])).unwrap();
        strategy.can_lock(&b, &member("w2", &["g2"])).unwrap();

        // A member spanning both groups requires both non-empty; after the
        // leader leaves, participants (the members) still hold them open.
        strategy.unlock(&b, &lead);
        strategy
            .can_lock(&b, &member("w3", &["g1", "g2"]))
            .unwrap();
    }

    #[test]
    fn member_spanning_groups_fails_on_first_empty_one() {
        let strategy = GroupCoordinationStrategy::new();
        let b = boundary();
        strategy
            .can_lock(&b, &leader("coordinator", &["g1"], EntryPolicy::EmptyGroup))
            .unwrap();

        let err = strategy
            .can_lock(&b, &member("worker", &["g1", "g2"]))
            .unwrap_err();
        match err {
            LockError::MemberCannotJoinEmptyGroup { group_id } => assert_eq!(group_id, "g2"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn observer_role_is_recorded_but_never_counts() {
        let strategy = GroupCoordinationStrategy::new();
        let b = boundary();
        let observer = LockInfo::group("watcher", ["g1"], GroupRole::None);
        strategy.can_lock(&b, &observer).unwrap();

        // The observer does not make g1 joinable for members...
        let err = strategy.can_lock(&b, &member("worker", &["g1"])).unwrap_err();
        assert_eq!(err.kind(), LockErrorKind::MemberCannotJoinEmptyGroup);

        // ...nor does it block an empty-group leader.
        strategy
            .can_lock(&b, &leader("coordinator", &["g1"], EntryPolicy::EmptyGroup))
            .unwrap();

        // But it is visible to introspection and unlockable.
        let locks = strategy.current_locks();
        assert_eq!(locks[&b].len(), 2);
        strategy.unlock(&b, &observer);
        assert_eq!(strategy.current_locks()[&b].len(), 1);
    }
}
