//! BufferRegistry: Routes row mutations to per-group buffers.
//!
//! One registry exists per mounted view. It owns the group buffers, the
//! policy that derives a row's group, and nothing else: no globals, so two
//! boards open at once never see each other's state.

use super::group::{GroupBuffer, InsertOutcome, RepositionOutcome};
use super::key::{GroupKey, GroupKeyPolicy};
use crate::row::{Row, RowFlags, RowId, RowPatch};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A row mutation to route into the buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// A row was created.
    Created(Row),
    /// A row changed from `old` to `new`.
    Updated {
        /// The row before the change.
        old: Row,
        /// The row after the change.
        new: Row,
    },
    /// A row was deleted.
    Deleted(Row),
}

/// Result of moving an updated row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The row stayed in its group.
    Repositioned {
        /// The group.
        key: GroupKey,
        /// What happened inside it.
        outcome: RepositionOutcome,
    },
    /// The row changed groups.
    Regrouped {
        /// Group the row left.
        from: GroupKey,
        /// Group the row joined.
        to: GroupKey,
        /// What happened in the new group.
        inserted: InsertOutcome,
    },
}

/// Saved buffer state for optimistic rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySnapshot {
    buffers: BTreeMap<GroupKey, GroupBuffer>,
}

/// Maps group keys to their buffers.
#[derive(Clone)]
pub struct BufferRegistry {
    /// Derives the group of a row.
    policy: Arc<dyn GroupKeyPolicy>,
    /// Buffers by key, in key order.
    buffers: BTreeMap<GroupKey, GroupBuffer>,
    /// Last fetch generation handed out. Outlives dropped buffers.
    epoch: u64,
}

impl BufferRegistry {
    /// Create an empty registry with the given grouping policy.
    pub fn new(policy: impl GroupKeyPolicy + 'static) -> Self {
        Self::with_policy(Arc::new(policy))
    }

    /// Create an empty registry sharing an existing policy.
    pub fn with_policy(policy: Arc<dyn GroupKeyPolicy>) -> Self {
        Self {
            policy,
            buffers: BTreeMap::new(),
            epoch: 0,
        }
    }

    /// The group a row belongs to.
    #[inline]
    pub fn key_for(&self, row: &Row) -> GroupKey {
        self.policy.extract(row)
    }

    /// Get the buffer of a group, if it has been referenced.
    pub fn get_buffer(&self, key: &GroupKey) -> Option<&GroupBuffer> {
        self.buffers.get(key)
    }

    /// Get the buffer of a group, creating an unloaded one on first use.
    pub fn buffer_mut(&mut self, key: &GroupKey) -> &mut GroupBuffer {
        self.buffers
            .entry(key.clone())
            .or_insert_with(|| GroupBuffer::new(key.clone()))
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no group has been referenced.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Sum of every group's count.
    pub fn total_count(&self) -> usize {
        self.buffers.values().map(GroupBuffer::count).sum()
    }

    /// Call `f` for every buffer in key order.
    pub fn for_each_buffer(&self, f: impl FnMut(&GroupBuffer)) {
        self.buffers.values().for_each(f);
    }

    /// Iterate over the buffers in key order.
    pub fn iter(&self) -> impl Iterator<Item = &GroupBuffer> {
        self.buffers.values()
    }

    /// Find a buffered row in any group.
    pub fn find(&self, id: RowId) -> Option<&Row> {
        self.buffers.values().find_map(|b| b.get(id))
    }

    /// The group currently buffering a row.
    pub fn find_key(&self, id: RowId) -> Option<&GroupKey> {
        self.buffers
            .values()
            .find(|b| b.get(id).is_some())
            .map(GroupBuffer::key)
    }

    /// Set or clear flags on a buffered row.
    ///
    /// Returns false if the row is not buffered.
    pub fn set_flags(&mut self, id: RowId, flags: RowFlags, on: bool) -> bool {
        self.buffers
            .values_mut()
            .find_map(|b| b.get_mut(id))
            .map(|row| row.flags.set(flags, on))
            .is_some()
    }

    /// Route a mutation to the right buffers.
    pub fn mutate(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Created(row) => {
                self.insert_created(row);
            }
            Mutation::Updated { old, new } => {
                self.move_row(&old, new);
            }
            Mutation::Deleted(row) => {
                self.remove_deleted(&row);
            }
        }
    }

    /// Record a created row in its group.
    pub fn insert_created(&mut self, row: Row) -> (GroupKey, InsertOutcome) {
        let key = self.key_for(&row);
        let outcome = self.buffer_mut(&key).insert_created(row);
        tracing::debug!(target: "rowstack.buffer", group = %key, ?outcome, "row created");
        (key, outcome)
    }

    /// Record a deleted row.
    ///
    /// The group is taken from wherever the row is buffered, falling back to
    /// the key derived from `row` when it is not buffered anywhere.
    pub fn remove_deleted(&mut self, row: &Row) -> Option<Row> {
        let key = self
            .find_key(row.id)
            .cloned()
            .unwrap_or_else(|| self.key_for(row));
        let removed = self.buffer_mut(&key).remove_deleted(row.id);
        tracing::debug!(
            target: "rowstack.buffer",
            group = %key,
            row = %row.id,
            buffered = removed.is_some(),
            "row deleted"
        );
        removed
    }

    /// Apply new values to a row and move it accordingly.
    ///
    /// Returns the updated row as it now appears (with preserved flags).
    pub fn apply_update(&mut self, old: &Row, patch: &RowPatch) -> (Row, MoveOutcome) {
        let flags = self.find(old.id).map_or(old.flags, |r| r.flags);
        let new = patch.apply_to(old).with_flags(flags);
        let outcome = self.move_row(old, new.clone());
        (new, outcome)
    }

    /// Move a row from its old values to its new ones.
    ///
    /// When the group is unchanged the row is re-placed within its buffer.
    /// Otherwise it is deleted from the old group and inserted into the new
    /// one in a single call. Transient flags of the buffered instance are
    /// carried over either way.
    pub fn move_row(&mut self, old: &Row, mut new: Row) -> MoveOutcome {
        let (from, flags) = match self.find(old.id) {
            Some(buffered) => (self.key_for(buffered), buffered.flags),
            None => (self.key_for(old), old.flags),
        };
        new.flags = flags;
        let to = self.key_for(&new);

        if from == to {
            let outcome = self.buffer_mut(&to).reposition(new);
            tracing::debug!(target: "rowstack.buffer", group = %to, ?outcome, "row updated");
            return MoveOutcome::Repositioned { key: to, outcome };
        }

        self.buffer_mut(&from).remove_deleted(old.id);
        let inserted = self.buffer_mut(&to).insert_created(new);
        tracing::debug!(
            target: "rowstack.buffer",
            from = %from,
            to = %to,
            ?inserted,
            "row moved between groups"
        );
        MoveOutcome::Regrouped { from, to, inserted }
    }

    /// Swap an optimistically created row for the server's version.
    ///
    /// The confirmed row keeps the provisional row's flags minus
    /// `PENDING_CREATE`. Counts are left as the optimistic insert set them
    /// unless the confirmed row landed in another group.
    pub fn replace_row(&mut self, provisional: &Row, mut confirmed: Row) -> MoveOutcome {
        let (from, flags) = match self.find(provisional.id) {
            Some(buffered) => (self.key_for(buffered), buffered.flags),
            None => (self.key_for(provisional), provisional.flags),
        };
        confirmed.flags = flags - RowFlags::PENDING_CREATE;
        let to = self.key_for(&confirmed);

        if from == to {
            let outcome = self.buffer_mut(&to).replace(provisional.id, confirmed);
            return MoveOutcome::Repositioned { key: to, outcome };
        }

        self.buffer_mut(&from).remove_deleted(provisional.id);
        let inserted = self.buffer_mut(&to).insert_created(confirmed);
        MoveOutcome::Regrouped { from, to, inserted }
    }

    /// Replace a group's window after a fresh fetch.
    pub fn reset_window(&mut self, key: &GroupKey, items: Vec<Row>, count: usize) {
        self.buffer_mut(key).reset_window(items, count);
    }

    /// Append the next page to a group's window.
    pub fn extend_window(&mut self, key: &GroupKey, items: Vec<Row>, count: usize) {
        self.buffer_mut(key).extend_window(items, count);
    }

    /// Start a fetch for a group and return its generation.
    ///
    /// Generations increase across the whole registry, so a ticket issued
    /// before a group was dropped never matches a later fetch of it.
    pub fn begin_fetch(&mut self, key: &GroupKey) -> u64 {
        self.epoch += 1;
        let epoch = self.epoch;
        self.buffer_mut(key).begin_fetch(epoch);
        epoch
    }

    /// Drop a group's buffer.
    pub fn remove_group(&mut self, key: &GroupKey) -> Option<GroupBuffer> {
        self.buffers.remove(key)
    }

    /// Drop every buffer (view or field context changed).
    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    /// Capture the current buffers.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            buffers: self.buffers.clone(),
        }
    }

    /// Restore buffers captured by [`snapshot`](Self::snapshot).
    pub fn restore(&mut self, snapshot: RegistrySnapshot) {
        self.buffers = snapshot.buffers;
    }
}

impl fmt::Debug for BufferRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferRegistry")
            .field("groups", &self.buffers.len())
            .field("total_count", &self.total_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::key::FieldValueKey;
    use crate::row::{FieldId, FieldValue, Order};

    const STATUS: FieldId = FieldId(1);

    fn row(id: u64, order: &str, option: Option<u64>) -> Row {
        let row = Row::new(RowId(id), Order::parse(order).unwrap());
        match option {
            Some(o) => row.with_field(STATUS, FieldValue::SelectOption(o)),
            None => row,
        }
    }

    fn ids(registry: &BufferRegistry, key: &GroupKey) -> Vec<u64> {
        registry
            .get_buffer(key)
            .map(|b| b.items().iter().map(|r| r.id.0).collect())
            .unwrap_or_default()
    }

    /// Group `null` holds row 2 of 1; group `1` holds rows 10 and 11 of 100.
    fn board() -> BufferRegistry {
        let mut registry = BufferRegistry::new(FieldValueKey(STATUS));
        registry.reset_window(&GroupKey::Ungrouped, vec![row(2, "2.00", None)], 1);
        registry.reset_window(
            &GroupKey::Option(1),
            vec![row(10, "10.00", Some(1)), row(11, "11.00", Some(1))],
            100,
        );
        registry
    }

    #[test]
    fn test_insert_created_routes_by_group() {
        let mut registry = board();

        registry.insert_created(row(1, "1.00", None));
        let ungrouped = registry.get_buffer(&GroupKey::Ungrouped).unwrap();
        assert_eq!(ungrouped.count(), 2);
        assert_eq!(ids(&registry, &GroupKey::Ungrouped), vec![1, 2]);

        registry.insert_created(row(9, "9.00", Some(1)));
        let group = registry.get_buffer(&GroupKey::Option(1)).unwrap();
        assert_eq!(group.count(), 101);
        assert_eq!(ids(&registry, &GroupKey::Option(1)), vec![9, 10, 11]);
    }

    #[test]
    fn test_delete_counts_unbuffered_rows() {
        let mut registry = board();
        let key = GroupKey::Option(1);

        assert!(registry.remove_deleted(&row(10, "10.00", Some(1))).is_some());
        assert!(registry.remove_deleted(&row(50, "50.00", Some(1))).is_none());

        let group = registry.get_buffer(&key).unwrap();
        assert_eq!(group.count(), 98);
        assert_eq!(ids(&registry, &key), vec![11]);
    }

    #[test]
    fn test_reorder_preserves_flags() {
        let mut registry = board();
        let key = GroupKey::Option(1);
        registry
            .buffer_mut(&key)
            .get_mut(RowId(11))
            .unwrap()
            .flags = RowFlags::MUST_PERSIST;

        let old = row(11, "11.00", Some(1));
        let patch = RowPatch::new().with_order(Order::parse("9.00").unwrap());
        let (updated, outcome) = registry.apply_update(&old, &patch);

        assert_eq!(
            outcome,
            MoveOutcome::Repositioned {
                key: key.clone(),
                outcome: RepositionOutcome::Moved { from: 1, to: 0 },
            }
        );
        assert_eq!(ids(&registry, &key), vec![11, 10]);
        assert_eq!(registry.get_buffer(&key).unwrap().count(), 100);
        assert_eq!(updated.flags, RowFlags::MUST_PERSIST);
        assert_eq!(registry.find(RowId(11)).unwrap().flags, RowFlags::MUST_PERSIST);
    }

    #[test]
    fn test_set_flags_on_buffered_rows_only() {
        let mut registry = board();

        assert!(registry.set_flags(RowId(10), RowFlags::PENDING_UPDATE, true));
        assert_eq!(registry.find(RowId(10)).unwrap().flags, RowFlags::PENDING_UPDATE);
        assert!(registry.set_flags(RowId(10), RowFlags::PENDING_UPDATE, false));
        assert!(registry.find(RowId(10)).unwrap().flags.is_empty());
        assert!(!registry.set_flags(RowId(50), RowFlags::PENDING_UPDATE, true));
    }

    #[test]
    fn test_regroup_moves_row_and_counts() {
        let mut registry = board();
        registry
            .buffer_mut(&GroupKey::Option(1))
            .get_mut(RowId(10))
            .unwrap()
            .flags = RowFlags::MUST_PERSIST;

        let old = row(10, "10.00", Some(1));
        let patch = RowPatch::new()
            .with_order(Order::parse("1.5").unwrap())
            .with_field(STATUS, FieldValue::Null);
        let (_, outcome) = registry.apply_update(&old, &patch);

        assert_eq!(
            outcome,
            MoveOutcome::Regrouped {
                from: GroupKey::Option(1),
                to: GroupKey::Ungrouped,
                inserted: InsertOutcome::Buffered(0),
            }
        );
        assert_eq!(ids(&registry, &GroupKey::Ungrouped), vec![10, 2]);
        assert_eq!(ids(&registry, &GroupKey::Option(1)), vec![11]);
        assert_eq!(registry.get_buffer(&GroupKey::Ungrouped).unwrap().count(), 2);
        assert_eq!(registry.get_buffer(&GroupKey::Option(1)).unwrap().count(), 99);
        assert_eq!(registry.find(RowId(10)).unwrap().flags, RowFlags::MUST_PERSIST);
        assert_eq!(registry.total_count(), 101);
    }

    #[test]
    fn test_unresolvable_group_only_counts() {
        let mut registry = board();
        let (key, outcome) = registry.insert_created(row(70, "70", Some(7)));

        assert_eq!(key, GroupKey::Option(7));
        assert_eq!(outcome, InsertOutcome::CountedOnly);
        let unloaded = registry.get_buffer(&key).unwrap();
        assert!(!unloaded.is_loaded());
        assert_eq!(unloaded.count(), 1);
        assert!(unloaded.is_empty());
    }

    #[test]
    fn test_mutate_routes_events() {
        let mut registry = board();
        registry.mutate(Mutation::Created(row(3, "3", None)));
        registry.mutate(Mutation::Updated {
            old: row(3, "3", None),
            new: row(3, "10.5", Some(1)),
        });
        registry.mutate(Mutation::Deleted(row(11, "11", Some(1))));

        assert_eq!(ids(&registry, &GroupKey::Ungrouped), vec![2]);
        assert_eq!(ids(&registry, &GroupKey::Option(1)), vec![10, 3]);
        assert_eq!(registry.total_count(), 101);
    }

    #[test]
    fn test_replace_provisional_row() {
        let mut registry = board();
        let provisional = row(RowId::PROVISIONAL_START, "1.5", None)
            .with_flags(RowFlags::PENDING_CREATE | RowFlags::MUST_PERSIST);
        registry.insert_created(provisional.clone());

        registry.replace_row(&provisional, row(12, "1.5", None));

        assert_eq!(ids(&registry, &GroupKey::Ungrouped), vec![12, 2]);
        assert_eq!(registry.get_buffer(&GroupKey::Ungrouped).unwrap().count(), 2);
        assert_eq!(registry.find(RowId(12)).unwrap().flags, RowFlags::MUST_PERSIST);
    }

    #[test]
    fn test_replace_at_end_of_complete_group() {
        let mut registry = board();
        let provisional = row(RowId::PROVISIONAL_START, "9", None).with_flags(RowFlags::PENDING_CREATE);
        registry.insert_created(provisional.clone());

        let outcome = registry.replace_row(&provisional, row(12, "9", None));

        assert_eq!(
            outcome,
            MoveOutcome::Repositioned {
                key: GroupKey::Ungrouped,
                outcome: RepositionOutcome::Moved { from: 1, to: 1 },
            }
        );
        let ungrouped = registry.get_buffer(&GroupKey::Ungrouped).unwrap();
        assert_eq!(ids(&registry, &GroupKey::Ungrouped), vec![2, 12]);
        assert!(ungrouped.is_complete());
        assert!(registry.find(RowId(12)).unwrap().flags.is_empty());
    }

    #[test]
    fn test_replace_in_empty_group() {
        let mut registry = board();
        registry.reset_window(&GroupKey::Option(3), Vec::new(), 0);
        let provisional = row(RowId::PROVISIONAL_START, "1", Some(3)).with_flags(RowFlags::PENDING_CREATE);
        registry.insert_created(provisional.clone());

        registry.replace_row(&provisional, row(12, "1", Some(3)));

        let group = registry.get_buffer(&GroupKey::Option(3)).unwrap();
        assert_eq!(ids(&registry, &GroupKey::Option(3)), vec![12]);
        assert_eq!(group.count(), 1);
    }

    #[test]
    fn test_fetch_epochs_survive_dropped_groups() {
        let mut registry = board();
        let key = GroupKey::Option(1);
        let first = registry.begin_fetch(&key);
        registry.remove_group(&key);

        let second = registry.begin_fetch(&key);
        assert!(second > first);
        assert_eq!(registry.get_buffer(&key).unwrap().epoch(), second);
        assert_eq!(registry.begin_fetch(&GroupKey::Ungrouped), second + 1);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut registry = board();
        let snapshot = registry.snapshot();
        registry.insert_created(row(1, "1", None));
        registry.remove_deleted(&row(10, "10", Some(1)));
        registry.restore(snapshot.clone());
        assert_eq!(registry.snapshot(), snapshot);
    }

    #[test]
    fn test_for_each_buffer_in_key_order() {
        let registry = board();
        let mut keys = Vec::new();
        registry.for_each_buffer(|b| keys.push(b.key().clone()));
        assert_eq!(keys, vec![GroupKey::Ungrouped, GroupKey::Option(1)]);
    }

    #[test]
    fn test_registries_are_isolated() {
        let mut left = board();
        let right = board();
        left.insert_created(row(1, "1", None));
        assert_eq!(left.total_count(), 102);
        assert_eq!(right.total_count(), 101);
    }
}
