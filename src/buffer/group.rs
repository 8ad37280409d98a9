//! GroupBuffer: The ordered, contiguous window of one group's rows.
//!
//! A buffer holds a slice of the rows that belong to one group, sorted by
//! order, together with the authoritative number of rows the server has for
//! that group. Three invariants hold after every operation:
//!
//! 1. `items` is sorted ascending by order and has no duplicate ids.
//! 2. Every row of the group whose order lies within the span of `items` is
//!    present (no gaps).
//! 3. `count >= items.len()`.
//!
//! Windows are anchored at the first row of the group: stacks are fetched
//! from offset zero and grow by paging forward. Anything ordered at or
//! before the last buffered row therefore belongs in the window, and only
//! rows past it are left unmaterialized.
//!
//! All operations are synchronous and infallible; they report what happened
//! through outcome enums so callers can log or react.

use super::key::GroupKey;
use crate::row::{Order, Row, RowId};
use std::ops::Range;

/// What `insert_created` did with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row was materialized at this index.
    Buffered(usize),
    /// The row lies outside the loaded window; only `count` changed.
    CountedOnly,
    /// The row was already buffered; it was re-placed like an update and
    /// `count` did not change.
    Replaced(RepositionOutcome),
}

/// What `reposition` did with an updated row that stays in this group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositionOutcome {
    /// The row was buffered and is now at index `to`.
    Moved {
        /// Previous index.
        from: usize,
        /// New index.
        to: usize,
    },
    /// The row left the buffered span and was evicted.
    Evicted,
    /// The row was not buffered and moved into the buffered span.
    Inserted(usize),
    /// The row was not buffered and stays outside the span.
    Untouched,
}

/// The buffered window and authoritative count of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBuffer {
    /// Group this buffer belongs to.
    key: GroupKey,
    /// Total rows in the group on the server.
    count: usize,
    /// Buffered rows, sorted by order.
    items: Vec<Row>,
    /// Whether a window has been fetched. Unloaded buffers only count.
    loaded: bool,
    /// Generation of the latest fetch started for this group.
    epoch: u64,
}

impl GroupBuffer {
    /// Create an unloaded buffer.
    ///
    /// Until a window is fetched the buffer cannot tell whether a row falls
    /// inside its span, so mutations only adjust `count`.
    pub const fn new(key: GroupKey) -> Self {
        Self {
            key,
            count: 0,
            items: Vec::new(),
            loaded: false,
            epoch: 0,
        }
    }

    /// Create a loaded buffer from a fetched window.
    pub fn with_window(key: GroupKey, items: Vec<Row>, count: usize) -> Self {
        let mut buffer = Self::new(key);
        buffer.reset_window(items, count);
        buffer
    }

    /// The group key.
    #[inline]
    pub const fn key(&self) -> &GroupKey {
        &self.key
    }

    /// Total number of rows in the group, buffered or not.
    #[inline]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// The buffered rows in ascending order.
    #[inline]
    pub fn items(&self) -> &[Row] {
        &self.items
    }

    /// Number of buffered rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no rows are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether a window has been fetched for this group.
    #[inline]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether every row of the group is buffered.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.loaded && self.items.len() == self.count
    }

    /// Current fetch generation.
    #[inline]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Index of a buffered row.
    pub fn position_of(&self, id: RowId) -> Option<usize> {
        self.items.iter().position(|r| r.id == id)
    }

    /// Get a buffered row by id.
    pub fn get(&self, id: RowId) -> Option<&Row> {
        self.items.iter().find(|r| r.id == id)
    }

    /// Get a mutable buffered row by id.
    ///
    /// Callers must not change the row's order through this reference.
    pub fn get_mut(&mut self, id: RowId) -> Option<&mut Row> {
        self.items.iter_mut().find(|r| r.id == id)
    }

    /// The closed order interval spanned by the buffered rows.
    pub fn span(&self) -> Option<(&Order, &Order)> {
        match (self.items.first(), self.items.last()) {
            (Some(first), Some(last)) => Some((&first.order, &last.order)),
            _ => None,
        }
    }

    /// Whether a row with this order belongs inside the buffered window.
    ///
    /// A buffer that holds its whole group accepts any order, since no row
    /// can exist outside it. Otherwise a row is accepted up to and including
    /// the last buffered order; an empty window of a non-empty group accepts
    /// nothing.
    pub fn accepts(&self, order: &Order) -> bool {
        if !self.loaded {
            return false;
        }
        if self.is_complete() {
            return true;
        }
        self.items.last().is_some_and(|last| *order <= last.order)
    }

    /// Record a newly created row.
    ///
    /// `count` always grows; the row is materialized only when it falls
    /// inside the buffered window. Equal orders keep arrival order.
    pub fn insert_created(&mut self, row: Row) -> InsertOutcome {
        if self.position_of(row.id).is_some() {
            tracing::debug!(
                target: "rowstack.buffer",
                group = %self.key,
                row = %row.id,
                "created row already buffered, replacing"
            );
            return InsertOutcome::Replaced(self.reposition(row));
        }

        let accepted = self.accepts(&row.order);
        self.count += 1;
        if accepted {
            InsertOutcome::Buffered(self.insert_sorted(row))
        } else {
            InsertOutcome::CountedOnly
        }
    }

    /// Record a deleted row.
    ///
    /// The row is removed if buffered; `count` shrinks either way because
    /// the row belonged to the group whether or not it was loaded.
    pub fn remove_deleted(&mut self, id: RowId) -> Option<Row> {
        self.count = self.count.saturating_sub(1);
        let removed = self.position_of(id).map(|index| self.items.remove(index));
        // Keep count >= len even when a delete is delivered twice.
        self.count = self.count.max(self.items.len());
        removed
    }

    /// Re-place a row whose values changed but whose group did not.
    ///
    /// The span is measured before the old instance is removed, so a row
    /// at the edge that moves slightly inward stays buffered. `count` is
    /// never touched, so an unbuffered row is inserted only while the
    /// window still has uncounted room for it.
    pub fn reposition(&mut self, row: Row) -> RepositionOutcome {
        self.place(row.id, row)
    }

    /// Swap the row `current` for `row`, which may carry a different id.
    ///
    /// Used when a provisional row is confirmed. Acceptance is measured
    /// while `current` is still buffered, so a complete window stays
    /// complete. A stale instance of `row.id` that is already buffered is
    /// dropped along with the count it added.
    pub fn replace(&mut self, current: RowId, row: Row) -> RepositionOutcome {
        if row.id != current {
            if let Some(index) = self.position_of(row.id) {
                self.items.remove(index);
                self.count = self.count.saturating_sub(1).max(self.items.len());
            }
        }
        self.place(current, row)
    }

    /// Start a fetch with a generation issued by the owner.
    pub(crate) fn begin_fetch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    fn place(&mut self, current: RowId, row: Row) -> RepositionOutcome {
        let accepted = self.accepts(&row.order);
        match self.position_of(current) {
            Some(from) => {
                self.items.remove(from);
                if accepted {
                    let to = self.insert_sorted(row);
                    RepositionOutcome::Moved { from, to }
                } else {
                    tracing::debug!(
                        target: "rowstack.buffer",
                        group = %self.key,
                        row = %row.id,
                        "row moved out of window, evicting"
                    );
                    RepositionOutcome::Evicted
                }
            }
            None if accepted && self.items.len() < self.count => {
                RepositionOutcome::Inserted(self.insert_sorted(row))
            }
            None => RepositionOutcome::Untouched,
        }
    }

    /// Replace the window wholesale after a fresh fetch.
    ///
    /// Never merges with the previous window. Rows are sorted by order and
    /// duplicate ids dropped; a count below the number of rows is raised.
    pub fn reset_window(&mut self, mut items: Vec<Row>, count: usize) {
        items.sort_by(|a, b| a.order.cmp(&b.order));
        let mut seen = std::collections::HashSet::with_capacity(items.len());
        items.retain(|r| seen.insert(r.id));

        if count < items.len() {
            tracing::warn!(
                target: "rowstack.buffer",
                group = %self.key,
                count,
                items = items.len(),
                "fetched count below window size, clamping"
            );
        }

        self.count = count.max(items.len());
        self.items = items;
        self.loaded = true;
    }

    /// Append the page that follows the current window.
    ///
    /// Rows already buffered or ordered at or before the current maximum are
    /// skipped, so a page that overlaps local inserts cannot break ordering.
    pub fn extend_window(&mut self, items: Vec<Row>, count: usize) {
        if !self.loaded {
            self.reset_window(items, count);
            return;
        }

        let mut page = items;
        page.sort_by(|a, b| a.order.cmp(&b.order));
        for row in page {
            let after_max = self.items.last().map_or(true, |last| row.order > last.order);
            if after_max && self.position_of(row.id).is_none() {
                self.items.push(row);
            }
        }
        self.count = count.max(self.items.len());
    }

    /// Rows at the given indices of the group, for rendering.
    ///
    /// The window is anchored at the group's first row. Indices past the
    /// buffered rows but below `count` yield `None` placeholders; indices at
    /// or past `count` are not returned.
    pub fn window(&self, range: Range<usize>) -> Vec<Option<&Row>> {
        let end = range.end.min(self.count);
        (range.start..end).map(|i| self.items.get(i)).collect()
    }

    /// Insert keeping ascending order; equal orders go after existing ones.
    fn insert_sorted(&mut self, row: Row) -> usize {
        let index = self.items.partition_point(|r| r.order <= row.order);
        self.items.insert(index, row);
        index
    }
}
