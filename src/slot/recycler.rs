//! Slot recycler: Maps a window of items onto a fixed pool of slots.
//!
//! A renderer keys its on-screen elements by [`SlotId`]. When the window
//! scrolls, slots whose row is still visible keep that row untouched and
//! only get a fresh position; slots whose row left the window are reused
//! for rows that entered it. Redraw cost is therefore proportional to the
//! scroll delta, not to the window size.
//!
//! ```text
//!   window before:  [ r3 r4 r5 r6 ]        window after: [ r5 r6 r7 r8 ]
//!   slots:          s0 s1 s2 s3                           s0 s1 s2 s3
//!   items:          r3 r4 r5 r6        ──recycle──▶       r7 r8 r5 r6
//!   order():                                              s2 s3 s0 s1
//! ```

use super::slot::{Slot, SlotId, WindowItem};
use crate::row::RowId;
use std::collections::{HashMap, HashSet};

/// What a recycle pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecycleStats {
    /// Slots that kept their item.
    pub kept: usize,
    /// Slots whose item changed.
    pub reassigned: usize,
    /// Slots created to grow the pool.
    pub created: usize,
    /// Slots discarded to shrink the pool.
    pub discarded: usize,
}

/// A resizable pool of slots with stable identities.
#[derive(Debug, Clone)]
pub struct SlotPool<T, P> {
    /// Slots in render order.
    slots: Vec<Slot<T, P>>,
    /// Next id to hand out.
    next_id: u32,
}

impl<T, P> Default for SlotPool<T, P> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            next_id: 0,
        }
    }
}

impl<T, P> SlotPool<T, P> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// The slots in their current array order.
    #[inline]
    pub fn slots(&self) -> &[Slot<T, P>] {
        &self.slots
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool has no slots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate over the slots.
    pub fn iter(&self) -> impl Iterator<Item = &Slot<T, P>> {
        self.slots.iter()
    }

    fn allocate_id(&mut self) -> SlotId {
        let id = SlotId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

impl<T, P> SlotPool<T, P>
where
    T: WindowItem + Clone,
    P: Default,
{
    /// Assign `window` to the slots.
    ///
    /// The pool is first resized to `desired_len`, truncating from the end
    /// or appending fresh slots. Slots already holding a row that appears in
    /// the window keep it, with a new position and the window's current
    /// instance of the item; every other slot is
    /// free and receives one of the remaining indices. Indices past the end
    /// of `window`, and `None` entries, become placeholders. `position_fn`
    /// is called once per index with that index's item.
    pub fn recycle<F>(
        &mut self,
        window: &[Option<T>],
        desired_len: usize,
        mut position_fn: F,
    ) -> RecycleStats
    where
        F: FnMut(Option<&T>, usize) -> P,
    {
        let mut stats = RecycleStats {
            discarded: self.slots.len().saturating_sub(desired_len),
            created: desired_len.saturating_sub(self.slots.len()),
            ..RecycleStats::default()
        };

        self.slots.truncate(desired_len);
        for _ in 0..stats.created {
            let id = self.allocate_id();
            self.slots.push(Slot::new(id));
        }

        let window = &window[..window.len().min(desired_len)];
        let wanted: HashSet<RowId> = window
            .iter()
            .filter_map(|item| item.as_ref().map(WindowItem::row_id))
            .collect();

        let mut keep: HashMap<RowId, usize> = HashMap::with_capacity(wanted.len());
        let mut free = Vec::with_capacity(self.slots.len());
        for (index, slot) in self.slots.iter().enumerate() {
            match slot.row_id() {
                Some(id) if wanted.contains(&id) && !keep.contains_key(&id) => {
                    keep.insert(id, index);
                }
                _ => free.push(index),
            }
        }

        let mut unassigned = Vec::new();
        for i in 0..desired_len {
            let item = window.get(i).and_then(Option::as_ref);
            match item.and_then(|it| keep.remove(&it.row_id())) {
                Some(index) => {
                    // Same row, possibly newer values.
                    let slot = &mut self.slots[index];
                    slot.set_position(position_fn(item, i));
                    slot.set_item(item.cloned());
                    stats.kept += 1;
                }
                None => unassigned.push(i),
            }
        }

        // Free slots are handed out in array order.
        for (i, index) in unassigned.into_iter().zip(free) {
            let item = window.get(i).and_then(Option::as_ref);
            let slot = &mut self.slots[index];
            if slot.row_id() != item.map(WindowItem::row_id) {
                stats.reassigned += 1;
            }
            slot.set_position(position_fn(item, i));
            slot.set_item(item.cloned());
        }

        stats
    }

    /// Reorder the slot array so `slots[k]` shows `window[k]`.
    ///
    /// Only array positions change; no slot's id, item, or position is
    /// touched. Slots that match no window entry (placeholders) fill the
    /// remaining positions in their previous relative order.
    pub fn order(&mut self, window: &[Option<T>]) {
        let mut by_row: HashMap<RowId, usize> = HashMap::with_capacity(self.slots.len());
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(id) = slot.row_id() {
                by_row.entry(id).or_insert(index);
            }
        }

        let mut taken: Vec<Option<Slot<T, P>>> =
            std::mem::take(&mut self.slots).into_iter().map(Some).collect();
        let mut placed: Vec<Option<Slot<T, P>>> = Vec::with_capacity(taken.len());
        for k in 0..taken.len() {
            let slot = window
                .get(k)
                .and_then(Option::as_ref)
                .and_then(|item| by_row.remove(&item.row_id()))
                .and_then(|index| taken[index].take());
            placed.push(slot);
        }

        let mut rest = taken.into_iter().flatten();
        for entry in &mut placed {
            if entry.is_none() {
                *entry = rest.next();
            }
        }
        self.slots = placed.into_iter().flatten().collect();
    }
}
