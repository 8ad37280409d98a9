//! Slot: A reusable rendering unit with a stable identity.

use crate::row::{Row, RowId};

/// Stable render key of a slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SlotId(pub u32);

impl SlotId {
    /// Create a new slot ID.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

/// Anything that can occupy a slot. Items are matched by row id.
pub trait WindowItem {
    /// The id of the row this item shows.
    fn row_id(&self) -> RowId;
}

impl WindowItem for Row {
    fn row_id(&self) -> RowId {
        self.id
    }
}

impl WindowItem for RowId {
    fn row_id(&self) -> RowId {
        *self
    }
}

impl<T: WindowItem + ?Sized> WindowItem for &T {
    fn row_id(&self) -> RowId {
        (**self).row_id()
    }
}

/// A rendering slot.
///
/// The id never changes. The item is a lookup reference into a buffer (or
/// an owned copy, refreshed on every recycle pass) and may be `None` for a
/// placeholder; the position is recomputed on every pass too.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot<T, P> {
    id: SlotId,
    position: P,
    item: Option<T>,
}

impl<T, P: Default> Slot<T, P> {
    /// Create an empty slot.
    pub(crate) fn new(id: SlotId) -> Self {
        Self {
            id,
            position: P::default(),
            item: None,
        }
    }
}

impl<T, P> Slot<T, P> {
    /// The stable render key.
    #[inline]
    pub const fn id(&self) -> SlotId {
        self.id
    }

    /// Position computed on the last recycle pass.
    #[inline]
    pub const fn position(&self) -> &P {
        &self.position
    }

    /// The item shown, or `None` for a placeholder.
    #[inline]
    pub const fn item(&self) -> Option<&T> {
        self.item.as_ref()
    }

    pub(crate) fn set_position(&mut self, position: P) {
        self.position = position;
    }

    pub(crate) fn set_item(&mut self, item: Option<T>) {
        self.item = item;
    }
}

impl<T: WindowItem, P> Slot<T, P> {
    /// Row id of the item shown.
    #[inline]
    pub fn row_id(&self) -> Option<RowId> {
        self.item.as_ref().map(WindowItem::row_id)
    }
}
