//! Viewport: Fixed-height row geometry for a scrollable view.
//!
//! Computes which indices of a group are visible for a scroll offset, how
//! many slots the view needs, and where each index is drawn.

use std::ops::Range;

/// Where a slot is drawn.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct SlotPosition {
    /// Index of the row within its group.
    pub index: usize,
    /// Top edge in pixels from the start of the group.
    pub top: u32,
}

/// Geometry of a scrollable list of equally tall rows.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Viewport {
    /// Height of one row in pixels.
    row_height: u32,
    /// Visible height in pixels.
    height: u32,
    /// Extra rows rendered above and below the visible area.
    overscan: usize,
}

impl Viewport {
    /// Create a viewport.
    ///
    /// # Panics
    /// Panics if `row_height` is 0.
    pub fn new(row_height: u32, height: u32) -> Self {
        assert!(row_height > 0, "Row height must be non-zero");
        Self {
            row_height,
            height,
            overscan: 0,
        }
    }

    /// Set the overscan.
    #[must_use]
    pub const fn with_overscan(mut self, overscan: usize) -> Self {
        self.overscan = overscan;
        self
    }

    /// Change the visible height (window resize).
    pub const fn set_height(&mut self, height: u32) {
        self.height = height;
    }

    /// Height of one row.
    #[inline]
    pub const fn row_height(&self) -> u32 {
        self.row_height
    }

    /// Rows that can be at least partly visible at once.
    #[inline]
    pub const fn visible_rows(&self) -> usize {
        // A scroll offset that splits a row shows one extra.
        self.height.div_ceil(self.row_height) as usize + 1
    }

    /// Number of slots the view needs: visible rows plus overscan.
    #[inline]
    pub const fn slot_count(&self) -> usize {
        self.visible_rows() + 2 * self.overscan
    }

    /// Indices to render for a scroll offset, clamped to `total`.
    pub fn visible_range(&self, scroll_top: u32, total: usize) -> Range<usize> {
        let first = (scroll_top / self.row_height) as usize;
        let start = first.saturating_sub(self.overscan).min(total);
        let end = (first + self.visible_rows() + self.overscan).min(total);
        start..end
    }

    /// Position of an index.
    #[inline]
    pub fn position(&self, index: usize) -> SlotPosition {
        let top = u32::try_from(index)
            .unwrap_or(u32::MAX)
            .saturating_mul(self.row_height);
        SlotPosition { index, top }
    }

    /// Total scrollable height for `total` rows.
    #[inline]
    pub fn content_height(&self, total: usize) -> u64 {
        total as u64 * u64::from(self.row_height)
    }
}
