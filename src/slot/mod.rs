//! Slot module: Stable rendering slots for virtualized row views.
//!
//! This module contains:
//! - [`Slot`]: A reusable rendering unit keyed by a stable [`SlotId`]
//! - [`SlotPool`]: Recycles slots across scroll passes and orders them
//! - [`Viewport`]: Row geometry used to size the pool and position slots
//!
//! # Example
//!
//! ```rust
//! use rowstack::{Order, Row, RowId, SlotPool, Viewport};
//!
//! let rows: Vec<Row> = (0..100)
//!     .map(|i| Row::new(RowId(i), Order::from_integer(i)))
//!     .collect();
//! let viewport = Viewport::new(30, 300).with_overscan(2);
//! let mut pool = SlotPool::new();
//!
//! let range = viewport.visible_range(450, rows.len());
//! let window: Vec<Option<&Row>> = rows[range.clone()].iter().map(Some).collect();
//! pool.recycle(&window, viewport.slot_count(), |_, i| viewport.position(range.start + i));
//!
//! assert_eq!(pool.len(), viewport.slot_count());
//! ```

mod recycler;
#[allow(clippy::module_inception)]
mod slot;
mod viewport;

pub use recycler::{RecycleStats, SlotPool};
pub use slot::{Slot, SlotId, WindowItem};
pub use viewport::{SlotPosition, Viewport};
