//! # Rowstack
//!
//! Windowed row buffers for virtualized, grouped table views.
//!
//! A grouped view (a kanban board, a calendar, a grouped grid) shows a few
//! rows of each group and scrolls through the rest on demand. Rowstack keeps
//! the loaded part of every group, the group's total count, and the slots
//! that render them consistent while rows are created, edited, moved, and
//! deleted, locally or by other users.
//!
//! ## Core Concepts
//!
//! - **Group buffers**: An ordered window of each group plus its server count
//! - **Registry**: Routes mutations to the right group, moving rows between groups
//! - **Slot recycling**: Stable rendering slots across scroll passes
//! - **Live sync**: Optimistic writes, debounced updates, and echo suppression
//!
//! ## Example
//!
//! ```rust
//! use rowstack::{BufferRegistry, FieldId, FieldValue, FieldValueKey, GroupKey, Order, Row, RowId};
//!
//! const STATUS: FieldId = FieldId(1);
//!
//! let mut registry = BufferRegistry::new(FieldValueKey(STATUS));
//! let todo = GroupKey::Option(1);
//! let rows: Vec<Row> = (1..=3)
//!     .map(|i| {
//!         Row::new(RowId(i), Order::from_integer(i))
//!             .with_field(STATUS, FieldValue::SelectOption(1))
//!     })
//!     .collect();
//! registry.reset_window(&todo, rows, 10);
//!
//! let created = Row::new(RowId(9), "1.5".parse().unwrap())
//!     .with_field(STATUS, FieldValue::SelectOption(1));
//! registry.insert_created(created);
//!
//! let buffer = registry.get_buffer(&todo).unwrap();
//! assert_eq!(buffer.count(), 11);
//! assert_eq!(buffer.position_of(RowId(9)), Some(1));
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod buffer;
pub mod row;
pub mod slot;
pub mod sync;

// Re-exports for convenience
pub use buffer::{
    BufferRegistry, DayBucketKey, FieldValueKey, GroupBuffer, GroupKey, GroupKeyPolicy,
    InsertOutcome, MoveOutcome, Mutation, RepositionOutcome, SingleGroup,
};
pub use row::{FieldId, FieldValue, Fields, Order, OrderError, Row, RowFlags, RowId, RowPatch};
pub use slot::{RecycleStats, Slot, SlotId, SlotPool, SlotPosition, Viewport, WindowItem};
pub use sync::{
    ClientToken, FlushTicker, LiveSync, RowDraft, RowEvent, RowService, ServiceError,
    SyncConfig, SyncError, WindowPage, WindowRange,
};
