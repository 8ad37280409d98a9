//! Row module: Rows and the ordering utilities shared by buffers and slots.
//!
//! This module contains:
//! - [`Row`]: A table row with typed field values and transient flags
//! - [`Order`]: Decimal sort key compared numerically
//! - [`RowPatch`]: A partial update (the new values of an edit)
//! - [`RowFlags`]: Local metadata that must survive buffer moves

mod order;
#[allow(clippy::module_inception)]
mod row;

pub use order::{Order, OrderError};
pub use row::{FieldId, FieldValue, Fields, Row, RowFlags, RowId, RowPatch};
