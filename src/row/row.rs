//! Row: A table row as seen by the windowing layer.

use super::order::Order;
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Stable row identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(pub u64);

impl RowId {
    /// First id handed out to rows that the server has not confirmed yet.
    /// Provisional ids count down from here, far away from server ids.
    pub const PROVISIONAL_START: u64 = u64::MAX;

    /// Create a new row ID.
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Whether this id was allocated locally for an unconfirmed create.
    #[inline]
    pub const fn is_provisional(self) -> bool {
        self.0 > u64::MAX / 2
    }
}

impl fmt::Debug for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowId({})", self.0)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a table field (column).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FieldId(pub u32);

/// A typed cell value.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub enum FieldValue {
    /// Empty cell.
    #[default]
    Null,
    /// Boolean (checkbox) value.
    Bool(bool),
    /// Whole number.
    Integer(i64),
    /// Free text.
    Text(String),
    /// Selected option of a single-select field.
    SelectOption(u64),
    /// Timestamp of a date field.
    DateTime(DateTime<Utc>),
}

impl FieldValue {
    /// Whether the value is `Null`.
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Field values of a row, keyed by field.
pub type Fields = BTreeMap<FieldId, FieldValue>;

bitflags! {
    /// Transient UI metadata attached to a buffered row.
    ///
    /// These flags never come from the server; they describe local state
    /// and must survive moves between positions and groups.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
    pub struct RowFlags: u8 {
        /// The row must be persisted even if it no longer matches the view.
        const MUST_PERSIST = 0b0000_0001;
        /// Created locally, waiting for the server to assign an id.
        const PENDING_CREATE = 0b0000_0010;
        /// Has a debounced or in-flight update.
        const PENDING_UPDATE = 0b0000_0100;
    }
}

/// A table row.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Row {
    /// Stable identifier.
    pub id: RowId,
    /// Sort key within the table.
    pub order: Order,
    /// Field values.
    pub fields: Fields,
    /// Local transient metadata.
    pub flags: RowFlags,
}

impl Row {
    /// Create a row without field values.
    pub fn new(id: RowId, order: Order) -> Self {
        Self {
            id,
            order,
            fields: Fields::new(),
            flags: RowFlags::empty(),
        }
    }

    /// Set a field value.
    #[must_use]
    pub fn with_field(mut self, field: FieldId, value: FieldValue) -> Self {
        self.fields.insert(field, value);
        self
    }

    /// Set the transient flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: RowFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Get a field value. Missing fields read as `Null`.
    pub fn field(&self, field: FieldId) -> &FieldValue {
        static NULL: FieldValue = FieldValue::Null;
        self.fields.get(&field).unwrap_or(&NULL)
    }

    /// Get a text field value.
    pub fn text(&self, field: FieldId) -> Option<&str> {
        match self.field(field) {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the selected option of a single-select field.
    pub fn select_option(&self, field: FieldId) -> Option<u64> {
        match self.field(field) {
            FieldValue::SelectOption(id) => Some(*id),
            _ => None,
        }
    }

    /// Get a date field value.
    pub fn date_time(&self, field: FieldId) -> Option<DateTime<Utc>> {
        match self.field(field) {
            FieldValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

/// A partial update to a row.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct RowPatch {
    /// New sort key, if the row moved.
    pub order: Option<Order>,
    /// Changed field values.
    pub fields: Fields,
}

impl RowPatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the new order.
    #[must_use]
    pub fn with_order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    /// Set a field value.
    #[must_use]
    pub fn with_field(mut self, field: FieldId, value: FieldValue) -> Self {
        self.fields.insert(field, value);
        self
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.order.is_none() && self.fields.is_empty()
    }

    /// Fold a later patch into this one. Later values win per field.
    pub fn merge(&mut self, later: Self) {
        if later.order.is_some() {
            self.order = later.order;
        }
        self.fields.extend(later.fields);
    }

    /// Produce the row that results from applying this patch.
    ///
    /// The id and transient flags are carried over unchanged.
    pub fn apply_to(&self, row: &Row) -> Row {
        let mut next = row.clone();
        if let Some(order) = &self.order {
            next.order = order.clone();
        }
        for (field, value) in &self.fields {
            next.fields.insert(*field, value.clone());
        }
        next
    }
}
