//! Group keys and the policies that derive them from rows.

use crate::row::{FieldId, FieldValue, Row};
use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use std::fmt;

/// The key of a group ("stack") of rows.
///
/// Keys compare by normalized value. `Ungrouped` is a valid key of its own
/// and sorts before every other key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub enum GroupKey {
    /// Rows with no grouping value.
    #[default]
    Ungrouped,
    /// A single-select option id.
    Option(u64),
    /// A whole-number value.
    Integer(i64),
    /// A boolean value.
    Bool(bool),
    /// A trimmed, non-empty text value.
    Text(String),
    /// A calendar day.
    Day(NaiveDate),
}

impl GroupKey {
    /// Normalize a field value into a key.
    ///
    /// `Null` and blank text both mean "ungrouped". Timestamps are bucketed
    /// by their UTC calendar day; use [`DayBucketKey`] for other zones.
    pub fn from_value(value: &FieldValue) -> Self {
        match value {
            FieldValue::Null => Self::Ungrouped,
            FieldValue::Bool(b) => Self::Bool(*b),
            FieldValue::Integer(i) => Self::Integer(*i),
            FieldValue::SelectOption(id) => Self::Option(*id),
            FieldValue::DateTime(dt) => Self::Day(dt.date_naive()),
            FieldValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Self::Ungrouped
                } else {
                    Self::Text(trimmed.to_string())
                }
            }
        }
    }

    /// Whether this is the ungrouped key.
    #[inline]
    pub const fn is_ungrouped(&self) -> bool {
        matches!(self, Self::Ungrouped)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ungrouped => f.write_str("<ungrouped>"),
            Self::Option(id) => write!(f, "option:{id}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
            Self::Day(d) => write!(f, "{d}"),
        }
    }
}

/// Derives the group key of a row.
///
/// One policy exists per view type: group by a single-select value, by a
/// calendar day, or a single implicit group for ungrouped views.
pub trait GroupKeyPolicy: Send + Sync {
    /// Compute the group key of a row.
    fn extract(&self, row: &Row) -> GroupKey;
}

impl<F> GroupKeyPolicy for F
where
    F: Fn(&Row) -> GroupKey + Send + Sync,
{
    fn extract(&self, row: &Row) -> GroupKey {
        self(row)
    }
}

/// Groups rows by the normalized value of one field.
#[derive(Clone, Copy, Debug)]
pub struct FieldValueKey(pub FieldId);

impl GroupKeyPolicy for FieldValueKey {
    fn extract(&self, row: &Row) -> GroupKey {
        GroupKey::from_value(row.field(self.0))
    }
}

/// Groups rows by the calendar day of a date field in a fixed timezone.
#[derive(Clone, Copy, Debug)]
pub struct DayBucketKey {
    /// The date field.
    pub field: FieldId,
    /// Timezone the days are cut in.
    pub offset: FixedOffset,
}

impl DayBucketKey {
    /// Bucket by UTC days.
    pub fn utc(field: FieldId) -> Self {
        Self {
            field,
            offset: Utc.fix(),
        }
    }
}

impl GroupKeyPolicy for DayBucketKey {
    fn extract(&self, row: &Row) -> GroupKey {
        row.date_time(self.field).map_or(GroupKey::Ungrouped, |dt| {
            GroupKey::Day(dt.with_timezone(&self.offset).date_naive())
        })
    }
}

/// Puts every row in the ungrouped key (grid and gallery views).
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleGroup;

impl GroupKeyPolicy for SingleGroup {
    fn extract(&self, _row: &Row) -> GroupKey {
        GroupKey::Ungrouped
    }
}
