//! Message types exchanged with the network layer.
//!
//! These types define the protocol between the live sync adapter, the row
//! service it calls, and the real-time event stream it listens to.

use crate::buffer::GroupKey;
use crate::row::{Fields, Order, Row};
use std::fmt;
use uuid::Uuid;

/// Client-generated token attached to outgoing writes.
///
/// The server echoes it on the real-time event caused by the write, which
/// lets the adapter drop echoes of changes it already applied.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientToken(Uuid);

impl ClientToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing uuid.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying uuid.
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientToken({})", self.0)
    }
}

impl fmt::Display for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Events from the real-time stream.
///
/// These arrive from other users' edits, or as echoes of our own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowEvent {
    /// A row was created.
    Created {
        /// The new row.
        row: Row,
        /// Token of the write that caused it, if any.
        token: Option<ClientToken>,
    },

    /// A row was updated.
    Updated {
        /// The row after the update.
        row: Row,
        /// The row before the update, when the server sends it.
        previous: Option<Row>,
        /// Token of the write that caused it, if any.
        token: Option<ClientToken>,
    },

    /// A row was deleted.
    Deleted {
        /// The deleted row.
        row: Row,
        /// Token of the write that caused it, if any.
        token: Option<ClientToken>,
    },
}

impl RowEvent {
    /// Token of the write that caused this event.
    pub const fn token(&self) -> Option<ClientToken> {
        match self {
            Self::Created { token, .. }
            | Self::Updated { token, .. }
            | Self::Deleted { token, .. } => *token,
        }
    }

    /// The row the event is about.
    pub const fn row(&self) -> &Row {
        match self {
            Self::Created { row, .. } | Self::Updated { row, .. } | Self::Deleted { row, .. } => {
                row
            }
        }
    }
}

/// Values of a row to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDraft {
    /// Where the row goes.
    pub order: Order,
    /// Initial field values.
    pub fields: Fields,
}

/// Slice of a group to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRange {
    /// Index of the first row within the group.
    pub offset: usize,
    /// Maximum number of rows.
    pub limit: usize,
}

impl WindowRange {
    /// The first `limit` rows of a group.
    pub const fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }
}

/// A fetched window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPage {
    /// Total rows in the group.
    pub count: usize,
    /// Rows in the requested slice, in order.
    pub items: Vec<Row>,
}

/// Handle for a fetch that is in flight.
///
/// Only the most recently started fetch of a group may apply its page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    /// Group being fetched.
    pub key: GroupKey,
    /// Requested slice.
    pub range: WindowRange,
    /// Fetch generation of the group when the fetch started.
    pub epoch: u64,
}
