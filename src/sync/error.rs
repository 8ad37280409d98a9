//! Errors surfaced by the live sync adapter.
//!
//! Buffers and slots never fail; every error here comes from talking to the
//! row service or from a fetch that lost a race.

use crate::buffer::GroupKey;
use crate::row::RowId;
use std::fmt;
use thiserror::Error;

/// Error reported by a [`RowService`](super::RowService).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The request could not be completed.
    #[error("request failed: {0}")]
    Request(String),

    /// The row does not exist on the server.
    #[error("row {0} does not exist")]
    RowNotFound(RowId),

    /// The server refused the change.
    #[error("rejected: {reason}")]
    Rejected {
        /// Why the change was refused.
        reason: String,
    },
}

/// Kind of optimistic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    /// Row creation.
    Create,
    /// Field or order update.
    Update,
    /// Row deletion.
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Error type for live sync operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A newer fetch for the group started (or the group was dropped)
    /// after this one; its page was discarded.
    #[error("stale window for group {key}: fetch {requested} superseded by {current}")]
    StaleWindow {
        /// Group of the fetch.
        key: GroupKey,
        /// Generation of the discarded fetch.
        requested: u64,
        /// Generation that is current now (0 if the group is gone).
        current: u64,
    },

    /// Fetching a window failed.
    #[error("fetching group {key} failed: {source}")]
    FetchFailed {
        /// Group of the fetch.
        key: GroupKey,
        /// Underlying service error.
        #[source]
        source: ServiceError,
    },

    /// An optimistic write failed and was rolled back.
    #[error("{op} of row {row} failed and was reverted: {source}")]
    WriteFailed {
        /// The write.
        op: WriteOp,
        /// The row written.
        row: RowId,
        /// Underlying service error.
        #[source]
        source: ServiceError,
    },

    /// The row is not in any buffer, so it cannot be edited locally.
    #[error("row {0} is not buffered")]
    RowNotBuffered(RowId),
}
