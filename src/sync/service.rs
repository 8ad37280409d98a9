//! RowService: The network collaborator the adapter writes through.

use super::error::ServiceError;
use super::messages::{ClientToken, RowDraft, WindowPage, WindowRange};
use crate::buffer::GroupKey;
use crate::row::{Row, RowId, RowPatch};

/// Requests the adapter sends to the server.
///
/// Implementations own transport, authentication, and retries. Write calls
/// carry a [`ClientToken`] that the server must echo on the resulting
/// real-time event.
pub trait RowService {
    /// Fetch a slice of one group.
    fn fetch_window(&mut self, key: &GroupKey, range: WindowRange) -> Result<WindowPage, ServiceError>;

    /// Create a row and return it with its server-assigned id.
    fn create_row(&mut self, draft: &RowDraft, token: ClientToken) -> Result<Row, ServiceError>;

    /// Update a row and return its new state.
    fn update_row(&mut self, id: RowId, patch: &RowPatch, token: ClientToken) -> Result<Row, ServiceError>;

    /// Delete a row.
    fn delete_row(&mut self, id: RowId, token: ClientToken) -> Result<(), ServiceError>;
}
