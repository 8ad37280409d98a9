//! Sync module: Optimistic writes and real-time events over the buffers.
//!
//! This module contains:
//! - [`LiveSync`]: Applies local writes optimistically and routes remote events
//! - [`RowService`]: The server requests the adapter depends on
//! - [`UpdateQueue`]: Per-row debouncing of field updates
//! - [`FlushTicker`]: Background thread that paces flushing
//! - Messages: Events, fetch tickets, and write tokens

mod adapter;
mod debounce;
mod error;
mod messages;
mod service;
mod ticker;

pub use adapter::{LiveSync, PumpReport, SyncConfig};
pub use debounce::{CancelToken, Completion, ReadyUpdate, TaskState, UpdateQueue};
pub use error::{ServiceError, SyncError, WriteOp};
pub use messages::{ClientToken, FetchTicket, RowDraft, RowEvent, WindowPage, WindowRange};
pub use service::RowService;
pub use ticker::{FlushTick, FlushTicker};
