//! Buffer module: Per-group row windows and the registry that routes to them.
//!
//! This module contains:
//! - [`GroupBuffer`]: Ordered window of one group's rows plus its total count
//! - [`BufferRegistry`]: Group key → buffer map with mutation routing
//! - [`GroupKey`] and [`GroupKeyPolicy`]: How rows are bucketed into groups

mod group;
mod key;
mod registry;

pub use group::{GroupBuffer, InsertOutcome, RepositionOutcome};
pub use key::{DayBucketKey, FieldValueKey, GroupKey, GroupKeyPolicy, SingleGroup};
pub use registry::{BufferRegistry, MoveOutcome, Mutation, RegistrySnapshot};
