//! Per-row debouncing of field updates.
//!
//! Each row with unsent edits has one task that moves through three states:
//!
//! ```text
//!   schedule          deadline passes         server answers
//! ──────────▶ Pending ──────────────▶ InFlight ─────────────▶ Idle
//!               ▲  │ schedule: merge             │ schedule: queue a
//!               └──┘ patch, restart timer        │ follow-up, sent once
//!                                                ▼ this request is done
//! ```
//!
//! The queue is a pure data structure: callers pass `now` in and send the
//! ready patches themselves.

use super::messages::ClientToken;
use crate::row::{Row, RowId, RowPatch};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared flag that marks a scheduled update as abandoned.
///
/// Clones share the flag, so a sender holding a clone sees the cancel.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the update as abandoned.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether [`cancel`](Self::cancel) was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Externally visible state of a row's update task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Nothing scheduled.
    Idle,
    /// Waiting for the debounce window to pass.
    Pending,
    /// A request is out.
    InFlight,
}

/// A merged patch waiting for its deadline.
#[derive(Debug, Clone)]
struct Scheduled {
    patch: RowPatch,
    deadline: Instant,
    cancel: CancelToken,
}

impl Scheduled {
    fn new(patch: RowPatch, deadline: Instant) -> Self {
        Self {
            patch,
            deadline,
            cancel: CancelToken::new(),
        }
    }

    /// Fold a later patch in and restart the timer.
    fn merged(mut self, patch: RowPatch, deadline: Instant) -> Self {
        self.cancel.cancel();
        self.patch.merge(patch);
        Self::new(self.patch, deadline)
    }
}

#[derive(Debug, Clone)]
enum RowTask {
    Pending {
        /// The row before the first edit of the batch.
        before: Row,
        /// The row with every local edit applied.
        latest: Row,
        scheduled: Scheduled,
    },
    InFlight {
        before: Row,
        latest: Row,
        token: ClientToken,
        cancel: CancelToken,
        /// Edits made while the request was out.
        queued: Option<Scheduled>,
    },
}

impl RowTask {
    fn cancel_all(&self) {
        match self {
            Self::Pending { scheduled, .. } => scheduled.cancel.cancel(),
            Self::InFlight { cancel, queued, .. } => {
                cancel.cancel();
                if let Some(queued) = queued {
                    queued.cancel.cancel();
                }
            }
        }
    }
}

/// An update whose debounce window has passed.
#[derive(Debug, Clone)]
pub struct ReadyUpdate {
    /// Row to update.
    pub row_id: RowId,
    /// Every edit since the last send, merged.
    pub patch: RowPatch,
    /// Token to attach to the request.
    pub token: ClientToken,
    /// Set if the row is deleted before the request goes out.
    pub cancel: CancelToken,
}

/// What the adapter needs after a request finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The row before the edits of the finished batch.
    pub before: Row,
    /// The row with every local edit applied, including queued ones.
    pub latest: Row,
    /// Whether a queued follow-up exists (kept on success, dropped on
    /// failure).
    pub follow_up: bool,
}

/// Debounced update tasks by row.
#[derive(Debug)]
pub struct UpdateQueue {
    tasks: HashMap<RowId, RowTask>,
    debounce: Duration,
}

impl UpdateQueue {
    /// Create a queue with the given debounce window.
    pub fn new(debounce: Duration) -> Self {
        Self {
            tasks: HashMap::new(),
            debounce,
        }
    }

    /// The debounce window.
    #[inline]
    pub const fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Record an edit of a row.
    ///
    /// `before` is the row prior to this edit and `latest` the row with it
    /// applied. Repeated edits merge into one patch and restart the timer.
    /// An edit made while a request is out is queued until that request
    /// finishes.
    pub fn schedule(&mut self, before: &Row, latest: &Row, patch: RowPatch, now: Instant) {
        let deadline = now + self.debounce;
        let task = match self.tasks.remove(&before.id) {
            None => RowTask::Pending {
                before: before.clone(),
                latest: latest.clone(),
                scheduled: Scheduled::new(patch, deadline),
            },
            Some(RowTask::Pending {
                before, scheduled, ..
            }) => RowTask::Pending {
                before,
                latest: latest.clone(),
                scheduled: scheduled.merged(patch, deadline),
            },
            Some(RowTask::InFlight {
                before,
                token,
                cancel,
                queued,
                ..
            }) => RowTask::InFlight {
                before,
                latest: latest.clone(),
                token,
                cancel,
                queued: Some(match queued {
                    Some(queued) => queued.merged(patch, deadline),
                    None => Scheduled::new(patch, deadline),
                }),
            },
        };
        self.tasks.insert(before.id, task);
    }

    /// Take every pending update whose deadline has passed.
    ///
    /// The tasks move to in-flight; the caller must report each back with
    /// [`succeed`](Self::succeed) or [`fail`](Self::fail). Updates come out
    /// in row id order.
    pub fn poll_ready(&mut self, now: Instant) -> Vec<ReadyUpdate> {
        let mut due: Vec<RowId> = self
            .tasks
            .iter()
            .filter_map(|(id, task)| match task {
                RowTask::Pending { scheduled, .. } if scheduled.deadline <= now => Some(*id),
                _ => None,
            })
            .collect();
        due.sort_unstable();

        let mut ready = Vec::with_capacity(due.len());
        for id in due {
            let Some(RowTask::Pending {
                before,
                latest,
                scheduled,
            }) = self.tasks.remove(&id)
            else {
                continue;
            };
            let token = ClientToken::generate();
            ready.push(ReadyUpdate {
                row_id: id,
                patch: scheduled.patch,
                token,
                cancel: scheduled.cancel.clone(),
            });
            self.tasks.insert(
                id,
                RowTask::InFlight {
                    before,
                    latest,
                    token,
                    cancel: scheduled.cancel,
                    queued: None,
                },
            );
        }
        ready
    }

    /// Report a request as accepted.
    ///
    /// `confirmed` is the server's row; a queued follow-up becomes pending
    /// with it as its new baseline. Returns `None` if `token` is not the
    /// request currently out for the row.
    pub fn succeed(&mut self, id: RowId, token: ClientToken, confirmed: &Row) -> Option<Completion> {
        let (before, latest, queued) = self.take_in_flight(id, token)?;
        let follow_up = queued.is_some();
        if let Some(scheduled) = queued {
            self.tasks.insert(
                id,
                RowTask::Pending {
                    before: confirmed.clone().with_flags(before.flags),
                    latest: latest.clone(),
                    scheduled,
                },
            );
        }
        Some(Completion {
            before,
            latest,
            follow_up,
        })
    }

    /// Report a request as failed.
    ///
    /// The task ends and any queued follow-up is dropped. Returns `None` if
    /// `token` is not the request currently out for the row.
    pub fn fail(&mut self, id: RowId, token: ClientToken) -> Option<Completion> {
        let (before, latest, queued) = self.take_in_flight(id, token)?;
        let follow_up = queued.is_some();
        if let Some(queued) = queued {
            queued.cancel.cancel();
        }
        Some(Completion {
            before,
            latest,
            follow_up,
        })
    }

    fn take_in_flight(
        &mut self,
        id: RowId,
        token: ClientToken,
    ) -> Option<(Row, Row, Option<Scheduled>)> {
        match self.tasks.remove(&id)? {
            RowTask::InFlight {
                before,
                latest,
                token: current,
                queued,
                ..
            } if current == token => Some((before, latest, queued)),
            other => {
                self.tasks.insert(id, other);
                None
            }
        }
    }

    /// Abandon a row's task, pending or in flight.
    ///
    /// Returns the row as it was before the abandoned edits, if any.
    pub fn cancel(&mut self, id: RowId) -> Option<Row> {
        let task = self.tasks.remove(&id)?;
        task.cancel_all();
        match task {
            RowTask::Pending { before, .. } | RowTask::InFlight { before, .. } => Some(before),
        }
    }

    /// State of a row's task.
    pub fn state(&self, id: RowId) -> TaskState {
        match self.tasks.get(&id) {
            None => TaskState::Idle,
            Some(RowTask::Pending { .. }) => TaskState::Pending,
            Some(RowTask::InFlight { .. }) => TaskState::InFlight,
        }
    }

    /// The row with every local edit applied, if it has a task.
    pub fn latest(&self, id: RowId) -> Option<&Row> {
        self.tasks.get(&id).map(|task| match task {
            RowTask::Pending { latest, .. } | RowTask::InFlight { latest, .. } => latest,
        })
    }

    /// Earliest deadline among pending tasks.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks
            .values()
            .filter_map(|task| match task {
                RowTask::Pending { scheduled, .. } => Some(scheduled.deadline),
                RowTask::InFlight { .. } => None,
            })
            .min()
    }

    /// Number of rows with a task.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no row has a task.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
