//! LiveSync: Keeps a buffer registry in step with the server.
//!
//! Local edits are applied to the buffers before the request goes out and
//! rolled back if it fails. Real-time events from other clients are routed
//! into the same buffers, while echoes of our own writes are recognized by
//! their [`ClientToken`] and skipped.

use super::debounce::{TaskState, UpdateQueue};
use super::error::{SyncError, WriteOp};
use super::messages::{ClientToken, FetchTicket, RowDraft, RowEvent, WindowPage, WindowRange};
use super::service::RowService;
use super::ticker::FlushTick;
use crate::buffer::{BufferRegistry, GroupBuffer, GroupKey};
use crate::row::{Row, RowFlags, RowId, RowPatch};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

/// Live sync configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after the last edit of a row before it is sent.
    pub debounce: Duration,
    /// Interval of the flush ticker.
    pub flush_interval: Duration,
    /// Capacity of the event inbox.
    pub event_capacity: usize,
    /// How many of our own write tokens to remember for echo detection.
    pub echo_memory: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            flush_interval: Duration::from_millis(50),
            event_capacity: 256,
            echo_memory: 1024,
        }
    }
}

/// What one [`LiveSync::pump`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Events routed into the buffers.
    pub events_applied: usize,
    /// Echoes of our own writes that were dropped.
    pub echoes_skipped: usize,
    /// Debounced updates sent.
    pub updates_sent: usize,
    /// Windows refetched because an event could not be placed.
    pub windows_refreshed: usize,
    /// Failed updates (reverted) and failed refetches (retried next pump).
    pub errors: Vec<SyncError>,
}

/// Optimistic sync adapter over a [`RowService`].
pub struct LiveSync<S> {
    config: SyncConfig,
    registry: BufferRegistry,
    service: S,
    updates: UpdateQueue,
    /// Tokens of our writes whose echo has not arrived yet.
    own_tokens: HashSet<ClientToken>,
    /// Same tokens in send order, for eviction.
    token_order: VecDeque<ClientToken>,
    event_tx: Sender<RowEvent>,
    event_rx: Receiver<RowEvent>,
    /// Groups whose windows may no longer match the server.
    stale: BTreeSet<GroupKey>,
    next_provisional: u64,
}

impl<S: RowService> LiveSync<S> {
    /// Create an adapter with default configuration.
    pub fn new(registry: BufferRegistry, service: S) -> Self {
        Self::with_config(registry, service, SyncConfig::default())
    }

    /// Create an adapter with custom configuration.
    pub fn with_config(registry: BufferRegistry, service: S, config: SyncConfig) -> Self {
        let (event_tx, event_rx) = bounded(config.event_capacity);
        Self {
            updates: UpdateQueue::new(config.debounce),
            config,
            registry,
            service,
            own_tokens: HashSet::new(),
            token_order: VecDeque::new(),
            event_tx,
            event_rx,
            stale: BTreeSet::new(),
            next_provisional: RowId::PROVISIONAL_START,
        }
    }

    /// Get the configuration.
    #[inline]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The buffers.
    #[inline]
    pub const fn registry(&self) -> &BufferRegistry {
        &self.registry
    }

    /// The buffers, mutably.
    #[inline]
    pub fn registry_mut(&mut self) -> &mut BufferRegistry {
        &mut self.registry
    }

    /// The row service.
    #[inline]
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// The row service, mutably.
    #[inline]
    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    /// A sender for the real-time stream to push events into.
    ///
    /// Events are applied on the next [`pump`](Self::pump).
    pub fn event_sender(&self) -> Sender<RowEvent> {
        self.event_tx.clone()
    }

    /// State of a row's debounced update.
    pub fn update_state(&self, id: RowId) -> TaskState {
        self.updates.state(id)
    }

    /// Groups waiting to be refetched on the next [`pump`](Self::pump).
    pub fn stale_groups(&self) -> impl Iterator<Item = &GroupKey> {
        self.stale.iter()
    }

    /// When the next debounced update becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.updates.next_deadline()
    }

    // ------------------------------------------------------------------
    // Windows
    // ------------------------------------------------------------------

    /// Start fetching a slice of a group.
    ///
    /// Starting a fetch invalidates every earlier fetch of the same group.
    pub fn begin_fetch(&mut self, key: GroupKey, range: WindowRange) -> FetchTicket {
        let epoch = self.registry.begin_fetch(&key);
        FetchTicket { key, range, epoch }
    }

    /// Apply the page of a fetch started with [`begin_fetch`](Self::begin_fetch).
    ///
    /// A page at offset 0 replaces the window; any other offset extends it.
    /// Rows with unsent local edits keep their local values.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::StaleWindow`] if a newer fetch of the group was
    /// started since; the page is discarded.
    pub fn complete_fetch(&mut self, ticket: FetchTicket, page: WindowPage) -> Result<(), SyncError> {
        let current = self
            .registry
            .get_buffer(&ticket.key)
            .map_or(0, GroupBuffer::epoch);
        if current != ticket.epoch {
            tracing::warn!(
                target: "rowstack.sync",
                group = %ticket.key,
                requested = ticket.epoch,
                current,
                "discarding stale window"
            );
            return Err(SyncError::StaleWindow {
                key: ticket.key,
                requested: ticket.epoch,
                current,
            });
        }

        let WindowPage { count, items } = page;
        let local: Vec<Row> = items
            .iter()
            .filter_map(|row| self.updates.latest(row.id).cloned())
            .collect();
        tracing::debug!(
            target: "rowstack.sync",
            group = %ticket.key,
            offset = ticket.range.offset,
            rows = items.len(),
            count,
            "window loaded"
        );
        if ticket.range.offset == 0 {
            self.registry.reset_window(&ticket.key, items, count);
        } else {
            self.registry.extend_window(&ticket.key, items, count);
        }

        for latest in local {
            let id = latest.id;
            if let Some(server) = self.registry.find(id).cloned() {
                self.registry.move_row(&server, latest);
                self.registry.set_flags(id, RowFlags::PENDING_UPDATE, true);
            }
        }
        Ok(())
    }

    /// Fetch a slice of a group and apply it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::FetchFailed`] if the service fails, or
    /// [`SyncError::StaleWindow`] if another fetch overtook this one.
    pub fn fetch_window(&mut self, key: GroupKey, range: WindowRange) -> Result<(), SyncError> {
        let ticket = self.begin_fetch(key, range);
        let page = match self.service.fetch_window(&ticket.key, range) {
            Ok(page) => page,
            Err(source) => {
                tracing::warn!(target: "rowstack.sync", group = %ticket.key, error = %source, "fetch failed");
                return Err(SyncError::FetchFailed {
                    key: ticket.key,
                    source,
                });
            }
        };
        self.complete_fetch(ticket, page)
    }

    /// Fetch the next `limit` rows after a group's window.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_window`](Self::fetch_window).
    pub fn fetch_more(&mut self, key: GroupKey, limit: usize) -> Result<(), SyncError> {
        let offset = self.registry.get_buffer(&key).map_or(0, GroupBuffer::len);
        self.fetch_window(key, WindowRange { offset, limit })
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Create a row.
    ///
    /// A provisional row is buffered first and swapped for the server's row
    /// on success.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::WriteFailed`] if the service fails; the buffers
    /// are restored to their state before the call.
    pub fn create_row(&mut self, draft: RowDraft) -> Result<Row, SyncError> {
        let mut provisional = Row::new(self.allocate_provisional(), draft.order.clone());
        provisional.fields = draft.fields.clone();
        provisional.flags = RowFlags::PENDING_CREATE;

        let snapshot = self.registry.snapshot();
        self.registry.insert_created(provisional.clone());
        let token = self.remember(ClientToken::generate());

        match self.service.create_row(&draft, token) {
            Ok(confirmed) => {
                let id = confirmed.id;
                self.registry.replace_row(&provisional, confirmed.clone());
                tracing::debug!(target: "rowstack.sync", provisional = %provisional.id, row = %id, "create confirmed");
                Ok(self.registry.find(id).cloned().unwrap_or(confirmed))
            }
            Err(source) => {
                self.registry.restore(snapshot);
                tracing::warn!(target: "rowstack.sync", row = %provisional.id, error = %source, "create failed, reverted");
                Err(SyncError::WriteFailed {
                    op: WriteOp::Create,
                    row: provisional.id,
                    source,
                })
            }
        }
    }

    /// Edit a buffered row.
    ///
    /// The edit shows immediately and is sent once the row has been quiet
    /// for the debounce window.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RowNotBuffered`] if the row is in no buffer.
    pub fn update_row(&mut self, id: RowId, patch: RowPatch, now: Instant) -> Result<Row, SyncError> {
        let before = self
            .registry
            .find(id)
            .cloned()
            .ok_or(SyncError::RowNotBuffered(id))?;
        if patch.is_empty() {
            return Ok(before);
        }

        let (latest, outcome) = self.registry.apply_update(&before, &patch);
        self.registry.set_flags(id, RowFlags::PENDING_UPDATE, true);
        self.updates.schedule(&before, &latest, patch, now);
        tracing::debug!(target: "rowstack.sync", row = %id, ?outcome, "update scheduled");
        Ok(latest)
    }

    /// Send every debounced update that is due.
    pub fn flush(&mut self, now: Instant) -> PumpReport {
        let mut report = PumpReport::default();
        for update in self.updates.poll_ready(now) {
            if update.cancel.is_cancelled() {
                continue;
            }
            let (id, token) = (update.row_id, update.token);
            self.remember(token);
            report.updates_sent += 1;

            match self.service.update_row(id, &update.patch, token) {
                Ok(confirmed) => self.confirm_update(id, token, confirmed),
                Err(source) => {
                    self.revert_update(id, token);
                    tracing::warn!(target: "rowstack.sync", row = %id, error = %source, "update failed, reverted");
                    report.errors.push(SyncError::WriteFailed {
                        op: WriteOp::Update,
                        row: id,
                        source,
                    });
                }
            }
        }
        report
    }

    fn confirm_update(&mut self, id: RowId, token: ClientToken, confirmed: Row) {
        let Some(done) = self.updates.succeed(id, token, &confirmed) else {
            return;
        };
        // Newer local edits are still queued; keep showing them.
        if done.follow_up {
            return;
        }
        self.registry.move_row(&done.latest, confirmed);
        self.registry.set_flags(id, RowFlags::PENDING_UPDATE, false);
    }

    fn revert_update(&mut self, id: RowId, token: ClientToken) {
        let Some(done) = self.updates.fail(id, token) else {
            return;
        };
        if done.follow_up {
            tracing::debug!(target: "rowstack.sync", row = %id, "dropping queued follow-up");
        }
        self.registry.move_row(&done.latest, done.before);
        self.registry.set_flags(id, RowFlags::PENDING_UPDATE, false);
    }

    /// Delete a buffered row.
    ///
    /// Unsent edits of the row are abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RowNotBuffered`] if the row is in no buffer, or
    /// [`SyncError::WriteFailed`] if the service fails; the row is then
    /// restored as the server last confirmed it.
    pub fn delete_row(&mut self, id: RowId) -> Result<(), SyncError> {
        let row = self
            .registry
            .find(id)
            .cloned()
            .ok_or(SyncError::RowNotBuffered(id))?;

        let snapshot = self.registry.snapshot();
        let abandoned = self.updates.cancel(id);
        self.registry.remove_deleted(&row);
        let token = self.remember(ClientToken::generate());

        match self.service.delete_row(id, token) {
            Ok(()) => {
                tracing::debug!(target: "rowstack.sync", row = %id, "delete confirmed");
                Ok(())
            }
            Err(source) => {
                self.registry.restore(snapshot);
                if let Some(before) = abandoned {
                    self.registry.move_row(&row, before);
                    self.registry.set_flags(id, RowFlags::PENDING_UPDATE, false);
                }
                tracing::warn!(target: "rowstack.sync", row = %id, error = %source, "delete failed, reverted");
                Err(SyncError::WriteFailed {
                    op: WriteOp::Delete,
                    row: id,
                    source,
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Route one real-time event into the buffers.
    ///
    /// Returns false if the event was an echo of our own write.
    pub fn handle_event(&mut self, event: RowEvent) -> bool {
        if let Some(token) = event.token() {
            if self.own_tokens.remove(&token) {
                tracing::trace!(target: "rowstack.sync", row = %event.row().id, %token, "skipping echo");
                return false;
            }
        }

        match event {
            RowEvent::Created { row, .. } => {
                self.registry.insert_created(row);
            }
            RowEvent::Updated { row, previous, .. } => {
                match previous.or_else(|| self.registry.find(row.id).cloned()) {
                    Some(old) => {
                        self.registry.move_row(&old, row);
                    }
                    None => self.mark_stale(&row),
                }
            }
            RowEvent::Deleted { row, .. } => {
                self.updates.cancel(row.id);
                self.registry.remove_deleted(&row);
            }
        }
        true
    }

    /// The row of an update is buffered nowhere and its previous values are
    /// unknown, so neither the group it left nor its old position can be
    /// resolved. No buffer or count is touched. The group it joined and
    /// every partially loaded group that may have held it are refetched.
    fn mark_stale(&mut self, row: &Row) {
        let joined = self.registry.key_for(row);
        let suspects: Vec<GroupKey> = self
            .registry
            .iter()
            .filter(|b| b.is_loaded() && (*b.key() == joined || !b.is_complete()))
            .map(|b| b.key().clone())
            .collect();
        tracing::debug!(
            target: "rowstack.sync",
            row = %row.id,
            groups = suspects.len(),
            "update of unbuffered row without previous values, refetching"
        );
        self.stale.extend(suspects);
    }

    /// Refetch stale windows at their current size. A complete window asks
    /// for one more row so it can stay complete.
    fn refresh_stale(&mut self, report: &mut PumpReport) {
        for key in std::mem::take(&mut self.stale) {
            let Some(buffer) = self.registry.get_buffer(&key) else {
                continue;
            };
            let limit = buffer.len() + usize::from(buffer.is_complete());
            match self.fetch_window(key.clone(), WindowRange::first(limit)) {
                Ok(()) => report.windows_refreshed += 1,
                Err(err) => {
                    if matches!(err, SyncError::FetchFailed { .. }) {
                        self.stale.insert(key);
                    }
                    report.errors.push(err);
                }
            }
        }
    }

    /// Apply queued events, refetch windows they left stale, then send due
    /// updates.
    pub fn pump(&mut self, now: Instant) -> PumpReport {
        let queued = self.event_rx.len();
        let events: Vec<RowEvent> = self.event_rx.try_iter().take(queued).collect();

        let mut applied = 0;
        let mut skipped = 0;
        for event in events {
            if self.handle_event(event) {
                applied += 1;
            } else {
                skipped += 1;
            }
        }

        let mut report = PumpReport {
            events_applied: applied,
            echoes_skipped: skipped,
            ..PumpReport::default()
        };
        self.refresh_stale(&mut report);

        let flushed = self.flush(now);
        report.updates_sent = flushed.updates_sent;
        report.errors.extend(flushed.errors);
        report
    }

    /// Pump on every tick until `on_pump` breaks or the ticks stop.
    pub fn drive(
        &mut self,
        ticks: &Receiver<FlushTick>,
        mut on_pump: impl FnMut(&Self, PumpReport) -> ControlFlow<()>,
    ) {
        for tick in ticks {
            let report = self.pump(tick.at);
            if on_pump(self, report).is_break() {
                break;
            }
        }
    }

    fn remember(&mut self, token: ClientToken) -> ClientToken {
        if self.token_order.len() >= self.config.echo_memory.max(1) {
            if let Some(oldest) = self.token_order.pop_front() {
                self.own_tokens.remove(&oldest);
            }
        }
        self.token_order.push_back(token);
        self.own_tokens.insert(token);
        token
    }

    fn allocate_provisional(&mut self) -> RowId {
        let id = RowId(self.next_provisional);
        self.next_provisional = self.next_provisional.wrapping_sub(1);
        id
    }
}
