//! Property tests: live sync keeps windows consistent with the server.
//!
//! The service is an in-memory server. Local writes go through `LiveSync`
//! (some of them rejected), other clients' writes arrive as events with or
//! without previous values, and after every settled step each loaded window
//! must be a sorted prefix of its group carrying the group's exact count.

use proptest::prelude::*;
use rowstack::{
    BufferRegistry, ClientToken, FieldId, FieldValue, FieldValueKey, GroupKey, GroupKeyPolicy,
    LiveSync, Order, Row, RowDraft, RowEvent, RowId, RowPatch, RowService, ServiceError,
    SyncConfig, WindowPage, WindowRange,
};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const STATUS: FieldId = FieldId(1);
const GROUPS: [u64; 2] = [1, 2];
const DEBOUNCE: Duration = Duration::from_millis(10);

/// Distinct seeds map to distinct orders with one decimal place.
fn order(seed: u32) -> Order {
    format!("{}.{}", seed / 10, seed % 10).parse().unwrap()
}

fn status(value: u64) -> FieldValue {
    FieldValue::SelectOption(value)
}

/// Every row of the board, as the server sees it.
#[derive(Default)]
struct Server {
    rows: BTreeMap<RowId, Row>,
    next_id: u64,
    fail_writes: bool,
}

impl Server {
    fn group(&self, key: &GroupKey) -> Vec<&Row> {
        let policy = FieldValueKey(STATUS);
        let mut rows: Vec<&Row> = self
            .rows
            .values()
            .filter(|r| policy.extract(r) == *key)
            .collect();
        rows.sort_by(|a, b| a.order.cmp(&b.order));
        rows
    }

    fn order_taken(&self, seed: u32) -> bool {
        let order = order(seed);
        self.rows.values().any(|r| r.order == order)
    }

    fn pick(&self, pick: usize) -> Option<Row> {
        if self.rows.is_empty() {
            return None;
        }
        self.rows.values().nth(pick % self.rows.len()).cloned()
    }

    fn insert(&mut self, seed: u32, value: u64) -> Row {
        let row = Row::new(RowId(self.next_id), order(seed)).with_field(STATUS, status(value));
        self.next_id += 1;
        self.rows.insert(row.id, row.clone());
        row
    }

    fn check_write(&self) -> Result<(), ServiceError> {
        if self.fail_writes {
            Err(ServiceError::Request("rejected".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RowService for Server {
    fn fetch_window(&mut self, key: &GroupKey, range: WindowRange) -> Result<WindowPage, ServiceError> {
        let group = self.group(key);
        Ok(WindowPage {
            count: group.len(),
            items: group
                .into_iter()
                .skip(range.offset)
                .take(range.limit)
                .cloned()
                .collect(),
        })
    }

    fn create_row(&mut self, draft: &RowDraft, _: ClientToken) -> Result<Row, ServiceError> {
        self.check_write()?;
        let mut row = Row::new(RowId(self.next_id), draft.order.clone());
        row.fields = draft.fields.clone();
        self.next_id += 1;
        self.rows.insert(row.id, row.clone());
        Ok(row)
    }

    fn update_row(&mut self, id: RowId, patch: &RowPatch, _: ClientToken) -> Result<Row, ServiceError> {
        self.check_write()?;
        let current = self.rows.get(&id).ok_or(ServiceError::RowNotFound(id))?;
        let updated = patch.apply_to(current);
        self.rows.insert(id, updated.clone());
        Ok(updated)
    }

    fn delete_row(&mut self, id: RowId, _: ClientToken) -> Result<(), ServiceError> {
        self.check_write()?;
        self.rows.remove(&id).map(|_| ()).ok_or(ServiceError::RowNotFound(id))
    }
}

#[derive(Debug, Clone)]
enum Op {
    Create { seed: u32, status: u64, fail: bool },
    Update { pick: usize, seed: u32, status: u64, fail: bool },
    Delete { pick: usize, fail: bool },
    RemoteCreate { seed: u32, status: u64 },
    RemoteUpdate { pick: usize, seed: u32, status: u64, with_previous: bool },
    RemoteDelete { pick: usize },
    FetchMore { status: u64, limit: usize },
}

fn op() -> impl Strategy<Value = Op> {
    let fail = prop::bool::weighted(0.25);
    prop_oneof![
        (0u32..3000, 1u64..=2, fail.clone())
            .prop_map(|(seed, status, fail)| Op::Create { seed, status, fail }),
        (any::<usize>(), 0u32..3000, 1u64..=2, fail.clone())
            .prop_map(|(pick, seed, status, fail)| Op::Update { pick, seed, status, fail }),
        (any::<usize>(), fail).prop_map(|(pick, fail)| Op::Delete { pick, fail }),
        (0u32..3000, 1u64..=2).prop_map(|(seed, status)| Op::RemoteCreate { seed, status }),
        (any::<usize>(), 0u32..3000, 1u64..=2, any::<bool>()).prop_map(
            |(pick, seed, status, with_previous)| Op::RemoteUpdate {
                pick,
                seed,
                status,
                with_previous,
            }
        ),
        any::<usize>().prop_map(|pick| Op::RemoteDelete { pick }),
        (1u64..=2, 0usize..5).prop_map(|(status, limit)| Op::FetchMore { status, limit }),
    ]
}

fn buffered(sync: &LiveSync<Server>, pick: usize) -> Option<RowId> {
    let ids: Vec<RowId> = sync
        .registry()
        .iter()
        .flat_map(|b| b.items().iter().map(|r| r.id))
        .collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids[pick % ids.len()])
    }
}

fn check(sync: &LiveSync<Server>) -> Result<(), TestCaseError> {
    prop_assert_eq!(sync.stale_groups().count(), 0);
    for value in GROUPS {
        let key = GroupKey::Option(value);
        let expected = sync.service().group(&key);
        let Some(buffer) = sync.registry().get_buffer(&key) else {
            continue;
        };
        prop_assert!(buffer.is_loaded());
        prop_assert_eq!(buffer.count(), expected.len(), "count of {}", key);
        prop_assert!(buffer.len() <= buffer.count());
        prop_assert!(buffer.items().windows(2).all(|w| w[0].order < w[1].order));
        prop_assert!(buffer.items().iter().all(|r| r.flags.is_empty()));

        let ids: Vec<RowId> = buffer.items().iter().map(|r| r.id).collect();
        let prefix: Vec<RowId> = expected.iter().take(ids.len()).map(|r| r.id).collect();
        prop_assert_eq!(ids, prefix, "window of {}", key);
    }
    Ok(())
}

proptest! {
    #[test]
    fn live_sync_windows_stay_sorted_prefixes(
        seeds in prop::collection::btree_set(0u32..3000, 0..30),
        windows in (0usize..20, 0usize..20),
        ops in prop::collection::vec(op(), 0..60),
    ) {
        let mut server = Server { next_id: 1, ..Server::default() };
        for (i, seed) in seeds.into_iter().enumerate() {
            server.insert(seed, GROUPS[i % 2]);
        }
        server.next_id = 1000;

        let config = SyncConfig { debounce: DEBOUNCE, ..SyncConfig::default() };
        let mut sync = LiveSync::with_config(BufferRegistry::new(FieldValueKey(STATUS)), server, config);
        for (value, limit) in GROUPS.into_iter().zip([windows.0, windows.1]) {
            sync.fetch_window(GroupKey::Option(value), WindowRange::first(limit)).unwrap();
        }
        check(&sync)?;

        let events = sync.event_sender();
        let mut now = Instant::now();
        for op in ops {
            now += DEBOUNCE * 2;
            match op {
                Op::Create { seed, status: value, fail } => {
                    if sync.service().order_taken(seed) {
                        continue;
                    }
                    sync.service_mut().fail_writes = fail;
                    let draft = RowDraft {
                        order: order(seed),
                        fields: BTreeMap::from([(STATUS, status(value))]),
                    };
                    prop_assert_eq!(sync.create_row(draft).is_err(), fail);
                }
                Op::Update { pick, seed, status: value, fail } => {
                    let Some(id) = buffered(&sync, pick) else {
                        continue;
                    };
                    if sync.service().order_taken(seed) {
                        continue;
                    }
                    let patch = RowPatch::new()
                        .with_order(order(seed))
                        .with_field(STATUS, status(value));
                    sync.update_row(id, patch, now).unwrap();
                    sync.service_mut().fail_writes = fail;
                    let report = sync.pump(now + DEBOUNCE);
                    prop_assert_eq!(report.updates_sent, 1);
                    prop_assert_eq!(report.errors.len(), usize::from(fail));
                }
                Op::Delete { pick, fail } => {
                    let Some(id) = buffered(&sync, pick) else {
                        continue;
                    };
                    sync.service_mut().fail_writes = fail;
                    prop_assert_eq!(sync.delete_row(id).is_err(), fail);
                }
                Op::RemoteCreate { seed, status: value } => {
                    if sync.service().order_taken(seed) {
                        continue;
                    }
                    let row = sync.service_mut().insert(seed, value);
                    events.send(RowEvent::Created { row, token: None }).unwrap();
                    let report = sync.pump(now);
                    prop_assert_eq!(report.events_applied, 1);
                }
                Op::RemoteUpdate { pick, seed, status: value, with_previous } => {
                    let Some(old) = sync.service().pick(pick) else {
                        continue;
                    };
                    if sync.service().order_taken(seed) {
                        continue;
                    }
                    let mut row = old.clone();
                    row.order = order(seed);
                    row.fields.insert(STATUS, status(value));
                    sync.service_mut().rows.insert(row.id, row.clone());
                    let previous = with_previous.then_some(old);
                    events.send(RowEvent::Updated { row, previous, token: None }).unwrap();
                    let report = sync.pump(now);
                    prop_assert!(report.errors.is_empty());
                }
                Op::RemoteDelete { pick } => {
                    let Some(row) = sync.service().pick(pick) else {
                        continue;
                    };
                    sync.service_mut().rows.remove(&row.id);
                    events.send(RowEvent::Deleted { row, token: None }).unwrap();
                    sync.pump(now);
                }
                Op::FetchMore { status: value, limit } => {
                    sync.fetch_more(GroupKey::Option(value), limit).unwrap();
                }
            }
            sync.service_mut().fail_writes = false;
            check(&sync)?;
        }
    }
}
