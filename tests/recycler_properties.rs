//! Property tests: slot recycling across arbitrary scroll sequences.

use proptest::prelude::*;
use rowstack::{Order, Row, RowId, SlotId, SlotPool};
use std::collections::{HashMap, HashSet};

const SLOTS: usize = 12;

fn rows(n: u64) -> Vec<Row> {
    (0..n).map(|i| Row::new(RowId(i), Order::from_integer(i))).collect()
}

fn window(rows: &[Row], start: usize, len: usize) -> Vec<Option<&Row>> {
    rows[start..start + len].iter().map(Some).collect()
}

fn assignment(pool: &SlotPool<&Row, usize>) -> HashMap<RowId, SlotId> {
    pool.iter()
        .filter_map(|slot| slot.row_id().map(|id| (id, slot.id())))
        .collect()
}

proptest! {
    #[test]
    fn visible_rows_keep_their_slots(
        starts in prop::collection::vec((0usize..200, 0usize..=SLOTS), 1..30),
    ) {
        let rows = rows(220);
        let mut pool: SlotPool<&Row, usize> = SlotPool::new();

        for (start, len) in starts {
            let previous = assignment(&pool);
            let current = window(&rows, start, len);
            pool.recycle(&current, SLOTS, |_, i| start + i);

            prop_assert_eq!(pool.len(), SLOTS);

            let now = assignment(&pool);
            let wanted: HashSet<RowId> = current.iter().flatten().map(|r| r.id).collect();
            prop_assert_eq!(now.keys().copied().collect::<HashSet<_>>(), wanted);

            for (id, slot) in &now {
                if let Some(before) = previous.get(id) {
                    prop_assert_eq!(before, slot, "row {} changed slot", id);
                }
            }

            // Every slot sits at its item's index; placeholders take the rest.
            let mut positions: Vec<usize> = pool.iter().map(|slot| *slot.position()).collect();
            for slot in pool.iter() {
                if let Some(row) = slot.item() {
                    prop_assert_eq!(*slot.position(), row.id.0 as usize);
                }
            }
            positions.sort_unstable();
            let expected: Vec<usize> = (start..start + SLOTS).collect();
            prop_assert_eq!(positions, expected);
        }
    }

    #[test]
    fn full_windows_reassign_only_entering_rows(
        starts in prop::collection::vec(0usize..200, 1..30),
    ) {
        let rows = rows(220);
        let mut pool: SlotPool<&Row, usize> = SlotPool::new();
        let mut previous: HashSet<RowId> = HashSet::new();

        for start in starts {
            let current = window(&rows, start, SLOTS);
            let stats = pool.recycle(&current, SLOTS, |_, i| i);

            let ids: HashSet<RowId> = current.iter().flatten().map(|r| r.id).collect();
            let entering = ids.difference(&previous).count();
            prop_assert_eq!(stats.kept, SLOTS - entering);
            prop_assert_eq!(stats.reassigned, entering);
            previous = ids;
        }
    }

    #[test]
    fn order_only_moves_slots(
        first in 0usize..100,
        second in 0usize..100,
        len in 0usize..=SLOTS,
    ) {
        let rows = rows(120);
        let mut pool: SlotPool<&Row, usize> = SlotPool::new();
        pool.recycle(&window(&rows, first, SLOTS), SLOTS, |_, i| first + i);
        let current = window(&rows, second, len);
        pool.recycle(&current, SLOTS, |_, i| second + i);

        let mut before: Vec<(SlotId, Option<RowId>, usize)> = pool
            .iter()
            .map(|s| (s.id(), s.row_id(), *s.position()))
            .collect();
        pool.order(&current);
        let mut after: Vec<(SlotId, Option<RowId>, usize)> = pool
            .iter()
            .map(|s| (s.id(), s.row_id(), *s.position()))
            .collect();

        for (k, item) in current.iter().enumerate() {
            prop_assert_eq!(pool.slots()[k].row_id(), item.map(|r| r.id));
        }
        before.sort_unstable();
        after.sort_unstable();
        prop_assert_eq!(before, after);
    }
}
