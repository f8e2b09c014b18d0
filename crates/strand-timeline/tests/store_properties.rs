//! Property-based tests for the store's merge laws.

use std::collections::HashSet;

use proptest::prelude::*;
use strand_timeline::{EventRecord, RelationIndex, Timestamp, TimelineStore};

/// Small id space so batches overlap often.
fn record_strategy() -> impl Strategy<Value = EventRecord> {
    (0u8..24, 0u64..600, any::<bool>()).prop_map(|(n, secs, relates)| {
        let id = format!("e{n}");
        if relates && n > 0 {
            EventRecord::reaction(id, "@u", Timestamp::from_secs(secs), format!("e{}", n - 1), "👍")
        } else {
            EventRecord::message(id, "@u", Timestamp::from_secs(secs), "x")
        }
    })
}

fn batch_strategy() -> impl Strategy<Value = Vec<EventRecord>> {
    prop::collection::vec(record_strategy(), 0..12)
}

#[derive(Debug, Clone)]
enum Insert {
    Backward(Vec<EventRecord>),
    Forward(EventRecord),
}

fn insert_strategy() -> impl Strategy<Value = Insert> {
    prop_oneof![
        batch_strategy().prop_map(Insert::Backward),
        record_strategy().prop_map(Insert::Forward),
    ]
}

fn ids(store: &TimelineStore) -> Vec<String> {
    store.snapshot().iter().map(|r| r.id.to_string()).collect()
}

proptest! {
    /// Inserting a backward batch twice equals inserting it once.
    #[test]
    fn prop_backfill_idempotent(prefix in batch_strategy(), batch in batch_strategy()) {
        let mut once = TimelineStore::new();
        let _ = once.insert_backward(prefix.clone());
        let _ = once.insert_backward(batch.clone());

        let mut twice = TimelineStore::new();
        let _ = twice.insert_backward(prefix);
        let _ = twice.insert_backward(batch.clone());
        let _ = twice.insert_backward(batch);

        prop_assert_eq!(ids(&once), ids(&twice));
    }

    /// A newer batch lands in front, keeping its internal order, and only
    /// previously unseen records from it are added.
    #[test]
    fn prop_backfill_prefix_order(b1 in batch_strategy(), b2 in batch_strategy()) {
        let mut store = TimelineStore::new();
        let _ = store.insert_backward(b1);
        let before = ids(&store);

        let _ = store.insert_backward(b2.clone());

        let mut seen: HashSet<String> = before.iter().cloned().collect();
        let mut expected: Vec<String> = Vec::new();
        for record in &b2 {
            if seen.insert(record.id.to_string()) {
                expected.push(record.id.to_string());
            }
        }
        expected.extend(before);

        prop_assert_eq!(ids(&store), expected);
    }

    /// No insert sequence ever stores an id twice, and the relation index
    /// always equals one rebuilt from the store.
    #[test]
    fn prop_dedup_and_relation_index(ops in prop::collection::vec(insert_strategy(), 0..30)) {
        let mut store = TimelineStore::new();

        for op in ops {
            match op {
                Insert::Backward(batch) => { let _ = store.insert_backward(batch); },
                Insert::Forward(record) => { let _ = store.insert_forward(record); },
            }

            let snapshot = store.snapshot();
            let unique: HashSet<_> = snapshot.iter().map(|r| r.id.clone()).collect();
            prop_assert_eq!(unique.len(), snapshot.len());

            let rebuilt = RelationIndex::from_records(snapshot.iter().map(AsRef::as_ref));
            prop_assert_eq!(snapshot.relations(), &rebuilt);
        }
    }
}
