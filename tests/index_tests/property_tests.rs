//! Property tests
//!
//! Random batches of sets and deletes, each committed or rolled back, are
//! checked against a `BTreeMap` model:
//! - the keyspace equals the model
//! - every index holds exactly the matching items, in collation order
//! - the spatial index answers like a brute-force scan
//! - a reopened engine replays to the same state

use std::cmp::Ordering;
use std::collections::BTreeMap;

use atlasdb::collate::{index_int, index_string};
use atlasdb::config::{Config, SyncPolicy};
use atlasdb::rect::index_rect;
use atlasdb::{AtlasError, Engine, Iter, Less, Rect};
use proptest::prelude::*;
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum Op {
    Set(String, String),
    Delete(String),
}

#[derive(Debug, Clone)]
struct Batch {
    ops: Vec<Op>,
    commit: bool,
}

type Model = BTreeMap<String, String>;

// =============================================================================
// Strategies
// =============================================================================

fn key_strategy() -> impl Strategy<Value = String> {
    (prop_oneof![Just("user"), Just("num"), Just("rect"), Just("misc")], 0u8..12)
        .prop_map(|(prefix, id)| format!("{prefix}:{id}"))
}

fn value_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z]{0,6}",
        (-50i32..50).prop_map(|n| n.to_string()),
        (0u8..40, 0u8..40, 0u8..6).prop_map(|(x, y, s)| format!("[{x} {y}],[{} {}]", x + s, y + s)),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (key_strategy(), value_strategy()).prop_map(|(k, v)| Op::Set(k, v)),
        1 => key_strategy().prop_map(Op::Delete),
    ]
}

fn batch_strategy() -> impl Strategy<Value = Batch> {
    (prop::collection::vec(op_strategy(), 1..12), prop::bool::weighted(0.7))
        .prop_map(|(ops, commit)| Batch { ops, commit })
}

// =============================================================================
// Helper Functions
// =============================================================================

fn declare_indexes(engine: &Engine) {
    engine
        .create_index("users", "user:*", &[Less::new(index_string)])
        .unwrap();
    engine.create_index("nums", "num:*", &[Less::new(index_int)]).unwrap();
    engine.create_index("all", "*", &[]).unwrap();
    engine.create_spatial_index("rects", "rect:*", index_rect).unwrap();
}

/// Apply a batch to the engine; the model only changes if it commits
fn apply(engine: &Engine, model: &mut Model, batch: &Batch) {
    let mut tx = engine.begin(true).unwrap();
    let mut staged = model.clone();
    for op in &batch.ops {
        match op {
            Op::Set(key, value) => {
                let previous = tx.set(key, value).unwrap();
                assert_eq!(previous, staged.insert(key.clone(), value.clone()));
            }
            Op::Delete(key) => match (tx.delete(key), staged.remove(key)) {
                (Ok(value), Some(expected)) => assert_eq!(value, expected),
                (Err(AtlasError::NotFound), None) => {}
                (got, expected) => panic!("delete {key}: got {got:?}, expected {expected:?}"),
            },
        }
    }

    if batch.commit {
        tx.commit().unwrap();
        *model = staged;
    } else {
        tx.rollback();
    }
}

fn expected_index(model: &Model, prefix: &str, compare: impl Fn(&str, &str) -> Ordering) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = model
        .iter()
        .filter(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    entries.sort_by(|(ka, va), (kb, vb)| compare(va, vb).then_with(|| ka.cmp(kb)));
    entries
}

fn ordering_of(less: fn(&str, &str) -> bool) -> impl Fn(&str, &str) -> Ordering {
    move |a: &str, b: &str| {
        if less(a, b) {
            Ordering::Less
        } else if less(b, a) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}

fn collect(it: Iter<'_>) -> Vec<(String, String)> {
    it.map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn check(engine: &Engine, model: &Model) {
    engine
        .view(|tx| {
            // Keyspace
            let all: Vec<(String, String)> = model.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            assert_eq!(collect(tx.ascend("")?), all);
            assert_eq!(tx.len()?, model.len());

            // Ordered indexes
            assert_eq!(
                collect(tx.ascend("users")?),
                expected_index(model, "user:", ordering_of(index_string))
            );
            assert_eq!(
                collect(tx.ascend("nums")?),
                expected_index(model, "num:", ordering_of(index_int))
            );
            assert_eq!(collect(tx.ascend("all")?), expected_index(model, "", |a: &str, b: &str| a.cmp(b)));

            let mut reversed = collect(tx.descend("nums")?);
            reversed.reverse();
            assert_eq!(reversed, collect(tx.ascend("nums")?));

            // Spatial index
            let query = Rect::parse("[10 10],[25 25]")?;
            let mut found: Vec<String> = tx.intersects("rects", "[10 10],[25 25]")?.map(|(k, _)| k.to_string()).collect();
            found.sort();
            let expected: Vec<String> = model
                .iter()
                .filter(|(k, _)| k.starts_with("rect:"))
                .filter(|(_, v)| index_rect(v).is_some_and(|r| r.intersects(&query)))
                .map(|(k, _)| k.clone())
                .collect();
            assert_eq!(found, expected);

            Ok::<_, AtlasError>(())
        })
        .unwrap();
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn indexes_match_model_after_random_batches(
        batches in prop::collection::vec(batch_strategy(), 1..20),
    ) {
        let engine = Engine::memory().unwrap();
        declare_indexes(&engine);
        let mut model = Model::new();

        for batch in &batches {
            apply(&engine, &mut model, batch);
            check(&engine, &model);
        }
    }

    #[test]
    fn indexes_declared_late_match_model(
        batches in prop::collection::vec(batch_strategy(), 1..10),
    ) {
        let engine = Engine::memory().unwrap();
        let mut model = Model::new();
        for batch in &batches {
            apply(&engine, &mut model, batch);
        }

        declare_indexes(&engine);
        check(&engine, &model);
    }

    #[test]
    fn ascend_range_is_exactly_half_open(
        values in prop::collection::vec(-30i32..30, 0..40),
        lo in -35i32..35,
        hi in -35i32..35,
    ) {
        let engine = Engine::memory().unwrap();
        engine.create_index("nums", "num:*", &[Less::new(index_int)]).unwrap();
        engine
            .update(|tx| {
                for (i, v) in values.iter().enumerate() {
                    tx.set(&format!("num:{i:02}"), &v.to_string())?;
                }
                Ok::<_, AtlasError>(())
            })
            .unwrap();

        let found: Vec<i32> = engine
            .view(|tx| {
                Ok::<_, AtlasError>(
                    tx.ascend_range("nums", &lo.to_string(), &hi.to_string())?
                        .map(|(_, v)| v.parse::<i32>().unwrap_or_default())
                        .collect(),
                )
            })
            .unwrap();

        let mut expected: Vec<i32> = values.iter().copied().filter(|v| lo <= *v && *v < hi).collect();
        expected.sort();
        prop_assert_eq!(found, expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn reopen_replays_to_model(
        batches in prop::collection::vec(batch_strategy(), 1..10),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::builder()
            .path(temp_dir.path().join("test.db"))
            .sync_policy(SyncPolicy::Never)
            .build();

        let mut model = Model::new();
        {
            let engine = Engine::open(config.clone()).unwrap();
            for batch in &batches {
                apply(&engine, &mut model, batch);
            }
            engine.close().unwrap();
        }

        let engine = Engine::open(config).unwrap();
        declare_indexes(&engine);
        check(&engine, &model);
    }
}
