//! Tests for Ordered Indexes
//!
//! These tests verify:
//! - Index contents follow every committed set/delete
//! - Range iteration bounds (ascend/descend variants) on indexes and keys
//! - Collation: default byte order, built-in and composed `less` functions
//! - Index management errors
//! - Glob-filtered key iteration

use atlasdb::collate::{desc, index_float, index_int, index_string, index_uint};
use atlasdb::{AtlasError, Engine, IndexOptions, Iter, Less};

// =============================================================================
// Helper Functions
// =============================================================================

fn engine_with(pairs: &[(&str, &str)]) -> Engine {
    let engine = Engine::memory().unwrap();
    engine
        .update(|tx| {
            for (key, value) in pairs {
                tx.set(key, value)?;
            }
            Ok::<_, AtlasError>(())
        })
        .unwrap();
    engine
}

fn pairs(it: Iter<'_>) -> Vec<(String, String)> {
    it.map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn keys(it: Iter<'_>) -> Vec<String> {
    it.map(|(k, _)| k.to_string()).collect()
}

fn values(it: Iter<'_>) -> Vec<String> {
    it.map(|(_, v)| v.to_string()).collect()
}

/// The users scenario: `fun:user:3` is never set
fn users_engine() -> Engine {
    let names = ["tom", "Randi", "jane", "Janet", "Paula", "peter", "Terri"];
    let engine = Engine::memory().unwrap();
    engine
        .create_index("last_name", "fun:user:*", &[Less::new(index_string)])
        .unwrap();
    engine
        .update(|tx| {
            let ids = [0, 1, 2, 4, 5, 6, 7];
            for (id, name) in ids.iter().zip(names) {
                tx.set(&format!("fun:user:{id}"), name)?;
            }
            Ok::<_, AtlasError>(())
        })
        .unwrap();
    engine
}

fn tags_engine() -> Engine {
    let engine = Engine::memory().unwrap();
    engine
        .update(|tx| {
            for i in 100..200 {
                tx.set(&format!("tag:{i}"), &i.to_string())?;
            }
            Ok::<_, AtlasError>(())
        })
        .unwrap();
    engine
}

// =============================================================================
// Scenario Tests
// =============================================================================

#[test]
fn test_users_index_ascend_order() {
    let engine = users_engine();
    let tx = engine.begin(false).unwrap();

    assert_eq!(
        pairs(tx.ascend("last_name").unwrap()),
        vec![
            ("fun:user:2".to_string(), "jane".to_string()),
            ("fun:user:4".to_string(), "Janet".to_string()),
            ("fun:user:5".to_string(), "Paula".to_string()),
            ("fun:user:6".to_string(), "peter".to_string()),
            ("fun:user:1".to_string(), "Randi".to_string()),
            ("fun:user:7".to_string(), "Terri".to_string()),
            ("fun:user:0".to_string(), "tom".to_string()),
        ]
    );
}

#[test]
fn test_users_index_descend_order() {
    let engine = users_engine();
    let tx = engine.begin(false).unwrap();

    assert_eq!(
        values(tx.descend("last_name").unwrap()),
        vec!["tom", "Terri", "Randi", "peter", "Paula", "Janet", "jane"]
    );
}

#[test]
fn test_keyspace_ascend_range_is_half_open() {
    let engine = tags_engine();
    let tx = engine.begin(false).unwrap();

    assert_eq!(
        keys(tx.ascend_range("", "tag:170", "tag:172").unwrap()),
        vec!["tag:170", "tag:171"]
    );
}

// =============================================================================
// Keyspace Range Tests
// =============================================================================

#[test]
fn test_keyspace_range_variants() {
    let engine = tags_engine();
    let tx = engine.begin(false).unwrap();

    assert_eq!(
        keys(tx.ascend_greater_or_equal("", "tag:197").unwrap()),
        vec!["tag:197", "tag:198", "tag:199"]
    );
    assert_eq!(
        keys(tx.ascend_less_than("", "tag:102").unwrap()),
        vec!["tag:100", "tag:101"]
    );
    assert_eq!(
        keys(tx.descend_range("", "tag:172", "tag:170").unwrap()),
        vec!["tag:172", "tag:171"]
    );
    assert_eq!(
        keys(tx.descend_greater_than("", "tag:197").unwrap()),
        vec!["tag:199", "tag:198"]
    );
    assert_eq!(
        keys(tx.descend_less_or_equal("", "tag:101").unwrap()),
        vec!["tag:101", "tag:100"]
    );
    assert_eq!(keys(tx.ascend_equal("", "tag:150").unwrap()), vec!["tag:150"]);
    assert_eq!(keys(tx.descend_equal("", "tag:150").unwrap()), vec!["tag:150"]);
}

#[test]
fn test_inverted_and_empty_ranges_yield_nothing() {
    let engine = tags_engine();
    let tx = engine.begin(false).unwrap();

    assert_eq!(tx.ascend_range("", "tag:180", "tag:170").unwrap().count(), 0);
    assert_eq!(tx.ascend_range("", "tag:170", "tag:170").unwrap().count(), 0);
    assert_eq!(tx.descend_range("", "tag:170", "tag:180").unwrap().count(), 0);
    assert_eq!(tx.ascend_equal("", "tag:999").unwrap().count(), 0);
}

#[test]
fn test_iteration_stops_early() {
    let engine = tags_engine();
    let tx = engine.begin(false).unwrap();

    let first: Vec<&str> = tx.ascend("").unwrap().take(3).map(|(k, _)| k).collect();
    assert_eq!(first, vec!["tag:100", "tag:101", "tag:102"]);

    let last = tx.descend("").unwrap().next();
    assert_eq!(last, Some(("tag:199", "199")));
}

// =============================================================================
// Index Range Tests
// =============================================================================

#[test]
fn test_index_range_variants_by_value() {
    let engine = engine_with(&[
        ("age:a", "30"),
        ("age:b", "25"),
        ("age:c", "30"),
        ("age:d", "41"),
        ("age:e", "7"),
    ]);
    engine.create_index("ages", "age:*", &[Less::new(index_int)]).unwrap();
    let tx = engine.begin(false).unwrap();

    assert_eq!(
        keys(tx.ascend("ages").unwrap()),
        vec!["age:e", "age:b", "age:a", "age:c", "age:d"]
    );
    assert_eq!(
        keys(tx.ascend_range("ages", "25", "31").unwrap()),
        vec!["age:b", "age:a", "age:c"]
    );
    assert_eq!(
        keys(tx.ascend_greater_or_equal("ages", "30").unwrap()),
        vec!["age:a", "age:c", "age:d"]
    );
    assert_eq!(
        keys(tx.ascend_less_than("ages", "30").unwrap()),
        vec!["age:e", "age:b"]
    );
    assert_eq!(
        keys(tx.ascend_equal("ages", "30").unwrap()),
        vec!["age:a", "age:c"]
    );
    assert_eq!(
        keys(tx.descend_equal("ages", "30").unwrap()),
        vec!["age:c", "age:a"]
    );
    assert_eq!(
        keys(tx.descend_range("ages", "30", "7").unwrap()),
        vec!["age:c", "age:a", "age:b"]
    );
    assert_eq!(
        keys(tx.descend_greater_than("ages", "30").unwrap()),
        vec!["age:d"]
    );
    assert_eq!(
        keys(tx.descend_less_or_equal("ages", "25").unwrap()),
        vec!["age:b", "age:e"]
    );
}

#[test]
fn test_index_follows_sets_and_deletes() {
    let engine = engine_with(&[("n:1", "b"), ("n:2", "a"), ("other", "z")]);
    engine.create_index("n", "n:*", &[]).unwrap();

    engine
        .update(|tx| {
            tx.set("n:3", "c")?;
            tx.set("n:1", "d")?; // moves within the index
            tx.delete("n:2")?;
            tx.set("x:1", "a")?; // not matched
            Ok::<_, AtlasError>(())
        })
        .unwrap();

    let tx = engine.begin(false).unwrap();
    assert_eq!(
        pairs(tx.ascend("n").unwrap()),
        vec![
            ("n:3".to_string(), "c".to_string()),
            ("n:1".to_string(), "d".to_string()),
        ]
    );
}

#[test]
fn test_index_built_from_existing_items() {
    let engine = tags_engine();
    engine.create_index("tags", "tag:1?0", &[Less::new(index_int)]).unwrap();
    let tx = engine.begin(false).unwrap();

    assert_eq!(
        values(tx.ascend("tags").unwrap()),
        vec!["100", "110", "120", "130", "140", "150", "160", "170", "180", "190"]
    );
}

#[test]
fn test_delete_all_empties_indexes_but_keeps_them() {
    let engine = users_engine();
    engine.update(|tx| tx.delete_all()).unwrap();

    assert_eq!(engine.indexes().unwrap(), vec!["last_name"]);
    let tx = engine.begin(false).unwrap();
    assert_eq!(tx.ascend("last_name").unwrap().count(), 0);
    drop(tx);

    engine
        .update(|tx| tx.set("fun:user:9", "zoe").map(|_| ()))
        .unwrap();
    let tx = engine.begin(false).unwrap();
    assert_eq!(values(tx.ascend("last_name").unwrap()), vec!["zoe"]);
}

// =============================================================================
// Collation Tests
// =============================================================================

#[test]
fn test_default_collation_is_byte_order() {
    let engine = engine_with(&[("k:1", "tom"), ("k:2", "Randi"), ("k:3", "jane")]);
    engine.create_index("raw", "k:*", &[]).unwrap();
    let tx = engine.begin(false).unwrap();

    assert_eq!(values(tx.ascend("raw").unwrap()), vec!["Randi", "jane", "tom"]);
}

#[test]
fn test_numeric_collations() {
    let engine = engine_with(&[("k:1", "10"), ("k:2", "9"), ("k:3", "-2.5"), ("k:4", "100")]);
    engine.create_index("int", "k:*", &[Less::new(index_int)]).unwrap();
    engine.create_index("float", "k:*", &[Less::new(index_float)]).unwrap();
    engine.create_index("uint", "k:*", &[Less::new(index_uint)]).unwrap();
    engine
        .create_index("float_desc", "k:*", &[desc(Less::new(index_float))])
        .unwrap();
    let tx = engine.begin(false).unwrap();

    assert_eq!(values(tx.ascend("float").unwrap()), vec!["-2.5", "9", "10", "100"]);
    assert_eq!(values(tx.ascend("float_desc").unwrap()), vec!["100", "10", "9", "-2.5"]);
    // Integer parsing of "-2.5" fails and counts as zero
    assert_eq!(values(tx.ascend("int").unwrap()), vec!["-2.5", "9", "10", "100"]);
    assert_eq!(values(tx.ascend("uint").unwrap()), vec!["-2.5", "9", "10", "100"]);
}

#[test]
fn test_composed_collation_breaks_ties_with_next_less() {
    // Order by length first, then byte order
    let by_len = Less::new(|a: &str, b: &str| a.len() < b.len());
    let engine = engine_with(&[("p:1", "bb"), ("p:2", "a"), ("p:3", "ab"), ("p:4", "c")]);
    engine
        .create_index("len", "p:*", &[by_len, Less::new(|a: &str, b: &str| a < b)])
        .unwrap();
    let tx = engine.begin(false).unwrap();

    assert_eq!(values(tx.ascend("len").unwrap()), vec!["a", "c", "ab", "bb"]);
}

#[test]
fn test_case_insensitive_key_option() {
    let engine = engine_with(&[("USER:1", "a"), ("user:2", "b"), ("other", "c")]);
    engine
        .create_index_with(
            "users",
            "user:*",
            &[],
            IndexOptions {
                case_insensitive_keys: true,
            },
        )
        .unwrap();
    let tx = engine.begin(false).unwrap();

    assert_eq!(keys(tx.ascend("users").unwrap()), vec!["USER:1", "user:2"]);
}

// =============================================================================
// Index Management Tests
// =============================================================================

#[test]
fn test_duplicate_index_name() {
    let engine = Engine::memory().unwrap();
    engine.create_index("idx", "*", &[]).unwrap();

    let result = engine.create_index("idx", "other:*", &[]);

    assert!(matches!(result, Err(AtlasError::IndexExists(name)) if name == "idx"));
}

#[test]
fn test_unknown_index() {
    let engine = Engine::memory().unwrap();

    assert!(matches!(engine.drop_index("nope"), Err(AtlasError::NotFound)));
    let tx = engine.begin(false).unwrap();
    assert!(matches!(tx.ascend("nope"), Err(AtlasError::NotFound)));
    assert!(matches!(tx.descend_range("nope", "a", "b"), Err(AtlasError::NotFound)));
    assert!(matches!(tx.intersects("nope", "[0 0]"), Err(AtlasError::NotFound)));
}

#[test]
fn test_empty_index_name_is_invalid() {
    let engine = Engine::memory().unwrap();

    assert!(matches!(
        engine.create_index("", "*", &[]),
        Err(AtlasError::InvalidArgument(_))
    ));
    assert!(matches!(engine.drop_index(""), Err(AtlasError::InvalidArgument(_))));
}

#[test]
fn test_indexes_lists_sorted_names() {
    let engine = Engine::memory().unwrap();
    engine.create_index("zeta", "*", &[]).unwrap();
    engine.create_index("alpha", "*", &[]).unwrap();
    engine
        .create_spatial_index("geo", "*", atlasdb::rect::index_rect)
        .unwrap();

    assert_eq!(engine.indexes().unwrap(), vec!["alpha", "geo", "zeta"]);

    engine.drop_index("geo").unwrap();
    assert_eq!(engine.indexes().unwrap(), vec!["alpha", "zeta"]);
}

// =============================================================================
// Key Pattern Iteration Tests
// =============================================================================

#[test]
fn test_ascend_keys_filters_by_pattern() {
    let engine = engine_with(&[
        ("user:1:name", "a"),
        ("user:1:age", "1"),
        ("user:2:name", "b"),
        ("users", "x"),
        ("admin:1:name", "c"),
    ]);
    let tx = engine.begin(false).unwrap();

    assert_eq!(
        keys(tx.ascend_keys("user:*:name").unwrap()),
        vec!["user:1:name", "user:2:name"]
    );
    assert_eq!(
        keys(tx.descend_keys("*:name").unwrap()),
        vec!["user:2:name", "user:1:name", "admin:1:name"]
    );
    assert_eq!(keys(tx.ascend_keys("users").unwrap()), vec!["users"]);
    assert_eq!(tx.ascend_keys("*").unwrap().count(), 5);
    assert_eq!(tx.ascend_keys("nothing*").unwrap().count(), 0);
}
