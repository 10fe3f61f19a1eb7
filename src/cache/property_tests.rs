//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the LMDB store against a `HashMap` model, and the
//! glob matcher against its defining cases.

use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};

use crate::cache::{glob_match, CacheValue, GcOutcome, LmdbStore};

// == Strategies ==
/// Generates keys from a small alphabet so operations collide often
fn key_strategy() -> impl Strategy<Value = String> {
    "[ab]:[0-3]".prop_map(|s| s)
}

fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

#[derive(Debug, Clone)]
enum StoreOp {
    Set { key: String, value: Vec<u8> },
    Delete { key: String },
    DeleteMatching { prefix: char },
    Gc,
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        4 => (key_strategy(), value_strategy()).prop_map(|(key, value)| StoreOp::Set { key, value }),
        2 => key_strategy().prop_map(|key| StoreOp::Delete { key }),
        1 => prop_oneof![Just('a'), Just('b')].prop_map(|prefix| StoreOp::DeleteMatching { prefix }),
        1 => Just(StoreOp::Gc),
    ]
}

fn cache_value_strategy() -> impl Strategy<Value = CacheValue> {
    let leaf = prop_oneof![
        Just(CacheValue::Null),
        any::<bool>().prop_map(CacheValue::Bool),
        any::<i64>().prop_map(CacheValue::Int),
        (i64::MAX as u64 + 1..=u64::MAX).prop_map(CacheValue::UInt),
        (-1.0e9f64..1.0e9).prop_map(CacheValue::Float),
        "[a-z ]{0,16}".prop_map(CacheValue::Str),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(CacheValue::Bytes),
    ];

    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(CacheValue::Seq),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m: BTreeMap<String, CacheValue>| CacheValue::Map(m)),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Any sequence of writes, deletes and GC passes leaves the store agreeing
    // with a plain map, both live and after reopening from disk.
    #[test]
    fn prop_store_matches_model(ops in prop::collection::vec(store_op_strategy(), 1..60)) {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbStore::open_with_map_size(dir.path(), 16 * 1024 * 1024).unwrap();
        let mut model: HashMap<String, Vec<u8>> = HashMap::new();

        for op in ops {
            match op {
                StoreOp::Set { key, value } => {
                    store.set(&key, value.clone(), None).unwrap();
                    model.insert(key, value);
                }
                StoreOp::Delete { key } => {
                    let existed = store.delete(&key).unwrap();
                    prop_assert_eq!(existed, model.remove(&key).is_some());
                }
                StoreOp::DeleteMatching { prefix } => {
                    let pattern = format!("{}:*", prefix);
                    let removed = store.delete_matching(&pattern).unwrap();
                    let before = model.len();
                    model.retain(|k, _| !k.starts_with(prefix));
                    prop_assert_eq!(removed, before - model.len());
                }
                StoreOp::Gc => {
                    let outcome = store.run_gc(0.0).unwrap();
                    prop_assert!(!matches!(outcome, GcOutcome::AlreadyRunning));
                }
            }
        }

        for (key, value) in &model {
            let stored = store.get(key).unwrap();
            prop_assert_eq!(stored.as_ref(), Some(value));
        }
        prop_assert_eq!(store.keys().unwrap().len(), model.len());

        drop(store);
        let reopened = LmdbStore::open_with_map_size(dir.path(), 16 * 1024 * 1024).unwrap();
        for (key, value) in &model {
            let stored = reopened.get(key).unwrap();
            prop_assert_eq!(stored.as_ref(), Some(value));
        }
        prop_assert_eq!(reopened.keys().unwrap().len(), model.len());
    }

    // Nested maps and sequences survive encoding unchanged.
    #[test]
    fn prop_cache_value_encoding_preserves_shape(value in cache_value_strategy()) {
        let decoded = CacheValue::decode(&value.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, value);
    }

    // A trailing `*` is a prefix match.
    #[test]
    fn prop_star_suffix_is_prefix_match(prefix in "[a-z:]{0,8}", key in "[a-z:]{0,12}") {
        let pattern = format!("{}*", prefix);
        prop_assert_eq!(glob_match(&pattern, &key), key.starts_with(&prefix));
    }

    // A pattern without metacharacters only matches itself.
    #[test]
    fn prop_literal_pattern_is_equality(pattern in "[a-z0-9:]{0,10}", key in "[a-z0-9:]{0,10}") {
        prop_assert_eq!(glob_match(&pattern, &key), pattern == key);
        prop_assert!(glob_match(&key, &key));
    }
}
