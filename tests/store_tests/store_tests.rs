//! Local Store Tests
//!
//! Tests verify:
//! - Each merge policy's effect on a slot
//! - Entry and key accounting through inserts and erases
//! - Batch preparation (dedup, pre-fold) before distribution

use shardmap::store::{
    Append, Arithmetic, Fold, HashStore, LocalStore, MergePolicy, Overwrite, Sum,
};

// =============================================================================
// Merge Policy Tests
// =============================================================================

#[test]
fn test_overwrite_keeps_newest_value() {
    let mut store = HashStore::<u32, String>::new();

    assert_eq!(store.insert_with(1, "a".to_string(), &Overwrite), 1);
    assert_eq!(store.insert_with(1, "b".to_string(), &Overwrite), 0);

    assert_eq!(store.equal_range(&1), &["b".to_string()]);
    assert_eq!(store.len(), 1);
    assert_eq!(store.unique_len(), 1);
}

#[test]
fn test_append_keeps_every_value() {
    let mut store = HashStore::<u32, u32>::new();

    for value in [5, 6, 7] {
        assert_eq!(store.insert_with(1, value, &Append), 1);
    }
    store.insert_with(2, 9, &Append);

    assert_eq!(store.equal_range(&1), &[5, 6, 7]);
    assert_eq!(store.len(), 4);
    assert_eq!(store.unique_len(), 2);
}

#[test]
fn test_fold_applies_operator_existing_first() {
    let mut store = HashStore::<u32, i64>::new();
    let policy = Fold::new(|existing: i64, incoming: i64| existing * 10 + incoming);

    store.insert_with(1, 1, &policy);
    store.insert_with(1, 2, &policy);
    store.insert_with(1, 3, &policy);

    assert_eq!(store.equal_range(&1), &[123]);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_sum_counts() {
    let mut store = HashStore::<String, u64>::new();
    for key in ["a", "b", "a", "c", "a"] {
        store.insert_with(key.to_string(), u64::one(), &Sum);
    }

    assert_eq!(store.equal_range(&"a".to_string()), &[3]);
    assert_eq!(store.equal_range(&"b".to_string()), &[1]);
    assert_eq!(store.len(), 3);
}

// =============================================================================
// Batch Preparation Tests
// =============================================================================

#[test]
fn test_overwrite_prepare_keeps_last_duplicate() {
    let mut batch = vec![(1, 'a'), (2, 'b'), (1, 'c'), (3, 'd'), (2, 'e')];
    MergePolicy::<char>::prepare(&Overwrite, &mut batch);
    assert_eq!(batch, vec![(1, 'c'), (3, 'd'), (2, 'e')]);
}

#[test]
fn test_append_prepare_is_identity() {
    let mut batch = vec![(1, 'a'), (1, 'a')];
    MergePolicy::<char>::prepare(&Append, &mut batch);
    assert_eq!(batch.len(), 2);
}

#[test]
fn test_sum_prepare_prefolds_in_batch_order() {
    let mut batch = vec![(7u8, 1u64), (3, 1), (7, 1), (7, 1)];
    MergePolicy::<u64>::prepare(&Sum, &mut batch);
    assert_eq!(batch, vec![(7, 3), (3, 1)]);
}

#[test]
fn test_fold_prepare_uses_operator() {
    let policy = Fold::new(|a: u32, b: u32| a.max(b));
    let mut batch = vec![(1, 4u32), (1, 9), (2, 1), (1, 2)];
    policy.prepare(&mut batch);
    assert_eq!(batch, vec![(1, 9), (2, 1)]);
}

// =============================================================================
// Erase and Retain Tests
// =============================================================================

fn filled_multistore() -> HashStore<u32, u32> {
    let mut store = HashStore::new();
    for key in 0..4 {
        for value in 0..=key {
            store.insert_with(key, value, &Append);
        }
    }
    // Slots: 0 -> [0], 1 -> [0 1], 2 -> [0 1 2], 3 -> [0 1 2 3]
    store
}

#[test]
fn test_erase_key_removes_whole_slot() {
    let mut store = filled_multistore();
    assert_eq!(store.erase_key(&3), 4);
    assert_eq!(store.erase_key(&3), 0);
    assert!(store.find(&3).is_none());
    assert_eq!(store.len(), 6);
    assert_eq!(store.unique_len(), 3);
}

#[test]
fn test_erase_values_removes_matching_only() {
    let mut store = filled_multistore();
    assert_eq!(store.erase_values(&3, |v| v % 2 == 1), 2);
    assert_eq!(store.equal_range(&3), &[0, 2]);
    assert_eq!(store.len(), 8);
}

#[test]
fn test_erasing_last_value_drops_key() {
    let mut store = filled_multistore();
    assert_eq!(store.erase_values(&0, |_| true), 1);
    assert_eq!(store.unique_len(), 3);
    assert!(store.equal_range(&0).is_empty());
}

#[test]
fn test_retain_keys() {
    let mut store = filled_multistore();
    let removed = store.retain_keys(|_, values| values.len() >= 3);
    assert_eq!(removed, 3);
    assert_eq!(store.len(), 7);
    assert_eq!(store.unique_len(), 2);
}

#[test]
fn test_clear_and_slots() {
    let mut store = filled_multistore();
    let mut keys: Vec<u32> = store.slots().map(|(k, _)| *k).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec![0, 1, 2, 3]);

    store.clear();
    assert!(store.is_empty());
    assert_eq!(store.unique_len(), 0);
    assert_eq!(store.slots().count(), 0);
}
