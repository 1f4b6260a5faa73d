//! HashStore implementation
//!
//! ahash-backed slot table.

use ahash::AHashMap;

use super::{Key, LocalStore, MergePolicy, Value};

/// Hash table of key -> values slots
pub struct HashStore<K, V> {
    slots: AHashMap<K, Vec<V>>,

    /// Total values across all slots
    entries: usize,
}

impl<K, V> HashStore<K, V> {
    pub fn new() -> Self {
        Self {
            slots: AHashMap::new(),
            entries: 0,
        }
    }
}

impl<K, V> Default for HashStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, V: Value> LocalStore for HashStore<K, V> {
    type Key = K;
    type Value = V;

    fn insert_with<M>(&mut self, key: K, value: V, policy: &M) -> usize
    where
        M: MergePolicy<V>,
    {
        let slot = self.slots.entry(key).or_default();
        let before = slot.len();
        policy.merge(slot, value);
        let grown = slot.len().saturating_sub(before);
        self.entries += grown;
        grown
    }

    fn equal_range(&self, key: &K) -> &[V] {
        self.slots.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    fn erase_key(&mut self, key: &K) -> usize {
        let removed = self.slots.remove(key).map_or(0, |slot| slot.len());
        self.entries -= removed;
        removed
    }

    fn erase_values<F>(&mut self, key: &K, mut remove: F) -> usize
    where
        F: FnMut(&V) -> bool,
    {
        let Some(slot) = self.slots.get_mut(key) else {
            return 0;
        };

        let before = slot.len();
        slot.retain(|value| !remove(value));
        let removed = before - slot.len();

        if slot.is_empty() {
            self.slots.remove(key);
        }
        self.entries -= removed;
        removed
    }

    fn retain_keys<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&K, &[V]) -> bool,
    {
        let before = self.entries;
        let mut remaining = 0;
        self.slots.retain(|key, values| {
            let kept = keep(key, values);
            if kept {
                remaining += values.len();
            }
            kept
        });
        self.entries = remaining;
        before - remaining
    }

    fn len(&self) -> usize {
        self.entries
    }

    fn unique_len(&self) -> usize {
        self.slots.len()
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.entries = 0;
    }

    fn slots(&self) -> Box<dyn Iterator<Item = (&K, &[V])> + '_> {
        Box::new(self.slots.iter().map(|(key, values)| (key, values.as_slice())))
    }
}
