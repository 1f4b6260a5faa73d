//! Local Store Module
//!
//! A worker's private shard of the distributed map.
//!
//! ## Responsibilities
//! - Hold every entry whose key this rank owns
//! - Merge arriving entries according to a merge policy
//! - Serve multi-value ranges per key for the query processor
//!
//! ## Data Structure Choice
//! One slot (`Vec<V>`) per key in an ahash map:
//! - A unique map, reduction map and counting map keep exactly one value per slot
//! - A multimap appends; order within a slot is arrival order but not guaranteed
//!   to callers
//! - Slots never stay empty: erasing the last value removes the key

mod policy;
mod table;

pub use policy::{Append, Arithmetic, Fold, MergePolicy, Overwrite, Sum};
pub use table::HashStore;

use std::hash::Hash;

use crate::comm::Wire;

/// Keys that can be distributed and stored
pub trait Key: Wire + Hash + Eq + Clone {}

impl<T> Key for T where T: Wire + Hash + Eq + Clone {}

/// Values that can be distributed and stored
pub trait Value: Wire + Clone {}

impl<T> Value for T where T: Wire + Clone {}

/// Capability set the distributed map needs from a local container
pub trait LocalStore: Default + Send {
    type Key: Key;
    type Value: Value;

    /// Merge one entry into the store; returns how many entries the store
    /// grew by (0 when an existing value was overwritten or folded)
    fn insert_with<M>(&mut self, key: Self::Key, value: Self::Value, policy: &M) -> usize
    where
        M: MergePolicy<Self::Value>;

    /// All values stored under `key` (empty when absent)
    fn equal_range(&self, key: &Self::Key) -> &[Self::Value];

    /// Values stored under `key`, or `None` when absent
    fn find(&self, key: &Self::Key) -> Option<&[Self::Value]> {
        let range = self.equal_range(key);
        if range.is_empty() {
            None
        } else {
            Some(range)
        }
    }

    /// Remove every value under `key`; returns entries removed
    fn erase_key(&mut self, key: &Self::Key) -> usize;

    /// Remove the values under `key` for which `remove` returns true;
    /// returns entries removed
    fn erase_values<F>(&mut self, key: &Self::Key, remove: F) -> usize
    where
        F: FnMut(&Self::Value) -> bool;

    /// Keep only the keys for which `keep` returns true; returns entries removed
    fn retain_keys<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&Self::Key, &[Self::Value]) -> bool;

    /// Total number of entries
    fn len(&self) -> usize;

    /// Number of distinct keys
    fn unique_len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);

    /// Iterate over (key, values) slots in unspecified order
    fn slots(&self) -> Box<dyn Iterator<Item = (&Self::Key, &[Self::Value])> + '_>;
}
