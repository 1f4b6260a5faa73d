//! Map variants
//!
//! Named instantiations of `ShardedMap` and the operations only some of
//! them have.

use crate::comm::Communicator;
use crate::config::Config;
use crate::error::Result;
use crate::partition::{Identity, KeyTransform};
use crate::query::Predicate;
use crate::store::{Append, Arithmetic, Fold, HashStore, Key, Overwrite, Sum, Value};

use super::ShardedMap;

/// At most one value per key; a later insert replaces the value
pub type Map<K, V, C, T = Identity> = ShardedMap<HashStore<K, V>, Overwrite, C, T>;

/// Any number of values per key
pub type MultiMap<K, V, C, T = Identity> = ShardedMap<HashStore<K, V>, Append, C, T>;

/// One value per key, combined with a binary operator
pub type ReductionMap<K, V, F, C, T = Identity> = ShardedMap<HashStore<K, V>, Fold<F>, C, T>;

/// Occurrence count per key
pub type CountingMap<K, C, T = Identity> = ShardedMap<HashStore<K, u64>, Sum, C, T>;

impl<K: Key, V: Value, C: Communicator> Map<K, V, C> {
    pub fn map(comm: C, config: Config) -> Result<Self> {
        Self::new(comm, Overwrite, config)
    }
}

impl<K: Key, V: Value, C: Communicator> MultiMap<K, V, C> {
    pub fn multimap(comm: C, config: Config) -> Result<Self> {
        Self::new(comm, Append, config)
    }
}

impl<K, V, F, C> ReductionMap<K, V, F, C>
where
    K: Key,
    V: Value + Arithmetic,
    F: Fn(V, V) -> V + Send,
    C: Communicator,
{
    pub fn reduction(comm: C, op: F, config: Config) -> Result<Self> {
        Self::new(comm, Fold::new(op), config)
    }
}

impl<K: Key, C: Communicator> CountingMap<K, C> {
    pub fn counting(comm: C, config: Config) -> Result<Self> {
        Self::new(comm, Sum, config)
    }
}

// =============================================================================
// MultiMap
// =============================================================================

impl<K, V, C, T> MultiMap<K, V, C, T>
where
    K: Key,
    V: Value,
    C: Communicator,
    T: KeyTransform<K>,
{
    /// Average values per distinct key across the group (0 when empty).
    ///
    /// Cached until the next mutating call.
    pub fn get_multiplicity(&self) -> Result<f64> {
        if let Some(multiplicity) = self.multiplicity.get() {
            return Ok(multiplicity);
        }

        let (entries, keys) = self.reading_call(|map| map.global_sizes())?;
        let multiplicity = if keys == 0 {
            0.0
        } else {
            entries as f64 / keys as f64
        };
        self.multiplicity.set(Some(multiplicity));
        Ok(multiplicity)
    }

    /// Global histogram of values per key: `(c, n)` means `n` keys hold `c`
    /// values. Sorted by `c`; counts no key has are left out.
    pub fn count_histogram(&self) -> Result<Vec<(u64, u64)>> {
        self.histogram(|values| values.len() as u64)
    }

    /// Drop local keys with fewer than `min` values; returns entries removed
    pub fn retain_min_count(&mut self, min: u64) -> Result<usize> {
        self.retain_counted(min, |values| values.len() as u64)
    }
}

// =============================================================================
// CountingMap
// =============================================================================

impl<K, C, T> CountingMap<K, C, T>
where
    K: Key,
    C: Communicator,
    T: KeyTransform<K>,
{
    /// Count every key of `keys` once
    pub fn insert_keys<P>(&mut self, keys: Vec<K>, pred: &P) -> Result<usize>
    where
        P: Predicate<K, u64>,
    {
        let batch = keys.into_iter().map(|key| (key, u64::one())).collect();
        self.insert(batch, pred)
    }

    /// Global histogram of counts: `(c, n)` means `n` keys were seen `c`
    /// times. Sorted by `c`; counts no key has are left out.
    pub fn count_histogram(&self) -> Result<Vec<(u64, u64)>> {
        self.histogram(|values| values.first().copied().unwrap_or(0))
    }

    /// Drop local keys counted fewer than `min` times; returns entries removed
    /// (one per key, since a counting map holds a single count per key)
    pub fn retain_min_count(&mut self, min: u64) -> Result<usize> {
        self.retain_counted(min, |values| values.first().copied().unwrap_or(0))
    }
}
