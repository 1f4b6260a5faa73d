//! Sharded Map Module
//!
//! The distributed hash table every rank of a group holds one shard of.
//!
//! ## Responsibilities
//! - Apply the key transform once, as keys enter a collective call
//! - Route inserts to their owners and merge them by the map's policy
//! - Answer find/count/erase batches through an exchange strategy
//! - Whole-shard operations (local scans, clear, sizes, histograms)
//!
//! ## Variants
//! One engine, four merge policies:
//! ```text
//! Map           Overwrite   one value per key, newest wins
//! MultiMap      Append      any number of values per key
//! ReductionMap  Fold<F>     one value per key, folded with F
//! CountingMap   Sum (u64)   one count per key
//! ```
//!
//! ## Collective Calls
//! Every method that returns `Result` is a collective: all ranks must make
//! the same sequence of such calls, each with its own (possibly empty) batch.

mod variants;

pub use variants::{CountingMap, Map, MultiMap, ReductionMap};

use std::cell::Cell;
use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::comm::{all_reduce_sum, all_to_allv, Communicator};
use crate::config::Config;
use crate::distribute::{distribute, distribute_unique, unique};
use crate::error::Result;
use crate::exchange::{exchange, ExchangeContext, Strategy};
use crate::partition::{Identity, KeyToRank, KeyTransform};
use crate::query::{
    process_erase, AcceptAll, CountElement, FindElement, Operation, Predicate, QueryProcessor,
};
use crate::store::{LocalStore, MergePolicy};

/// Where a map is in its call sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    InCollectiveCall,
}

/// One rank's view of a distributed hash table
///
/// Not `Sync`: collective calls on one map must come from one thread.
pub struct ShardedMap<S, M, C, T = Identity> {
    comm: C,
    store: S,
    policy: M,
    transform: T,
    partition: KeyToRank,
    config: Config,

    /// Global entries per key, valid until the next mutating call
    multiplicity: Cell<Option<f64>>,

    state: Cell<CallState>,
}

impl<S, M, C> ShardedMap<S, M, C, Identity>
where
    S: LocalStore,
    M: MergePolicy<S::Value>,
    C: Communicator,
{
    /// Create a map over `comm` with untransformed keys
    pub fn new(comm: C, policy: M, config: Config) -> Result<Self> {
        Self::with_transform(comm, policy, Identity, config)
    }
}

impl<S, M, C, T> ShardedMap<S, M, C, T>
where
    S: LocalStore,
    M: MergePolicy<S::Value>,
    C: Communicator,
    T: KeyTransform<S::Key>,
{
    /// Create a map whose keys pass through `transform` on the way in
    pub fn with_transform(comm: C, policy: M, transform: T, config: Config) -> Result<Self> {
        config.validate()?;
        let partition = KeyToRank::new(comm.size(), config.partitioning, config.hash_seeds);

        tracing::debug!(
            "rank {}: sharded map over {} ranks ({:?})",
            comm.rank(),
            comm.size(),
            config.partitioning
        );

        Ok(Self {
            comm,
            store: S::default(),
            policy,
            transform,
            partition,
            config,
            multiplicity: Cell::new(None),
            state: Cell::new(CallState::Idle),
        })
    }

    // =========================================================================
    // Batch operations
    // =========================================================================

    /// Insert a batch; entries failing `pred` at their owner are dropped.
    ///
    /// Returns how many entries the local shard grew by.
    pub fn insert<P>(&mut self, batch: Vec<(S::Key, S::Value)>, pred: &P) -> Result<usize>
    where
        P: Predicate<S::Key, S::Value>,
    {
        self.mutating_call(|map| {
            let totals = all_reduce_sum(&map.comm, &[batch.len() as u64])?;
            if total(&totals, 0) == 0 {
                return Ok(0);
            }

            let mut batch: Vec<_> = batch
                .into_iter()
                .map(|(key, value)| (map.transform.transform(key), value))
                .collect();
            map.policy.prepare(&mut batch);

            let partition = &map.partition;
            distribute(&map.comm, &mut batch, |entry| partition.rank_of(&entry.0))?;

            let received = batch.len();
            let mut grown = 0;
            for (key, value) in batch {
                if pred.accept(&key, &value) {
                    grown += map.store.insert_with(key, value, &map.policy);
                }
            }

            tracing::debug!(
                "rank {}: insert received {} entries, shard grew by {}",
                map.comm.rank(),
                received,
                grown
            );
            Ok(grown)
        })
    }

    /// Every stored (key, value) for `keys` that passes `pred`
    pub fn find<P>(
        &self,
        keys: Vec<S::Key>,
        strategy: Strategy,
        pred: &P,
    ) -> Result<Vec<(S::Key, S::Value)>>
    where
        P: Predicate<S::Key, S::Value>,
    {
        self.reading_call(|map| map.query(keys, strategy, &FindElement, pred))
    }

    /// `find` with the configured default strategy and no filter
    pub fn find_default(&self, keys: Vec<S::Key>) -> Result<Vec<(S::Key, S::Value)>> {
        self.find(keys, self.config.default_strategy, &AcceptAll)
    }

    /// One (key, count) for every distinct key in `keys`, counting the
    /// stored values that pass `pred`.
    ///
    /// A counting map reports the stored count, not the number of slots.
    pub fn count<P>(
        &self,
        keys: Vec<S::Key>,
        strategy: Strategy,
        pred: &P,
    ) -> Result<Vec<(S::Key, usize)>>
    where
        P: Predicate<S::Key, S::Value>,
    {
        self.reading_call(|map| {
            let count = CountElement::new(&map.policy);
            map.query(keys, strategy, &count, pred)
        })
    }

    /// Erase the values under `keys` that pass `pred`.
    ///
    /// Returns the number of entries removed from the local shard.
    pub fn erase<P>(&mut self, keys: Vec<S::Key>, pred: &P) -> Result<usize>
    where
        P: Predicate<S::Key, S::Value>,
    {
        self.mutating_call(|map| {
            let mut keys = map.transform_keys(keys);
            let totals = all_reduce_sum(&map.comm, &[keys.len() as u64, map.store.len() as u64])?;
            if total(&totals, 0) == 0 || total(&totals, 1) == 0 {
                return Ok(0);
            }

            let partition = &map.partition;
            distribute_unique(
                &map.comm,
                &mut keys,
                |key| partition.rank_of(key),
                map.config.sorted_input,
            )?;
            // Several origins may ask for the same key
            unique(&mut keys, false);

            let removed = process_erase(&mut map.store, &keys, pred);
            tracing::debug!(
                "rank {}: erase of {} keys removed {} entries",
                map.comm.rank(),
                keys.len(),
                removed
            );
            Ok(removed)
        })
    }

    // =========================================================================
    // Whole-shard operations
    // =========================================================================

    /// Every local (key, value) passing `pred`
    pub fn find_local<P>(&self, pred: &P) -> Result<Vec<(S::Key, S::Value)>>
    where
        P: Predicate<S::Key, S::Value>,
    {
        self.reading_call(|map| {
            let mut found = Vec::new();
            for (key, values) in map.store.slots() {
                if !pred.accept_range(key, values) {
                    continue;
                }
                found.extend(
                    values
                        .iter()
                        .filter(|value| pred.accept(key, value))
                        .map(|value| (key.clone(), value.clone())),
                );
            }
            map.comm.barrier()?;
            Ok(found)
        })
    }

    /// (key, count) for every local key with at least one value passing `pred`
    pub fn count_local<P>(&self, pred: &P) -> Result<Vec<(S::Key, usize)>>
    where
        P: Predicate<S::Key, S::Value>,
    {
        self.reading_call(|map| {
            let mut counts = Vec::new();
            for (key, values) in map.store.slots() {
                if !pred.accept_range(key, values) {
                    continue;
                }
                let count = values
                    .iter()
                    .filter(|value| pred.accept(key, value))
                    .fold(0usize, |count, value| count.saturating_add(map.policy.weight(value)));
                if count > 0 {
                    counts.push((key.clone(), count));
                }
            }
            map.comm.barrier()?;
            Ok(counts)
        })
    }

    /// Erase every local value passing `pred`; returns entries removed
    pub fn erase_local<P>(&mut self, pred: &P) -> Result<usize>
    where
        P: Predicate<S::Key, S::Value>,
    {
        self.mutating_call(|map| {
            let keys: Vec<S::Key> = map
                .store
                .slots()
                .filter(|(key, values)| pred.accept_range(key, values))
                .map(|(key, _)| key.clone())
                .collect();
            let removed = process_erase(&mut map.store, &keys, pred);
            map.comm.barrier()?;
            Ok(removed)
        })
    }

    /// Drop the local shard's contents
    pub fn clear(&mut self) -> Result<()> {
        self.mutating_call(|map| {
            map.store.clear();
            map.comm.barrier()
        })
    }

    /// Total entries across all shards
    pub fn len(&self) -> Result<usize> {
        self.reading_call(|map| {
            let totals = all_reduce_sum(&map.comm, &[map.store.len() as u64])?;
            Ok(total(&totals, 0) as usize)
        })
    }

    /// Distinct keys across all shards
    pub fn unique_len(&self) -> Result<usize> {
        self.reading_call(|map| {
            let totals = all_reduce_sum(&map.comm, &[map.store.unique_len() as u64])?;
            Ok(total(&totals, 0) as usize)
        })
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // =========================================================================
    // Local accessors
    // =========================================================================

    /// Entries held by this rank
    pub fn local_len(&self) -> usize {
        self.store.len()
    }

    /// Distinct keys held by this rank
    pub fn local_unique_len(&self) -> usize {
        self.store.unique_len()
    }

    /// Snapshot of the local shard
    pub fn to_vec(&self) -> Vec<(S::Key, S::Value)> {
        let mut entries = Vec::with_capacity(self.store.len());
        for (key, values) in self.store.slots() {
            entries.extend(values.iter().map(|value| (key.clone(), value.clone())));
        }
        entries
    }

    /// Distinct keys of the local shard
    pub fn keys(&self) -> Vec<S::Key> {
        self.store.slots().map(|(key, _)| key.clone()).collect()
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn state(&self) -> CallState {
        self.state.get()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn transform_keys(&self, keys: Vec<S::Key>) -> Vec<S::Key> {
        keys.into_iter().map(|key| self.transform.transform(key)).collect()
    }

    /// Route `keys` through an exchange running `op` at each owner
    fn query<Op, P>(
        &self,
        keys: Vec<S::Key>,
        strategy: Strategy,
        op: &Op,
        pred: &P,
    ) -> Result<Vec<Op::Output>>
    where
        Op: Operation<S>,
        P: Predicate<S::Key, S::Value>,
    {
        let mut keys = self.transform_keys(keys);
        let totals = all_reduce_sum(&self.comm, &[keys.len() as u64, self.store.len() as u64])?;
        let processor = QueryProcessor::new(&self.store, op, pred);

        if total(&totals, 0) == 0 {
            return Ok(Vec::new());
        }

        // Nothing stored anywhere: answer from the (empty) local shard
        if total(&totals, 1) == 0 {
            unique(&mut keys, self.config.sorted_input);
            let mut out = Vec::new();
            processor.process(&keys, &mut out);
            return Ok(out);
        }

        let ctx = ExchangeContext::new(&self.comm, &processor, &self.partition)
            .sorted(self.config.sorted_input)
            .headroom(self.config.estimate_headroom);
        exchange(ctx, strategy, keys)
    }

    fn enter(&self) {
        debug_assert_eq!(
            self.state.get(),
            CallState::Idle,
            "collective call issued while another is in progress"
        );
        self.state.set(CallState::InCollectiveCall);
    }

    fn leave(&self) {
        self.state.set(CallState::Idle);
    }

    fn reading_call<R>(&self, call: impl FnOnce(&Self) -> Result<R>) -> Result<R> {
        self.enter();
        let result = call(self);
        self.leave();
        result
    }

    fn mutating_call<R>(&mut self, call: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.enter();
        self.multiplicity.set(None);
        let result = call(self);
        self.leave();
        result
    }

    /// Global entries and distinct keys
    fn global_sizes(&self) -> Result<(u64, u64)> {
        let totals = all_reduce_sum(
            &self.comm,
            &[self.store.len() as u64, self.store.unique_len() as u64],
        )?;
        Ok((total(&totals, 0), total(&totals, 1)))
    }

    /// Global histogram of a per-key count as sorted (count, keys) pairs.
    ///
    /// Sparse: only counts some key actually has appear, so the size is
    /// bounded by the number of distinct counts, not by the largest one.
    fn histogram(&self, count_of: impl Fn(&[S::Value]) -> u64) -> Result<Vec<(u64, u64)>> {
        self.reading_call(|map| {
            let mut local: AHashMap<u64, u64> = AHashMap::new();
            for (_, values) in map.store.slots() {
                *local.entry(count_of(values)).or_insert(0) += 1;
            }

            // Every rank gets every local histogram
            let size = map.comm.size();
            let bins: Vec<(u64, u64)> = local.into_iter().collect();
            let mut outgoing = Vec::new();
            outgoing.try_reserve_exact(bins.len() * size)?;
            for _ in 0..size {
                outgoing.extend_from_slice(&bins);
            }
            all_to_allv(&map.comm, &mut outgoing, &vec![bins.len(); size])?;

            let mut merged: BTreeMap<u64, u64> = BTreeMap::new();
            for (count, keys) in outgoing {
                *merged.entry(count).or_insert(0) += keys;
            }
            Ok(merged.into_iter().collect())
        })
    }

    /// Drop local keys whose count is below `min`
    fn retain_counted(&mut self, min: u64, count_of: impl Fn(&[S::Value]) -> u64) -> Result<usize> {
        self.mutating_call(|map| {
            let removed = map.store.retain_keys(|_, values| count_of(values) >= min);
            map.comm.barrier()?;
            Ok(removed)
        })
    }
}

/// Entry `at` of an all-reduce result (missing entries are zero)
fn total(totals: &[u64], at: usize) -> u64 {
    totals.get(at).copied().unwrap_or(0)
}
