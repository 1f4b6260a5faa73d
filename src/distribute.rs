//! Batch distribution
//!
//! Routes every item of a batch to the rank that owns it.
//!
//! ```text
//!   rank 0 batch: [a b c d]        bucket          all_to_allv
//!                  │ │ │ │   ──►  [b d | a | c]  ──────────────►  rank 0: [b d ...]
//!                  1 0 2 0        to 0  1  2                       (origin order)
//! ```
//!
//! All functions taking a communicator are collectives.

use std::hash::Hash;

use ahash::AHashSet;

use crate::comm::{all_to_allv, Communicator, Wire};
use crate::error::Result;

/// Remove duplicates from `batch` in place.
///
/// With `sorted`, only adjacent duplicates are removed; otherwise the first
/// occurrence of every item is kept, in batch order.
pub fn unique<T>(batch: &mut Vec<T>, sorted: bool)
where
    T: Hash + Eq + Clone,
{
    if sorted {
        batch.dedup();
        return;
    }

    let mut seen = AHashSet::with_capacity(batch.len());
    batch.retain(|item| seen.insert(item.clone()));
}

/// Reorder `batch` into `size` contiguous buckets by destination rank.
///
/// Items keep their relative order inside a bucket. Returns the number of
/// items in each bucket.
pub fn bucket<T, F>(batch: &mut Vec<T>, size: usize, rank_of: F) -> Vec<usize>
where
    F: Fn(&T) -> usize,
{
    if size <= 1 {
        return vec![batch.len(); size];
    }

    let mut buckets: Vec<Vec<T>> = (0..size).map(|_| Vec::new()).collect();
    for item in batch.drain(..) {
        let dest = rank_of(&item);
        buckets[dest].push(item);
    }

    let counts = buckets.iter().map(Vec::len).collect();
    for part in buckets {
        batch.extend(part);
    }
    counts
}

/// Send every item of `batch` to its owner.
///
/// On return `batch` holds the items other ranks sent here, concatenated in
/// origin-rank order. Returns the number received from each origin.
pub fn distribute<C, T, F>(comm: &C, batch: &mut Vec<T>, rank_of: F) -> Result<Vec<usize>>
where
    C: Communicator,
    T: Wire,
    F: Fn(&T) -> usize,
{
    let send_counts = bucket(batch, comm.size(), rank_of);
    all_to_allv(comm, batch, &send_counts)
}

/// `unique` followed by `distribute`
pub fn distribute_unique<C, T, F>(
    comm: &C,
    batch: &mut Vec<T>,
    rank_of: F,
    sorted: bool,
) -> Result<Vec<usize>>
where
    C: Communicator,
    T: Wire + Hash + Eq + Clone,
    F: Fn(&T) -> usize,
{
    unique(batch, sorted);
    distribute(comm, batch, rank_of)
}

