//! Distribution Tests
//!
//! Tests verify:
//! - Stable bucketing by destination
//! - Sorted and unsorted deduplication
//! - Every item reaches its owner exactly once

use shardmap::comm::{Communicator, LocalGroup};
use shardmap::config::Config;
use shardmap::distribute::{bucket, distribute, distribute_unique, unique};
use shardmap::partition::{KeyToRank, Partitioning};

// =============================================================================
// Local Tests
// =============================================================================

#[test]
fn test_bucket_is_stable() {
    let mut batch = vec![5, 2, 7, 4, 1, 6];
    let counts = bucket(&mut batch, 2, |x| (*x % 2) as usize);
    assert_eq!(counts, vec![3, 3]);
    assert_eq!(batch, vec![2, 4, 6, 5, 7, 1]);
}

#[test]
fn test_bucket_single_destination() {
    let mut batch = vec![3, 1, 2];
    let counts = bucket(&mut batch, 1, |_| 0);
    assert_eq!(counts, vec![3]);
    assert_eq!(batch, vec![3, 1, 2]);
}

#[test]
fn test_bucket_empty_destinations() {
    let mut batch = vec![10, 11];
    let counts = bucket(&mut batch, 4, |_| 2);
    assert_eq!(counts, vec![0, 0, 2, 0]);
}

#[test]
fn test_unique_keeps_first_occurrence() {
    let mut batch = vec![3, 1, 3, 2, 1];
    unique(&mut batch, false);
    assert_eq!(batch, vec![3, 1, 2]);
}

#[test]
fn test_unique_sorted_removes_adjacent() {
    let mut batch = vec![1, 1, 2, 3, 3, 3];
    unique(&mut batch, true);
    assert_eq!(batch, vec![1, 2, 3]);
}

// =============================================================================
// Collective Tests
// =============================================================================

#[test]
fn test_distribute_routes_to_owner() {
    let results = LocalGroup::run(4, |comm| {
        let partition = KeyToRank::new(comm.size(), Partitioning::HighBits, Config::default().hash_seeds);
        let rank = comm.rank() as u64;

        let mut batch: Vec<u64> = (0..400).filter(|key| key % 4 == rank).collect();
        let recv_counts = distribute(&comm, &mut batch, |key| partition.rank_of(key)).unwrap();

        assert_eq!(recv_counts.iter().sum::<usize>(), batch.len());
        assert!(batch.iter().all(|key| partition.rank_of(key) == comm.rank()));
        batch
    })
    .unwrap();

    let mut all: Vec<u64> = results.into_iter().flatten().collect();
    all.sort_unstable();
    assert_eq!(all, (0..400).collect::<Vec<_>>());
}

#[test]
fn test_distribute_preserves_duplicates() {
    let results = LocalGroup::run(3, |comm| {
        let mut batch = vec![(7u32, comm.rank() as u32); 2];
        distribute(&comm, &mut batch, |_| 0).unwrap();
        batch
    })
    .unwrap();

    assert_eq!(results[0].len(), 6);
    assert!(results[1].is_empty());
    assert!(results[2].is_empty());
}

#[test]
fn test_distribute_unique_dedups_per_origin_only() {
    let results = LocalGroup::run(3, |comm| {
        let mut batch = vec![9u32, 9, 9];
        let recv_counts = distribute_unique(&comm, &mut batch, |_| 1, false).unwrap();
        (recv_counts, batch)
    })
    .unwrap();

    // Each origin sends its key once; duplicates across origins remain
    assert_eq!(results[1].0, vec![1, 1, 1]);
    assert_eq!(results[1].1, vec![9, 9, 9]);
    assert!(results[0].1.is_empty());
}

#[test]
fn test_distribute_empty_batches() {
    let results = LocalGroup::run(3, |comm| {
        let mut batch: Vec<u64> = Vec::new();
        distribute(&comm, &mut batch, |_| 0).unwrap()
    })
    .unwrap();

    assert!(results.iter().all(|counts| counts == &vec![0, 0, 0]));
}
