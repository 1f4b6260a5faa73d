//! Partition Tests
//!
//! Tests verify:
//! - Owners are deterministic and in range
//! - Keys spread roughly evenly over ranks
//! - Key transforms

use shardmap::config::Config;
use shardmap::partition::{Identity, KeyToRank, KeyTransform, Partitioning};

fn partition(size: usize, partitioning: Partitioning) -> KeyToRank {
    KeyToRank::new(size, partitioning, Config::default().hash_seeds)
}

// =============================================================================
// Mapping Tests
// =============================================================================

#[test]
fn test_single_rank_owns_everything() {
    let p = partition(1, Partitioning::HighBits);
    assert!((0..1000u64).all(|key| p.rank_of(&key) == 0));
    assert_eq!(p.prefix_bits(), 0);
}

#[test]
fn test_owner_is_deterministic() {
    let a = partition(7, Partitioning::HighBits);
    let b = partition(7, Partitioning::HighBits);
    for key in 0..1000u64 {
        assert_eq!(a.rank_of(&key), b.rank_of(&key));
    }
}

#[test]
fn test_owner_in_range_for_every_size() {
    for size in 1..=17 {
        for partitioning in [Partitioning::HighBits, Partitioning::Modulo] {
            let p = partition(size, partitioning);
            assert!((0..500u64).all(|key| p.rank_of(&key) < size));
        }
    }
}

#[test]
fn test_prefix_bits() {
    assert_eq!(partition(2, Partitioning::HighBits).prefix_bits(), 1);
    assert_eq!(partition(4, Partitioning::HighBits).prefix_bits(), 2);
    assert_eq!(partition(5, Partitioning::HighBits).prefix_bits(), 3);
}

#[test]
fn test_keys_spread_over_ranks() {
    for size in [3usize, 4, 6] {
        for partitioning in [Partitioning::HighBits, Partitioning::Modulo] {
            let p = partition(size, partitioning);
            let mut counts = vec![0usize; size];
            for key in 0..60_000u64 {
                counts[p.rank_of(&key)] += 1;
            }
            let expected = 60_000 / size;
            for count in counts {
                assert!(
                    count > expected * 8 / 10 && count < expected * 12 / 10,
                    "size {} {:?}: {} keys, expected about {}",
                    size,
                    partitioning,
                    count,
                    expected
                );
            }
        }
    }
}

#[test]
fn test_seeds_change_placement() {
    let a = KeyToRank::new(8, Partitioning::HighBits, [1, 2, 3, 4]);
    let b = KeyToRank::new(8, Partitioning::HighBits, [5, 6, 7, 8]);
    let moved = (0..1000u64)
        .filter(|key| a.rank_of(key) != b.rank_of(key))
        .count();
    assert!(moved > 500);
}

// =============================================================================
// Transform Tests
// =============================================================================

#[test]
fn test_identity_transform() {
    assert_eq!(Identity.transform(42u32), 42);
}

#[test]
fn test_closure_transform() {
    // Canonical form of a pair: smaller element first
    let canonical = |(a, b): (u8, u8)| if a <= b { (a, b) } else { (b, a) };
    assert_eq!(canonical.transform((3, 1)), (1, 3));
    assert_eq!(canonical.transform((1, 3)), (1, 3));
}
