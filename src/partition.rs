//! Key partitioning
//!
//! Maps a transformed key to the rank that owns it.
//!
//! ## Responsibilities
//! - Deterministic: every rank computes the same owner without talking
//! - Uniform: keys spread evenly over ranks
//! - Caller-supplied key transform, applied exactly once at ingestion
//!
//! The distribution hash is seeded separately from the local store's hash,
//! so keys that share an owner do not also share hash-table buckets.

use std::hash::{BuildHasher, Hash};

use ahash::RandomState;

/// Fibonacci hashing multiplier (2^64 / golden ratio)
const GOLDEN_RATIO: u64 = 0x9E37_79B9_7F4A_7C15;

/// How a 64-bit key hash is reduced to a rank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partitioning {
    /// Take the top `ceil(log2(size))` bits of the mixed hash; for sizes
    /// that are not a power of two, scale the hash into `[0, size)` by
    /// multiply-shift instead
    HighBits,

    /// Mixed hash modulo size
    Modulo,
}

/// Deterministic key-to-rank mapping for a fixed group size
///
/// Seeded ahash output is only fixed for one build of one ahash version on
/// one target. Every rank of a group must therefore run the same binary on
/// the same platform, or ranks disagree on key ownership.
#[derive(Clone)]
pub struct KeyToRank {
    size: usize,
    bits: u32,
    partitioning: Partitioning,
    hasher: RandomState,
}

impl KeyToRank {
    /// Create a mapping for a group of `size` ranks
    pub fn new(size: usize, partitioning: Partitioning, seeds: [u64; 4]) -> Self {
        let size = size.max(1);
        Self {
            size,
            bits: ceil_log2(size),
            partitioning,
            hasher: RandomState::with_seeds(seeds[0], seeds[1], seeds[2], seeds[3]),
        }
    }

    /// Owning rank of `key`
    #[inline]
    pub fn rank_of<K: Hash + ?Sized>(&self, key: &K) -> usize {
        if self.size == 1 {
            return 0;
        }

        let mixed = BuildHasher::hash_one(&self.hasher, key).wrapping_mul(GOLDEN_RATIO);
        match self.partitioning {
            Partitioning::HighBits if self.size.is_power_of_two() => {
                (mixed >> (64 - self.bits)) as usize
            }
            // multiply-shift: uniform over [0, size)
            Partitioning::HighBits => ((mixed as u128 * self.size as u128) >> 64) as usize,
            Partitioning::Modulo => (mixed % self.size as u64) as usize,
        }
    }

    /// Number of ranks keys are spread over
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of high hash bits used by `Partitioning::HighBits`
    pub fn prefix_bits(&self) -> u32 {
        self.bits
    }

    pub fn partitioning(&self) -> Partitioning {
        self.partitioning
    }
}

impl std::fmt::Debug for KeyToRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyToRank")
            .field("size", &self.size)
            .field("bits", &self.bits)
            .field("partitioning", &self.partitioning)
            .finish()
    }
}

fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

// =============================================================================
// Key Transforms
// =============================================================================

/// Transform applied to every key once, when it enters a collective call.
///
/// Must be identical on every rank. Typical use: mapping a k-mer to its
/// canonical form so both strands land on the same owner.
pub trait KeyTransform<K> {
    fn transform(&self, key: K) -> K;
}

/// Leaves keys untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<K> KeyTransform<K> for Identity {
    #[inline]
    fn transform(&self, key: K) -> K {
        key
    }
}

impl<K, F> KeyTransform<K> for F
where
    F: Fn(K) -> K,
{
    #[inline]
    fn transform(&self, key: K) -> K {
        self(key)
    }
}
