//! Merge policies
//!
//! Decide what happens when an entry arrives at a key. Chosen once, as a
//! type parameter of the map.

use std::hash::Hash;
use std::ops::Add;

use ahash::{AHashMap, AHashSet};

/// How an arriving value combines with a key's slot
pub trait MergePolicy<V>: Send {
    /// Merge `incoming` into `slot` (which may be empty for a new key)
    fn merge(&self, slot: &mut Vec<V>, incoming: V);

    /// What one stored value adds to its key's count
    fn weight(&self, _value: &V) -> usize {
        1
    }

    /// Pass over an outgoing insert batch before it is distributed
    fn prepare<K>(&self, _batch: &mut Vec<(K, V)>)
    where
        K: Hash + Eq + Clone,
    {
    }
}

/// At most one value per key; the newest arrival wins
#[derive(Debug, Clone, Copy, Default)]
pub struct Overwrite;

impl<V: Send> MergePolicy<V> for Overwrite {
    fn merge(&self, slot: &mut Vec<V>, incoming: V) {
        match slot.first_mut() {
            Some(current) => *current = incoming,
            None => slot.push(incoming),
        }
    }

    /// Keep only the last occurrence of each key
    fn prepare<K>(&self, batch: &mut Vec<(K, V)>)
    where
        K: Hash + Eq + Clone,
    {
        let mut seen = AHashSet::with_capacity(batch.len());
        let mut kept = Vec::with_capacity(batch.len());
        for (key, value) in batch.drain(..).rev() {
            if seen.insert(key.clone()) {
                kept.push((key, value));
            }
        }
        kept.reverse();
        *batch = kept;
    }
}

/// Any number of values per key
#[derive(Debug, Clone, Copy, Default)]
pub struct Append;

impl<V: Send> MergePolicy<V> for Append {
    fn merge(&self, slot: &mut Vec<V>, incoming: V) {
        slot.push(incoming);
    }
}

/// One value per key, folded with a binary operator as `op(existing, incoming)`.
///
/// The operator is not assumed associative or commutative, but the local
/// pre-fold before distribution regroups operands: results are only
/// independent of how a batch was split across ranks when it is both.
#[derive(Clone, Copy)]
pub struct Fold<F> {
    op: F,
}

impl<F> Fold<F> {
    pub fn new(op: F) -> Self {
        Self { op }
    }
}

impl<V, F> MergePolicy<V> for Fold<F>
where
    V: Arithmetic,
    F: Fn(V, V) -> V + Send,
{
    fn merge(&self, slot: &mut Vec<V>, incoming: V) {
        fold_into(slot, incoming, &self.op);
    }

    fn prepare<K>(&self, batch: &mut Vec<(K, V)>)
    where
        K: Hash + Eq + Clone,
    {
        prefold(batch, &self.op);
    }
}

/// Integer or floating-point sum; the counting map's policy
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl<V: Arithmetic> MergePolicy<V> for Sum {
    fn merge(&self, slot: &mut Vec<V>, incoming: V) {
        fold_into(slot, incoming, &|a: V, b: V| a + b);
    }

    /// The stored value is itself a count
    fn weight(&self, value: &V) -> usize {
        usize::try_from(value.as_u64()).unwrap_or(usize::MAX)
    }

    fn prepare<K>(&self, batch: &mut Vec<(K, V)>)
    where
        K: Hash + Eq + Clone,
    {
        prefold(batch, &|a: V, b: V| a + b);
    }
}

fn fold_into<V: Copy>(slot: &mut Vec<V>, incoming: V, op: &impl Fn(V, V) -> V) {
    match slot.first_mut() {
        Some(current) => *current = op(*current, incoming),
        None => slot.push(incoming),
    }
}

/// Combine identical keys of a batch in place, in batch order
fn prefold<K, V>(batch: &mut Vec<(K, V)>, op: &impl Fn(V, V) -> V)
where
    K: Hash + Eq + Clone,
    V: Copy,
{
    let mut index: AHashMap<K, usize> = AHashMap::with_capacity(batch.len());
    let mut folded: Vec<(K, V)> = Vec::with_capacity(batch.len());

    for (key, value) in batch.drain(..) {
        match index.get(&key) {
            Some(&at) => {
                let current = &mut folded[at].1;
                *current = op(*current, value);
            }
            None => {
                index.insert(key.clone(), folded.len());
                folded.push((key, value));
            }
        }
    }

    *batch = folded;
}

// =============================================================================
// Arithmetic value types
// =============================================================================

mod sealed {
    pub trait Sealed {}
}

/// Value types a reduction or counting map accepts.
///
/// Sealed: implemented for the primitive numeric types only, so a map over
/// a non-arithmetic value type fails to compile instead of failing at runtime.
pub trait Arithmetic:
    sealed::Sealed + Copy + PartialOrd + Add<Output = Self> + Send + 'static
{
    /// The implicit value of a counted key
    fn one() -> Self;

    /// Lossy conversion used by counts and histograms; negatives clamp to 0
    fn as_u64(self) -> u64;
}

macro_rules! impl_arithmetic {
    ($($ty:ty => $one:expr),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Arithmetic for $ty {
                #[inline]
                fn one() -> Self {
                    $one
                }

                #[inline]
                fn as_u64(self) -> u64 {
                    if self < $one - $one {
                        0
                    } else {
                        self as u64
                    }
                }
            }
        )*
    };
}

impl_arithmetic!(
    u8 => 1, u16 => 1, u32 => 1, u64 => 1, usize => 1,
    i8 => 1, i16 => 1, i32 => 1, i64 => 1, isize => 1,
    f32 => 1.0, f64 => 1.0,
);
