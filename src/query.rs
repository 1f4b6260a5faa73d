//! Query Processor
//!
//! Applies one local operation to each key of a query range.
//!
//! ## Responsibilities
//! - Invoke the operation once per key, including keys with no match
//! - Two-stage filtering: a range predicate over all values of a key (may
//!   reject the key outright), then an element predicate per value
//! - Report how many results a range would produce without producing them
//!
//! ## Operations
//! - `FindElement`: emits (key, value) per surviving value
//! - `CountElement`: emits exactly one (key, count) per key, possibly 0,
//!   weighted by the map's merge policy
//! - `EraseElement`: emits nothing, returns entries removed

use crate::comm::Wire;
use crate::store::{LocalStore, MergePolicy};

// =============================================================================
// Predicates
// =============================================================================

/// Filter evaluated on the values of a key during a query or insert
pub trait Predicate<K, V> {
    /// Cheap check over every value stored under `key`; false rejects the key
    fn accept_range(&self, _key: &K, _values: &[V]) -> bool {
        true
    }

    /// Check on a single value
    fn accept(&self, _key: &K, _value: &V) -> bool {
        true
    }

    /// True when the predicate accepts everything
    fn accepts_all(&self) -> bool {
        false
    }
}

/// Accepts every key and value
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl<K, V> Predicate<K, V> for AcceptAll {
    fn accepts_all(&self) -> bool {
        true
    }
}

/// Element predicate from a closure
impl<K, V, F> Predicate<K, V> for F
where
    F: Fn(&K, &V) -> bool,
{
    fn accept(&self, key: &K, value: &V) -> bool {
        self(key, value)
    }
}

/// A range predicate paired with an element predicate
#[derive(Debug, Clone, Copy)]
pub struct RangeAndElement<R, E> {
    range: R,
    element: E,
}

impl<R, E> RangeAndElement<R, E> {
    pub fn new(range: R, element: E) -> Self {
        Self { range, element }
    }
}

impl<K, V, R, E> Predicate<K, V> for RangeAndElement<R, E>
where
    R: Fn(&K, &[V]) -> bool,
    E: Fn(&K, &V) -> bool,
{
    fn accept_range(&self, key: &K, values: &[V]) -> bool {
        (self.range)(key, values)
    }

    fn accept(&self, key: &K, value: &V) -> bool {
        (self.element)(key, value)
    }
}

// =============================================================================
// Operations
// =============================================================================

/// A read-only per-key operation against a local store
pub trait Operation<S: LocalStore> {
    type Output: Wire;

    /// Run the operation for `key`, appending results to `out`; returns the
    /// number of results appended
    fn apply<P>(&self, store: &S, key: &S::Key, out: &mut Vec<Self::Output>, pred: &P) -> usize
    where
        P: Predicate<S::Key, S::Value>;

    /// Number of results `apply` would append, without building them
    fn result_count<P>(&self, store: &S, key: &S::Key, pred: &P) -> usize
    where
        P: Predicate<S::Key, S::Value>;

    /// Average results per query this store is expected to produce
    fn expected_yield(&self, store: &S) -> f64;
}

/// Emits every stored (key, value) passing the predicate
#[derive(Debug, Clone, Copy, Default)]
pub struct FindElement;

impl<S: LocalStore> Operation<S> for FindElement {
    type Output = (S::Key, S::Value);

    fn apply<P>(&self, store: &S, key: &S::Key, out: &mut Vec<Self::Output>, pred: &P) -> usize
    where
        P: Predicate<S::Key, S::Value>,
    {
        let values = store.equal_range(key);
        if values.is_empty() || !pred.accept_range(key, values) {
            return 0;
        }

        let before = out.len();
        out.extend(
            values
                .iter()
                .filter(|value| pred.accept(key, value))
                .map(|value| (key.clone(), value.clone())),
        );
        out.len() - before
    }

    fn result_count<P>(&self, store: &S, key: &S::Key, pred: &P) -> usize
    where
        P: Predicate<S::Key, S::Value>,
    {
        let values = store.equal_range(key);
        if values.is_empty() || !pred.accept_range(key, values) {
            return 0;
        }
        if pred.accepts_all() {
            return values.len();
        }
        values.iter().filter(|value| pred.accept(key, value)).count()
    }

    fn expected_yield(&self, store: &S) -> f64 {
        match store.unique_len() {
            0 => 1.0,
            unique => store.len() as f64 / unique as f64,
        }
    }
}

/// Emits one (key, count) per queried key.
///
/// Each surviving value adds the map policy's weight for it: one for most
/// maps, the stored total for a counting map.
#[derive(Debug, Clone, Copy)]
pub struct CountElement<'a, M> {
    policy: &'a M,
}

impl<'a, M> CountElement<'a, M> {
    pub fn new(policy: &'a M) -> Self {
        Self { policy }
    }
}

impl<'a, S, M> Operation<S> for CountElement<'a, M>
where
    S: LocalStore,
    M: MergePolicy<S::Value>,
{
    type Output = (S::Key, usize);

    fn apply<P>(&self, store: &S, key: &S::Key, out: &mut Vec<Self::Output>, pred: &P) -> usize
    where
        P: Predicate<S::Key, S::Value>,
    {
        let values = store.equal_range(key);
        let count = if values.is_empty() || !pred.accept_range(key, values) {
            0
        } else {
            values
                .iter()
                .filter(|value| pred.accepts_all() || pred.accept(key, value))
                .fold(0usize, |count, value| {
                    count.saturating_add(self.policy.weight(value))
                })
        };
        out.push((key.clone(), count));
        1
    }

    fn result_count<P>(&self, _store: &S, _key: &S::Key, _pred: &P) -> usize
    where
        P: Predicate<S::Key, S::Value>,
    {
        1
    }

    fn expected_yield(&self, _store: &S) -> f64 {
        1.0
    }
}

/// Removes the values of a key that pass the predicate
#[derive(Debug, Clone, Copy, Default)]
pub struct EraseElement;

impl EraseElement {
    /// Erase under `key`; returns entries removed
    pub fn apply<S, P>(&self, store: &mut S, key: &S::Key, pred: &P) -> usize
    where
        S: LocalStore,
        P: Predicate<S::Key, S::Value>,
    {
        if pred.accepts_all() {
            return store.erase_key(key);
        }

        let values = store.equal_range(key);
        if values.is_empty() || !pred.accept_range(key, values) {
            return 0;
        }
        store.erase_values(key, |value| pred.accept(key, value))
    }
}

// =============================================================================
// Processor
// =============================================================================

/// Local computation an exchange strategy runs on the queries it received
pub trait LocalCompute<K, R> {
    /// Append the results for `queries` to `out`; returns how many were appended
    fn compute(&self, queries: &[K], out: &mut Vec<R>) -> usize;

    /// How many results `compute` would append for `queries`
    fn result_count(&self, queries: &[K]) -> usize;

    /// Average results per query, as observed from the local store
    fn expected_yield(&self) -> f64;
}

/// Binds a store, an operation and a predicate
pub struct QueryProcessor<'a, S, Op, P> {
    store: &'a S,
    op: &'a Op,
    pred: &'a P,
}

impl<'a, S, Op, P> QueryProcessor<'a, S, Op, P>
where
    S: LocalStore,
    Op: Operation<S>,
    P: Predicate<S::Key, S::Value>,
{
    pub fn new(store: &'a S, op: &'a Op, pred: &'a P) -> Self {
        Self { store, op, pred }
    }

    /// Apply the operation to every key in `keys`; returns results emitted
    pub fn process(&self, keys: &[S::Key], out: &mut Vec<Op::Output>) -> usize {
        keys.iter()
            .map(|key| self.op.apply(self.store, key, out, self.pred))
            .sum()
    }
}

impl<'a, S, Op, P> LocalCompute<S::Key, Op::Output> for QueryProcessor<'a, S, Op, P>
where
    S: LocalStore,
    Op: Operation<S>,
    P: Predicate<S::Key, S::Value>,
{
    fn compute(&self, queries: &[S::Key], out: &mut Vec<Op::Output>) -> usize {
        self.process(queries, out)
    }

    fn result_count(&self, queries: &[S::Key]) -> usize {
        queries
            .iter()
            .map(|key| self.op.result_count(self.store, key, self.pred))
            .sum()
    }

    fn expected_yield(&self) -> f64 {
        self.op.expected_yield(self.store)
    }
}

/// Erase every key in `keys` from `store`; returns entries removed
pub fn process_erase<S, P>(store: &mut S, keys: &[S::Key], pred: &P) -> usize
where
    S: LocalStore,
    P: Predicate<S::Key, S::Value>,
{
    let op = EraseElement;
    keys.iter().map(|key| op.apply(store, key, pred)).sum()
}
