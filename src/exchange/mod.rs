//! Exchange Strategies
//!
//! Route query keys to their owners, run a local computation there, and
//! bring the results back to the rank that asked.
//!
//! ## Phases
//! ```text
//! estimate ──► exchange_round(0) ──► ... ──► exchange_round(n-1) ──► finalize
//!  (distribute queries,             (compute + move results)         (last transfer,
//!   size buffers, return n)                                           hand over results)
//! ```
//!
//! ## Strategies
//! - `Bulk`: one all-to-all each way, single growable result buffer
//! - `CountThenRing`: exact counts first, then a ring of point-to-point rounds
//! - `Adaptive`: like `Bulk`, re-estimating the result buffer while computing
//! - `Pipelined`: ring rounds where each round's compute overlaps the
//!   previous round's transfer
//!
//! Every strategy returns the same multiset of results; only their order
//! and the memory profile differ.

mod adaptive;
mod bulk;
mod pipelined;
mod ring;

pub use adaptive::Adaptive;
pub use bulk::Bulk;
pub use pipelined::Pipelined;
pub use ring::CountThenRing;

use std::fmt;
use std::str::FromStr;

use crate::comm::{Communicator, Tag, Wire};
use crate::error::{Result, ShardMapError};
use crate::partition::KeyToRank;
use crate::query::LocalCompute;
use crate::store::Key;

/// Size handshakes of ring rounds
pub(crate) const SIZE_TAG: Tag = 1 << 24;

/// Result payloads of ring rounds
pub(crate) const DATA_TAG: Tag = 1 << 25;

/// Largest group the ring strategies serve: a round number must fit in the
/// tag bits below `SIZE_TAG`
pub const MAX_RING_RANKS: usize = SIZE_TAG as usize;

/// Which exchange a query uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Bulk,
    CountThenRing,
    Adaptive,
    Pipelined,
}

impl Strategy {
    /// Every strategy, in declaration order
    pub const ALL: [Strategy; 4] = [
        Strategy::Bulk,
        Strategy::CountThenRing,
        Strategy::Adaptive,
        Strategy::Pipelined,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Bulk => "bulk",
            Strategy::CountThenRing => "count-then-ring",
            Strategy::Adaptive => "adaptive",
            Strategy::Pipelined => "pipelined",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = ShardMapError;

    fn from_str(s: &str) -> Result<Self> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ShardMapError::Config(format!("unknown strategy: {}", s)))
    }
}

/// What a strategy needs from its caller
pub struct ExchangeContext<'a, C, L> {
    pub comm: &'a C,
    pub local: &'a L,
    pub partition: &'a KeyToRank,

    /// Queries arrive sorted by key
    pub sorted: bool,

    /// Over-estimation factor for re-sized result buffers
    pub headroom: f64,
}

impl<'a, C, L> ExchangeContext<'a, C, L> {
    pub fn new(comm: &'a C, local: &'a L, partition: &'a KeyToRank) -> Self {
        Self {
            comm,
            local,
            partition,
            sorted: false,
            headroom: 1.1,
        }
    }

    pub fn sorted(mut self, sorted: bool) -> Self {
        self.sorted = sorted;
        self
    }

    pub fn headroom(mut self, headroom: f64) -> Self {
        self.headroom = headroom;
        self
    }
}

/// Three-phase exchange of queries of type `K` for results of type `R`
pub trait ExchangeStrategy<K, R> {
    /// Distribute `queries` and size buffers; returns the number of rounds
    fn estimate(&mut self, queries: Vec<K>) -> Result<usize>;

    /// Run one round
    fn exchange_round(&mut self, round: usize) -> Result<()>;

    /// Complete outstanding transfers and hand over the results
    fn finalize(&mut self) -> Result<Vec<R>>;
}

/// Drive `strategy` through all of its phases
pub fn run_exchange<K, R, S>(strategy: &mut S, queries: Vec<K>) -> Result<Vec<R>>
where
    S: ExchangeStrategy<K, R>,
{
    let rounds = strategy.estimate(queries)?;
    for round in 0..rounds {
        strategy.exchange_round(round)?;
    }
    strategy.finalize()
}

/// Run `queries` through the exchange selected by `strategy`
pub fn exchange<C, L, K, R>(
    ctx: ExchangeContext<'_, C, L>,
    strategy: Strategy,
    queries: Vec<K>,
) -> Result<Vec<R>>
where
    C: Communicator,
    L: LocalCompute<K, R>,
    K: Key,
    R: Wire,
{
    tracing::debug!(
        "rank {}: {} exchange of {} queries",
        ctx.comm.rank(),
        strategy,
        queries.len()
    );

    let ring = matches!(strategy, Strategy::CountThenRing | Strategy::Pipelined);
    if ring && ctx.comm.size() > MAX_RING_RANKS {
        return Err(ShardMapError::Config(format!(
            "{} exchange supports at most {} ranks, group has {}",
            strategy,
            MAX_RING_RANKS,
            ctx.comm.size()
        )));
    }

    match strategy {
        Strategy::Bulk => run_exchange(&mut Bulk::new(ctx), queries),
        Strategy::CountThenRing => run_exchange(&mut CountThenRing::new(ctx), queries),
        Strategy::Adaptive => run_exchange(&mut Adaptive::new(ctx), queries),
        Strategy::Pipelined => run_exchange(&mut Pipelined::new(ctx), queries),
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Ring partners of `rank` in round `round`: (send to, receive from)
pub(crate) fn ring_partners(rank: usize, size: usize, round: usize) -> (usize, usize) {
    ((rank + round) % size, (rank + size - round % size) % size)
}

/// Tag of ring round `round` within the block starting at `base`
pub(crate) fn round_tag(base: Tag, round: usize) -> Tag {
    debug_assert!(round < MAX_RING_RANKS, "ring round {} overflows tag block", round);
    base | round as Tag
}

/// Reserve room for at least `target` items in total
pub(crate) fn reserve_total<T>(buffer: &mut Vec<T>, target: usize) -> Result<()> {
    if target > buffer.capacity() {
        buffer.try_reserve_exact(target - buffer.len())?;
    }
    Ok(())
}

/// `count` scaled by `factor`, rounded up
pub(crate) fn scaled(count: usize, factor: f64) -> usize {
    (count as f64 * factor).ceil() as usize
}
