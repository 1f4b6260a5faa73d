//! Adaptive exchange
//!
//! Bulk exchange with a result buffer sized from the expected yield. Before
//! each origin's segment is computed, the projected size is checked against
//! the reservation; when it would overflow, the reservation is re-estimated
//! from the yield observed so far:
//!
//! ```text
//! target = produced / processed * total_queries * headroom
//! ```

use crate::comm::{all_to_allv, Communicator, Wire};
use crate::distribute::distribute_unique;
use crate::error::Result;
use crate::query::LocalCompute;
use crate::store::Key;

use super::{reserve_total, scaled, ExchangeContext, ExchangeStrategy};

pub struct Adaptive<'a, C, L, K, R> {
    ctx: ExchangeContext<'a, C, L>,
    queries: Vec<K>,
    recv_counts: Vec<usize>,
    send_counts: Vec<usize>,
    results: Vec<R>,
}

impl<'a, C, L, K, R> Adaptive<'a, C, L, K, R> {
    pub fn new(ctx: ExchangeContext<'a, C, L>) -> Self {
        Self {
            ctx,
            queries: Vec::new(),
            recv_counts: Vec::new(),
            send_counts: Vec::new(),
            results: Vec::new(),
        }
    }
}

impl<'a, C, L, K, R> ExchangeStrategy<K, R> for Adaptive<'a, C, L, K, R>
where
    C: Communicator,
    L: LocalCompute<K, R>,
    K: Key,
    R: Wire,
{
    fn estimate(&mut self, mut queries: Vec<K>) -> Result<usize> {
        let partition = self.ctx.partition;
        self.recv_counts = distribute_unique(
            self.ctx.comm,
            &mut queries,
            |key| partition.rank_of(key),
            self.ctx.sorted,
        )?;
        self.queries = queries;

        let expected = scaled(self.queries.len(), self.ctx.local.expected_yield());
        self.results.try_reserve_exact(expected)?;
        Ok(1)
    }

    fn exchange_round(&mut self, _round: usize) -> Result<()> {
        let local = self.ctx.local;
        let total = self.queries.len();
        self.send_counts = Vec::with_capacity(self.recv_counts.len());

        let mut processed = 0;
        for &count in &self.recv_counts {
            let observed = if processed == 0 {
                local.expected_yield()
            } else {
                self.results.len() as f64 / processed as f64
            };

            let projected = self.results.len() + scaled(count, observed);
            if projected > self.results.capacity() {
                let target = projected.max(scaled(total, observed * self.ctx.headroom));
                tracing::trace!(
                    "rank {}: re-estimated results at {} (yield {:.3}, {} of {} queries done)",
                    self.ctx.comm.rank(),
                    target,
                    observed,
                    processed,
                    total
                );
                reserve_total(&mut self.results, target)?;
            }

            let segment = &self.queries[processed..processed + count];
            self.send_counts.push(local.compute(segment, &mut self.results));
            processed += count;
        }

        self.queries = Vec::new();
        Ok(())
    }

    fn finalize(&mut self) -> Result<Vec<R>> {
        let mut results = std::mem::take(&mut self.results);
        all_to_allv(self.ctx.comm, &mut results, &self.send_counts)?;
        Ok(results)
    }
}
