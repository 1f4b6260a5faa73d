//! Bulk exchange
//!
//! One all-to-all to deliver the queries, one local pass, one all-to-all to
//! return the results. Lowest latency, highest peak memory.

use crate::comm::{all_to_allv, Communicator, Wire};
use crate::distribute::distribute_unique;
use crate::error::Result;
use crate::query::LocalCompute;
use crate::store::Key;

use super::{ExchangeContext, ExchangeStrategy};

pub struct Bulk<'a, C, L, K, R> {
    ctx: ExchangeContext<'a, C, L>,

    /// Queries received, grouped by origin rank
    queries: Vec<K>,
    recv_counts: Vec<usize>,

    /// Results per origin rank, in `results` order
    send_counts: Vec<usize>,
    results: Vec<R>,
}

impl<'a, C, L, K, R> Bulk<'a, C, L, K, R> {
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

impl<'a, C, L, K, R> ExchangeStrategy<K, R> for Bulk<'a, C, L, K, R>
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
        Ok(1)
    }

    fn exchange_round(&mut self, _round: usize) -> Result<()> {
        let local = self.ctx.local;
        self.send_counts = Vec::with_capacity(self.recv_counts.len());

        let mut offset = 0;
        for &count in &self.recv_counts {
            let segment = &self.queries[offset..offset + count];
            self.send_counts.push(local.compute(segment, &mut self.results));
            offset += count;
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
