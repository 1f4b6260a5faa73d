//! Count-then-ring exchange
//!
//! Result sizes are exchanged first, so the receive buffer is allocated
//! exactly once. Results then travel point-to-point in `size` rounds:
//!
//! ```text
//! round i:  rank r ──► (r + i) mod size
//!           rank r ◄── (r - i) mod size
//! ```
//!
//! Each round's payload is computed right before it is sent, so at most one
//! round of outgoing results exists at a time.

use crate::comm::{
    all_to_all_counts, decode_batch, encode_batch, exclusive_prefix_sum, Communicator, Wire,
};
use crate::distribute::distribute_unique;
use crate::error::{Result, ShardMapError};
use crate::query::LocalCompute;
use crate::store::Key;

use super::{ring_partners, round_tag, ExchangeContext, ExchangeStrategy, DATA_TAG};

pub struct CountThenRing<'a, C, L, K, R> {
    ctx: ExchangeContext<'a, C, L>,

    /// Queries received, grouped by origin rank
    queries: Vec<K>,
    recv_counts: Vec<usize>,
    offsets: Vec<usize>,

    /// Results this rank will send to each origin
    answer_counts: Vec<usize>,

    /// Results each rank will send here
    expected_counts: Vec<usize>,

    results: Vec<R>,
}

impl<'a, C, L, K, R> CountThenRing<'a, C, L, K, R> {
    pub fn new(ctx: ExchangeContext<'a, C, L>) -> Self {
        Self {
            ctx,
            queries: Vec::new(),
            recv_counts: Vec::new(),
            offsets: Vec::new(),
            answer_counts: Vec::new(),
            expected_counts: Vec::new(),
            results: Vec::new(),
        }
    }
}

impl<'a, C, L, K, R> ExchangeStrategy<K, R> for CountThenRing<'a, C, L, K, R>
where
    C: Communicator,
    L: LocalCompute<K, R>,
    K: Key,
    R: Wire,
{
    fn estimate(&mut self, mut queries: Vec<K>) -> Result<usize> {
        let comm = self.ctx.comm;
        let partition = self.ctx.partition;

        self.recv_counts = distribute_unique(
            comm,
            &mut queries,
            |key| partition.rank_of(key),
            self.ctx.sorted,
        )?;
        self.offsets = exclusive_prefix_sum(&self.recv_counts);
        self.queries = queries;

        self.answer_counts = self
            .offsets
            .iter()
            .zip(&self.recv_counts)
            .map(|(&start, &count)| {
                self.ctx
                    .local
                    .result_count(&self.queries[start..start + count])
            })
            .collect();

        self.expected_counts = all_to_all_counts(comm, &self.answer_counts)?;
        let total: usize = self.expected_counts.iter().sum();
        self.results.try_reserve_exact(total)?;

        tracing::trace!(
            "rank {}: expecting {} results over {} rounds",
            comm.rank(),
            total,
            comm.size()
        );

        Ok(comm.size())
    }

    fn exchange_round(&mut self, round: usize) -> Result<()> {
        let comm = self.ctx.comm;
        let (send_to, recv_from) = ring_partners(comm.rank(), comm.size(), round);
        let tag = round_tag(DATA_TAG, round);

        let recv = comm.irecv(recv_from, tag)?;

        let start = self.offsets[send_to];
        let segment = &self.queries[start..start + self.recv_counts[send_to]];
        let mut payload = Vec::new();
        payload.try_reserve_exact(self.answer_counts[send_to])?;
        self.ctx.local.compute(segment, &mut payload);
        let send = comm.isend(send_to, tag, encode_batch(&payload)?)?;
        drop(payload);

        comm.wait_send(send)?;
        let frame = comm.wait_recv(recv)?;
        let incoming: Vec<R> = decode_batch(&frame)?;

        let expected = self.expected_counts[recv_from];
        if incoming.len() != expected {
            return Err(ShardMapError::Protocol(format!(
                "rank {} announced {} results, sent {}",
                recv_from,
                expected,
                incoming.len()
            )));
        }

        tracing::trace!(
            "rank {}: round {} sent to {}, received {} results from {}",
            comm.rank(),
            round,
            send_to,
            incoming.len(),
            recv_from
        );

        self.results.extend(incoming);
        Ok(())
    }

    fn finalize(&mut self) -> Result<Vec<R>> {
        self.queries = Vec::new();
        Ok(std::mem::take(&mut self.results))
    }
}
