//! Pipelined ring exchange
//!
//! Queries are deduplicated once and distributed without a second pass.
//! Results then move in `size` ring rounds, each overlapping its compute
//! with the previous round's transfer:
//!
//! ```text
//! round i:  compute(i) ─► wait(i-1) ─► handshake(i) ─► grow ─► post(i)
//!                                                              │
//! finalize:                                        wait(last) ◄┘
//! ```
//!
//! The handshake exchanges `[queries answered, results found]` with the
//! ring partners, so the receiver can size its buffer before the payload
//! is posted.

use crate::comm::{
    all_to_allv, decode_batch, encode_batch, exclusive_prefix_sum, send_recv, Communicator,
    RecvRequest, SendRequest, Wire,
};
use crate::distribute::{bucket, unique};
use crate::error::{Result, ShardMapError};
use crate::query::LocalCompute;
use crate::store::Key;

use super::{
    reserve_total, ring_partners, round_tag, scaled, ExchangeContext, ExchangeStrategy, DATA_TAG,
    SIZE_TAG,
};

/// A round whose transfer has been posted but not waited on
struct InFlight {
    send: SendRequest,
    recv: RecvRequest,
    source: usize,
    expected: usize,
}

pub struct Pipelined<'a, C, L, K, R> {
    ctx: ExchangeContext<'a, C, L>,

    /// Distinct queries this rank issued
    issued: usize,

    /// Queries this rank sent to each owner
    send_counts: Vec<usize>,

    /// Queries received, grouped by origin rank
    queries: Vec<K>,
    recv_counts: Vec<usize>,
    offsets: Vec<usize>,

    /// Own queries the owners have answered so far
    answered: usize,

    pending: Option<InFlight>,
    results: Vec<R>,
}

impl<'a, C, L, K, R> Pipelined<'a, C, L, K, R> {
    pub fn new(ctx: ExchangeContext<'a, C, L>) -> Self {
        Self {
            ctx,
            issued: 0,
            send_counts: Vec::new(),
            queries: Vec::new(),
            recv_counts: Vec::new(),
            offsets: Vec::new(),
            answered: 0,
            pending: None,
            results: Vec::new(),
        }
    }
}

impl<'a, C, L, K, R> Pipelined<'a, C, L, K, R>
where
    C: Communicator,
    L: LocalCompute<K, R>,
    R: Wire,
{
    /// Wait for the previous round's transfer and append what it delivered
    fn complete_pending(&mut self) -> Result<()> {
        let Some(flight) = self.pending.take() else {
            return Ok(());
        };

        let comm = self.ctx.comm;
        comm.wait_send(flight.send)?;
        let frame = comm.wait_recv(flight.recv)?;
        let incoming: Vec<R> = decode_batch(&frame)?;

        if incoming.len() != flight.expected {
            return Err(ShardMapError::Protocol(format!(
                "rank {} announced {} results, sent {}",
                flight.source,
                flight.expected,
                incoming.len()
            )));
        }

        self.results.extend(incoming);
        Ok(())
    }

    /// Make room for `incoming` more results, re-estimating from the yield
    /// observed so far when the buffer is too small
    fn grow(&mut self, incoming: usize) -> Result<()> {
        let needed = self.results.len() + incoming;
        if needed <= self.results.capacity() {
            return Ok(());
        }

        let observed = if self.answered == 0 {
            self.ctx.local.expected_yield()
        } else {
            needed as f64 / self.answered as f64
        };
        let target = needed.max(scaled(self.issued, observed * self.ctx.headroom));

        tracing::trace!(
            "rank {}: growing results to {} (yield {:.3}, {} of {} queries answered)",
            self.ctx.comm.rank(),
            target,
            observed,
            self.answered,
            self.issued
        );

        reserve_total(&mut self.results, target)
    }
}

impl<'a, C, L, K, R> ExchangeStrategy<K, R> for Pipelined<'a, C, L, K, R>
where
    C: Communicator,
    L: LocalCompute<K, R>,
    K: Key,
    R: Wire,
{
    fn estimate(&mut self, mut queries: Vec<K>) -> Result<usize> {
        let comm = self.ctx.comm;
        let partition = self.ctx.partition;

        unique(&mut queries, self.ctx.sorted);
        self.issued = queries.len();

        self.send_counts = bucket(&mut queries, comm.size(), |key| partition.rank_of(key));
        self.recv_counts = all_to_allv(comm, &mut queries, &self.send_counts)?;
        self.offsets = exclusive_prefix_sum(&self.recv_counts);
        self.queries = queries;

        let expected = scaled(self.issued, self.ctx.local.expected_yield());
        self.results.try_reserve_exact(expected)?;
        Ok(comm.size())
    }

    fn exchange_round(&mut self, round: usize) -> Result<()> {
        let comm = self.ctx.comm;
        let (send_to, recv_from) = ring_partners(comm.rank(), comm.size(), round);

        // Compute while the previous round is still in flight
        let start = self.offsets[send_to];
        let count = self.recv_counts[send_to];
        let mut payload = Vec::new();
        let found = self
            .ctx
            .local
            .compute(&self.queries[start..start + count], &mut payload);
        let frame = encode_batch(&payload)?;
        drop(payload);

        self.complete_pending()?;

        let header = encode_batch(&[count as u64, found as u64])?;
        let reply = send_recv(comm, send_to, recv_from, round_tag(SIZE_TAG, round), header)?;
        let sizes: Vec<u64> = decode_batch(&reply)?;
        let (answered, incoming) = match sizes.as_slice() {
            [answered, incoming] => (*answered as usize, *incoming as usize),
            other => {
                return Err(ShardMapError::Protocol(format!(
                    "size handshake from rank {} carried {} values",
                    recv_from,
                    other.len()
                )))
            }
        };

        if answered != self.send_counts[recv_from] {
            return Err(ShardMapError::Protocol(format!(
                "rank {} answered {} queries, {} were sent",
                recv_from, answered, self.send_counts[recv_from]
            )));
        }
        self.answered += answered;
        self.grow(incoming)?;

        let tag = round_tag(DATA_TAG, round);
        let recv = comm.irecv(recv_from, tag)?;
        let send = comm.isend(send_to, tag, frame)?;
        self.pending = Some(InFlight {
            send,
            recv,
            source: recv_from,
            expected: incoming,
        });

        tracing::trace!(
            "rank {}: round {} posted {} results to {}, expecting {} from {}",
            comm.rank(),
            round,
            found,
            send_to,
            incoming,
            recv_from
        );
        Ok(())
    }

    fn finalize(&mut self) -> Result<Vec<R>> {
        self.complete_pending()?;
        self.queries = Vec::new();

        let mut results = std::mem::take(&mut self.results);
        results.shrink_to_fit();
        Ok(results)
    }
}
