//! Typed collectives
//!
//! Helpers layered on top of any `Communicator`. Each one is a collective:
//! every rank of the group must call it, in the same order.

use bytes::Bytes;

use super::codec::{decode_batch, encode_batch, Wire};
use super::{Communicator, Tag};
use crate::error::{Result, ShardMapError};

/// Variable-length all-to-all exchange.
///
/// `data` holds `send_counts[i]` items for rank `i`, contiguous and in rank
/// order. On return `data` holds what every rank sent here, concatenated in
/// origin-rank order, and the per-origin counts are returned.
pub fn all_to_allv<C, T>(comm: &C, data: &mut Vec<T>, send_counts: &[usize]) -> Result<Vec<usize>>
where
    C: Communicator,
    T: Wire,
{
    let size = comm.size();
    if send_counts.len() != size {
        return Err(ShardMapError::Protocol(format!(
            "all_to_allv: {} send counts for group of size {}",
            send_counts.len(),
            size
        )));
    }

    let total: usize = send_counts.iter().sum();
    if total != data.len() {
        return Err(ShardMapError::Protocol(format!(
            "all_to_allv: send counts cover {} items, buffer holds {}",
            total,
            data.len()
        )));
    }

    // Encode one frame per destination
    let mut outgoing = Vec::with_capacity(size);
    let mut offset = 0;
    for &count in send_counts {
        outgoing.push(encode_batch(&data[offset..offset + count])?);
        offset += count;
    }

    // Outgoing items are owned by the frames now
    data.clear();
    data.shrink_to_fit();

    let incoming = comm.all_to_all(outgoing)?;

    let mut parts = Vec::with_capacity(size);
    for frame in &incoming {
        parts.push(decode_batch::<T>(frame)?);
    }
    drop(incoming);

    let received: usize = parts.iter().map(Vec::len).sum();
    data.try_reserve_exact(received)?;

    let mut recv_counts = Vec::with_capacity(size);
    for part in parts {
        recv_counts.push(part.len());
        data.extend(part);
    }

    Ok(recv_counts)
}

/// Exchange one count with every rank: `counts[i]` goes to rank `i`.
///
/// Returns the count each rank sent here, indexed by origin.
pub fn all_to_all_counts<C: Communicator>(comm: &C, counts: &[usize]) -> Result<Vec<usize>> {
    let size = comm.size();
    if counts.len() != size {
        return Err(ShardMapError::Protocol(format!(
            "all_to_all_counts: {} counts for group of size {}",
            counts.len(),
            size
        )));
    }

    let outgoing = counts
        .iter()
        .map(|&count| encode_batch(&[count as u64]))
        .collect::<Result<Vec<_>>>()?;

    let incoming = comm.all_to_all(outgoing)?;

    incoming
        .iter()
        .map(|frame| {
            let values: Vec<u64> = decode_batch(frame)?;
            match values.as_slice() {
                [count] => Ok(*count as usize),
                other => Err(ShardMapError::Protocol(format!(
                    "all_to_all_counts: expected 1 value, got {}",
                    other.len()
                ))),
            }
        })
        .collect()
}

/// Element-wise sum of `values` across the group.
///
/// Ranks may contribute vectors of different lengths; shorter ones count as
/// zero-padded. Every rank receives the same result.
pub fn all_reduce_sum<C: Communicator>(comm: &C, values: &[u64]) -> Result<Vec<u64>> {
    let frame = encode_batch(values)?;
    let outgoing = vec![frame; comm.size()];
    let incoming = comm.all_to_all(outgoing)?;

    let mut sums: Vec<u64> = Vec::new();
    for frame in &incoming {
        let contribution: Vec<u64> = decode_batch(frame)?;
        if contribution.len() > sums.len() {
            sums.resize(contribution.len(), 0);
        }
        for (sum, value) in sums.iter_mut().zip(contribution) {
            *sum += value;
        }
    }

    Ok(sums)
}

/// Blocking paired exchange: send to `dest` and receive from `source`
/// under the same tag.
pub fn send_recv<C: Communicator>(
    comm: &C,
    dest: usize,
    source: usize,
    tag: Tag,
    payload: Bytes,
) -> Result<Bytes> {
    let recv = comm.irecv(source, tag)?;
    let send = comm.isend(dest, tag, payload)?;
    comm.wait_send(send)?;
    comm.wait_recv(recv)
}

/// Displacements of contiguous segments with the given counts.
pub fn exclusive_prefix_sum(counts: &[usize]) -> Vec<usize> {
    let mut offset = 0;
    counts
        .iter()
        .map(|&count| {
            let start = offset;
            offset += count;
            start
        })
        .collect()
}
