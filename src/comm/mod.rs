//! Communication Module
//!
//! The group substrate the distributed map runs on.
//!
//! ## Responsibilities
//! - Rank-addressable, fixed-size peer set
//! - Variable-length all-to-all exchange and barrier
//! - Point-to-point tagged send/receive with non-blocking completion handles
//! - Typed framing of batches on the wire
//!
//! ## Delivery Model
//! Messages between one (source, tag) pair are delivered in the order they
//! were sent. Every collective must be entered by all ranks in the same order;
//! a rank that never arrives blocks its peers forever.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Count (4) │ CRC (4)  │      bincode(Vec<T>)        │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```

mod codec;
mod collective;
mod local;

pub use codec::{decode_batch, encode_batch, Wire, FRAME_HEADER_SIZE};
pub use collective::{all_reduce_sum, all_to_all_counts, all_to_allv, exclusive_prefix_sum, send_recv};
pub use local::{LocalComm, LocalGroup};

use bytes::Bytes;

use crate::error::Result;

/// Message tag for point-to-point traffic
pub type Tag = u32;

/// Tags at or above this value are reserved for collectives
pub const COLLECTIVE_TAG_BASE: Tag = 1 << 31;

/// Completion handle for a posted send
#[derive(Debug)]
#[must_use = "a send request must be waited on"]
pub struct SendRequest {
    dest: usize,
    tag: Tag,
}

impl SendRequest {
    pub fn new(dest: usize, tag: Tag) -> Self {
        Self { dest, tag }
    }

    pub fn dest(&self) -> usize {
        self.dest
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }
}

/// Completion handle for a posted receive
#[derive(Debug)]
#[must_use = "a receive request must be waited on"]
pub struct RecvRequest {
    source: usize,
    tag: Tag,
}

impl RecvRequest {
    pub fn new(source: usize, tag: Tag) -> Self {
        Self { source, tag }
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }
}

/// Inter-worker communication primitives.
///
/// Implementations own one endpoint of a fixed-size group. The map engine
/// only ever calls these from the single thread driving its rank. Ranks
/// spread over machines must run one build for one target, since key
/// ownership comes from a build-specific hash (see `KeyToRank`).
pub trait Communicator {
    /// Index of this endpoint within the group.
    fn rank(&self) -> usize;

    /// Number of endpoints in the group.
    fn size(&self) -> usize;

    /// Post a send of `payload` to `dest` under `tag`.
    fn isend(&self, dest: usize, tag: Tag, payload: Bytes) -> Result<SendRequest>;

    /// Post a receive from `source` under `tag`.
    fn irecv(&self, source: usize, tag: Tag) -> Result<RecvRequest>;

    /// Block until a posted send has completed.
    fn wait_send(&self, request: SendRequest) -> Result<()>;

    /// Block until a posted receive has completed and return its payload.
    fn wait_recv(&self, request: RecvRequest) -> Result<Bytes>;

    /// Send `outgoing[i]` to rank `i`; returns what every rank sent here,
    /// indexed by origin.
    fn all_to_all(&self, outgoing: Vec<Bytes>) -> Result<Vec<Bytes>>;

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<()> {
        let empty = vec![Bytes::new(); self.size()];
        self.all_to_all(empty).map(|_| ())
    }
}
