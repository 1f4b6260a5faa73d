//! In-process group
//!
//! One endpoint per rank, one OS thread per endpoint, connected by crossbeam
//! channels. Sends are eager: the payload is handed to the destination's
//! inbox when posted, so a send request is complete as soon as it exists.
//! Receives match on (source, tag); anything else that arrives first is
//! stashed in a per-endpoint mailbox, preserving per-pair FIFO order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ahash::AHashMap;
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::{Communicator, RecvRequest, SendRequest, Tag, COLLECTIVE_TAG_BASE};
use crate::error::{Result, ShardMapError};

/// How often a blocked receive re-checks whether its source is still alive
const DEPARTURE_POLL: Duration = Duration::from_millis(50);

/// A message in flight
struct Envelope {
    source: usize,
    tag: Tag,
    payload: Bytes,
}

/// Group-wide state visible to every endpoint
struct Membership {
    /// `alive[r]` drops to false once rank r's endpoint is gone
    alive: Vec<AtomicBool>,
}

/// One rank's endpoint of a `LocalGroup`
pub struct LocalComm {
    rank: usize,

    /// Inbox senders of every rank, including this one
    peers: Vec<Sender<Envelope>>,

    /// This rank's inbox
    inbox: Receiver<Envelope>,

    /// Messages received while waiting for a different (source, tag)
    mailbox: Mutex<AHashMap<(usize, Tag), VecDeque<Bytes>>>,

    /// Sequence number of the next collective
    collective_seq: AtomicU32,

    membership: Arc<Membership>,
}

impl LocalComm {
    fn check_rank(&self, rank: usize) -> Result<()> {
        if rank >= self.peers.len() {
            return Err(ShardMapError::InvalidRank {
                rank,
                size: self.peers.len(),
            });
        }
        Ok(())
    }

    fn post(&self, dest: usize, tag: Tag, payload: Bytes) -> Result<()> {
        self.check_rank(dest)?;
        let envelope = Envelope {
            source: self.rank,
            tag,
            payload,
        };
        self.peers[dest].send(envelope).map_err(|_| {
            ShardMapError::Communication(format!(
                "rank {} cannot reach rank {}: endpoint dropped",
                self.rank, dest
            ))
        })
    }

    fn take_stashed(&self, source: usize, tag: Tag) -> Option<Bytes> {
        let mut mailbox = self.mailbox.lock();
        let queue = mailbox.get_mut(&(source, tag))?;
        let payload = queue.pop_front();
        if queue.is_empty() {
            mailbox.remove(&(source, tag));
        }
        payload
    }

    fn stash(&self, envelope: Envelope) {
        self.mailbox
            .lock()
            .entry((envelope.source, envelope.tag))
            .or_default()
            .push_back(envelope.payload);
    }

    fn source_departed(&self, source: usize) -> bool {
        source != self.rank && !self.membership.alive[source].load(Ordering::Acquire)
    }

    fn next_collective_tag(&self) -> Tag {
        let seq = self.collective_seq.fetch_add(1, Ordering::Relaxed);
        COLLECTIVE_TAG_BASE | (seq & !COLLECTIVE_TAG_BASE)
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn isend(&self, dest: usize, tag: Tag, payload: Bytes) -> Result<SendRequest> {
        self.post(dest, tag, payload)?;
        Ok(SendRequest::new(dest, tag))
    }

    fn irecv(&self, source: usize, tag: Tag) -> Result<RecvRequest> {
        self.check_rank(source)?;
        Ok(RecvRequest::new(source, tag))
    }

    fn wait_send(&self, request: SendRequest) -> Result<()> {
        // Eager delivery: posted means delivered.
        tracing::trace!(
            "rank {}: send to {} (tag {:#x}) complete",
            self.rank,
            request.dest(),
            request.tag()
        );
        Ok(())
    }

    fn wait_recv(&self, request: RecvRequest) -> Result<Bytes> {
        let (source, tag) = (request.source(), request.tag());

        if let Some(payload) = self.take_stashed(source, tag) {
            return Ok(payload);
        }

        loop {
            match self.inbox.recv_timeout(DEPARTURE_POLL) {
                Ok(envelope) if envelope.source == source && envelope.tag == tag => {
                    return Ok(envelope.payload);
                }
                Ok(envelope) => self.stash(envelope),
                Err(RecvTimeoutError::Timeout) => {
                    if !self.source_departed(source) {
                        continue;
                    }
                    // Anything the source sent before leaving is already queued
                    while let Ok(envelope) = self.inbox.try_recv() {
                        if envelope.source == source && envelope.tag == tag {
                            return Ok(envelope.payload);
                        }
                        self.stash(envelope);
                    }
                    return Err(ShardMapError::Communication(format!(
                        "rank {} left the group before sending tag {:#x} to rank {}",
                        source, tag, self.rank
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ShardMapError::Communication(format!(
                        "inbox of rank {} disconnected",
                        self.rank
                    )));
                }
            }
        }
    }

    fn all_to_all(&self, outgoing: Vec<Bytes>) -> Result<Vec<Bytes>> {
        let size = self.size();
        if outgoing.len() != size {
            return Err(ShardMapError::Protocol(format!(
                "all_to_all: {} payloads for group of size {}",
                outgoing.len(),
                size
            )));
        }

        let tag = self.next_collective_tag();
        for (dest, payload) in outgoing.into_iter().enumerate() {
            self.post(dest, tag, payload)?;
        }

        (0..size)
            .map(|source| self.wait_recv(RecvRequest::new(source, tag)))
            .collect()
    }
}

impl Drop for LocalComm {
    fn drop(&mut self) {
        self.membership.alive[self.rank].store(false, Ordering::Release);
    }
}

/// Factory for in-process groups
pub struct LocalGroup;

impl LocalGroup {
    /// Create the endpoints of a group of `size` ranks
    pub fn create(size: usize) -> Result<Vec<LocalComm>> {
        if size == 0 {
            return Err(ShardMapError::Config("group size must be at least 1".to_string()));
        }

        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| channel::unbounded()).unzip();

        let membership = Arc::new(Membership {
            alive: (0..size).map(|_| AtomicBool::new(true)).collect(),
        });

        Ok(receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalComm {
                rank,
                peers: senders.clone(),
                inbox,
                mailbox: Mutex::new(AHashMap::new()),
                collective_seq: AtomicU32::new(0),
                membership: Arc::clone(&membership),
            })
            .collect())
    }

    /// Run `worker` once per rank, each on its own thread, and collect the
    /// results in rank order.
    pub fn run<F, R>(size: usize, worker: F) -> Result<Vec<R>>
    where
        F: Fn(LocalComm) -> R + Sync,
        R: Send,
    {
        let endpoints = Self::create(size)?;
        let worker = &worker;

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(size);
            for comm in endpoints {
                let rank = comm.rank();
                let handle = thread::Builder::new()
                    .name(format!("rank-{}", rank))
                    .spawn_scoped(scope, move || worker(comm))
                    .map_err(|e| {
                        ShardMapError::Communication(format!("failed to spawn rank {}: {}", rank, e))
                    })?;
                handles.push((rank, handle));
            }

            handles
                .into_iter()
                .map(|(rank, handle)| {
                    handle.join().map_err(|_| {
                        tracing::error!("rank {} panicked", rank);
                        ShardMapError::WorkerPanicked(rank)
                    })
                })
                .collect()
        })
    }
}
