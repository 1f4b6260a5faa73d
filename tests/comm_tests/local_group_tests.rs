//! Local Group Tests
//!
//! Tests verify:
//! - Group creation and rank-ordered results
//! - All-to-all, barrier and typed collectives
//! - Tagged point-to-point matching with out-of-order arrival
//! - Departed peers and panicking workers surface as errors

use bytes::Bytes;
use shardmap::comm::{
    all_reduce_sum, all_to_all_counts, all_to_allv, decode_batch, encode_batch, send_recv,
    Communicator, LocalGroup,
};
use shardmap::ShardMapError;

// =============================================================================
// Group Tests
// =============================================================================

#[test]
fn test_run_returns_results_in_rank_order() {
    let ranks = LocalGroup::run(5, |comm| (comm.rank(), comm.size())).unwrap();
    assert_eq!(ranks, (0..5).map(|r| (r, 5)).collect::<Vec<_>>());
}

#[test]
fn test_empty_group_is_rejected() {
    let result = LocalGroup::create(0);
    assert!(matches!(result, Err(ShardMapError::Config(_))));
}

#[test]
fn test_single_rank_group() {
    let results = LocalGroup::run(1, |comm| {
        comm.barrier().unwrap();
        let echoed = comm.all_to_all(vec![Bytes::from_static(b"self")]).unwrap();
        echoed[0].clone()
    })
    .unwrap();
    assert_eq!(results[0], Bytes::from_static(b"self"));
}

#[test]
fn test_worker_panic_is_reported() {
    let result = LocalGroup::run(2, |comm| {
        if comm.rank() == 1 {
            panic!("boom");
        }
    });
    assert!(matches!(result, Err(ShardMapError::WorkerPanicked(1))));
}

// =============================================================================
// Collective Tests
// =============================================================================

#[test]
fn test_all_to_all_delivers_by_origin() {
    let results = LocalGroup::run(3, |comm| {
        let me = comm.rank();
        let outgoing = (0..comm.size())
            .map(|dest| Bytes::from(format!("{}->{}", me, dest)))
            .collect();
        comm.all_to_all(outgoing).unwrap()
    })
    .unwrap();

    for (rank, incoming) in results.iter().enumerate() {
        for (origin, payload) in incoming.iter().enumerate() {
            assert_eq!(payload, &Bytes::from(format!("{}->{}", origin, rank)));
        }
    }
}

#[test]
fn test_consecutive_collectives_do_not_mix() {
    let results = LocalGroup::run(4, |comm| {
        let mut seen = Vec::new();
        for round in 0..10u8 {
            let outgoing = vec![Bytes::from(vec![round]); comm.size()];
            let incoming = comm.all_to_all(outgoing).unwrap();
            assert!(incoming.iter().all(|p| p[..] == [round]));
            seen.push(round);
        }
        seen
    })
    .unwrap();
    assert!(results.iter().all(|seen| seen.len() == 10));
}

#[test]
fn test_all_to_allv_concatenates_in_origin_order() {
    let results = LocalGroup::run(3, |comm| {
        let me = comm.rank() as u32;
        // Rank r sends (r + 1) items to every destination
        let mut data = Vec::new();
        let mut counts = Vec::new();
        for dest in 0..comm.size() as u32 {
            for i in 0..=me {
                data.push((me, dest, i));
            }
            counts.push(me as usize + 1);
        }
        let recv_counts = all_to_allv(&comm, &mut data, &counts).unwrap();
        (recv_counts, data)
    })
    .unwrap();

    for (rank, (recv_counts, data)) in results.into_iter().enumerate() {
        assert_eq!(recv_counts, vec![1, 2, 3]);
        let origins: Vec<u32> = data.iter().map(|(origin, _, _)| *origin).collect();
        assert_eq!(origins, vec![0, 1, 1, 2, 2, 2]);
        assert!(data.iter().all(|(_, dest, _)| *dest as usize == rank));
    }
}

#[test]
fn test_all_to_allv_rejects_wrong_counts() {
    let results = LocalGroup::run(1, |comm| {
        let mut data = vec![1u32, 2, 3];
        all_to_allv(&comm, &mut data, &[2])
    })
    .unwrap();
    assert!(matches!(results[0], Err(ShardMapError::Protocol(_))));
}

#[test]
fn test_all_to_all_counts() {
    let results = LocalGroup::run(3, |comm| {
        let me = comm.rank();
        let counts: Vec<usize> = (0..comm.size()).map(|dest| me * 10 + dest).collect();
        all_to_all_counts(&comm, &counts).unwrap()
    })
    .unwrap();

    assert_eq!(results[0], vec![0, 10, 20]);
    assert_eq!(results[2], vec![2, 12, 22]);
}

#[test]
fn test_all_reduce_sum_pads_shorter_contributions() {
    let results = LocalGroup::run(3, |comm| {
        let values: Vec<u64> = vec![1; comm.rank() + 1];
        all_reduce_sum(&comm, &values).unwrap()
    })
    .unwrap();

    for sums in results {
        assert_eq!(sums, vec![3, 2, 1]);
    }
}

// =============================================================================
// Point-to-Point Tests
// =============================================================================

#[test]
fn test_receive_matches_tag_not_arrival_order() {
    let results = LocalGroup::run(2, |comm| {
        if comm.rank() == 0 {
            let first = comm.isend(1, 7, Bytes::from_static(b"seven")).unwrap();
            let second = comm.isend(1, 3, Bytes::from_static(b"three")).unwrap();
            comm.wait_send(first).unwrap();
            comm.wait_send(second).unwrap();
            Vec::new()
        } else {
            let three = comm.irecv(0, 3).unwrap();
            let seven = comm.irecv(0, 7).unwrap();
            vec![comm.wait_recv(three).unwrap(), comm.wait_recv(seven).unwrap()]
        }
    })
    .unwrap();

    assert_eq!(
        results[1],
        vec![Bytes::from_static(b"three"), Bytes::from_static(b"seven")]
    );
}

#[test]
fn test_requests_carry_their_address() {
    let results = LocalGroup::run(2, |comm| {
        let peer = 1 - comm.rank();
        let send = comm.isend(peer, 42, Bytes::from_static(b"ping")).unwrap();
        let recv = comm.irecv(peer, 42).unwrap();
        let addresses = (send.dest(), send.tag(), recv.source(), recv.tag());
        comm.wait_send(send).unwrap();
        comm.wait_recv(recv).unwrap();
        addresses
    })
    .unwrap();

    assert_eq!(results[0], (1, 42, 1, 42));
    assert_eq!(results[1], (0, 42, 0, 42));
}

#[test]
fn test_same_tag_messages_are_fifo() {
    let results = LocalGroup::run(2, |comm| {
        if comm.rank() == 0 {
            for i in 0..5u8 {
                let req = comm.isend(1, 1, Bytes::from(vec![i])).unwrap();
                comm.wait_send(req).unwrap();
            }
            Vec::new()
        } else {
            (0..5)
                .map(|_| {
                    let req = comm.irecv(0, 1).unwrap();
                    comm.wait_recv(req).unwrap()[0]
                })
                .collect()
        }
    })
    .unwrap();

    assert_eq!(results[1], vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_send_recv_ring() {
    let results = LocalGroup::run(4, |comm| {
        let size = comm.size();
        let me = comm.rank();
        let payload = encode_batch(&[me as u64]).unwrap();
        let reply = send_recv(&comm, (me + 1) % size, (me + size - 1) % size, 9, payload).unwrap();
        decode_batch::<u64>(&reply).unwrap()
    })
    .unwrap();

    assert_eq!(results, vec![vec![3], vec![0], vec![1], vec![2]]);
}

#[test]
fn test_invalid_rank_is_rejected() {
    let results = LocalGroup::run(2, |comm| comm.isend(5, 0, Bytes::new()).map(|_| ())).unwrap();
    assert!(matches!(
        results[0],
        Err(ShardMapError::InvalidRank { rank: 5, size: 2 })
    ));
}

#[test]
fn test_receive_from_departed_rank_fails() {
    let results = LocalGroup::run(2, |comm| {
        if comm.rank() == 0 {
            // Leaves without sending anything
            Ok(Bytes::new())
        } else {
            let req = comm.irecv(0, 42).unwrap();
            comm.wait_recv(req)
        }
    })
    .unwrap();

    assert!(matches!(results[1], Err(ShardMapError::Communication(_))));
}
