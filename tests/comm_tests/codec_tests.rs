//! Codec Tests
//!
//! Tests for batch framing on the wire.

use shardmap::comm::{decode_batch, encode_batch, FRAME_HEADER_SIZE};
use shardmap::ShardMapError;

// =============================================================================
// Frame Layout Tests
// =============================================================================

#[test]
fn test_header_carries_item_count() {
    let frame = encode_batch(&[10u64, 20, 30]).unwrap();
    assert!(frame.len() > FRAME_HEADER_SIZE);
    assert_eq!(&frame[0..4], &3u32.to_be_bytes());
}

#[test]
fn test_header_carries_payload_crc() {
    let frame = encode_batch(&[(1u32, 2u32)]).unwrap();
    let crc = crc32fast::hash(&frame[FRAME_HEADER_SIZE..]);
    assert_eq!(&frame[4..8], &crc.to_be_bytes());
}

#[test]
fn test_decode_tuples() {
    let items = vec![(7u64, "seven".to_string()), (8, "eight".to_string())];
    let frame = encode_batch(&items).unwrap();
    let decoded: Vec<(u64, String)> = decode_batch(&frame).unwrap();
    assert_eq!(decoded, items);
}

#[test]
fn test_empty_batch_frame() {
    let frame = encode_batch::<u32>(&[]).unwrap();
    assert_eq!(&frame[0..4], &0u32.to_be_bytes());
    assert!(decode_batch::<u32>(&frame).unwrap().is_empty());
}

#[test]
fn test_empty_buffer_decodes_to_empty_batch() {
    assert!(decode_batch::<u64>(&[]).unwrap().is_empty());
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_truncated_header() {
    let result = decode_batch::<u64>(&[0, 0, 0]);
    assert!(matches!(result, Err(ShardMapError::Serialization(_))));
}

#[test]
fn test_flipped_payload_byte_fails_checksum() {
    let mut frame = encode_batch(&[1u64, 2, 3]).unwrap().to_vec();
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;

    let result = decode_batch::<u64>(&frame);
    assert!(matches!(result, Err(ShardMapError::Checksum { .. })));
}

#[test]
fn test_count_mismatch() {
    let mut frame = encode_batch(&[1u64, 2]).unwrap().to_vec();
    frame[0..4].copy_from_slice(&5u32.to_be_bytes());

    let result = decode_batch::<u64>(&frame);
    assert!(matches!(result, Err(ShardMapError::Serialization(_))));
}
