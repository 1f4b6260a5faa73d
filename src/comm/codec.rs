//! Batch codec
//!
//! Encoding and decoding of typed batches for the wire.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Count (4) │ CRC (4)  │          Payload            │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//! - Count: number of items in the batch (big-endian)
//! - CRC: crc32 of the payload (big-endian)
//! - Payload: bincode encoding of the item sequence

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, ShardMapError};

/// Header size: 4 bytes count + 4 bytes crc
pub const FRAME_HEADER_SIZE: usize = 8;

/// Anything that can travel between ranks
pub trait Wire: Serialize + DeserializeOwned + Send + 'static {}

impl<T> Wire for T where T: Serialize + DeserializeOwned + Send + 'static {}

/// Encode a batch into one frame
pub fn encode_batch<T: Serialize>(items: &[T]) -> Result<Bytes> {
    let count = u32::try_from(items.len()).map_err(|_| {
        ShardMapError::Serialization(format!("Batch too large: {} items", items.len()))
    })?;

    let payload = bincode::serialize(items)
        .map_err(|e| ShardMapError::Serialization(e.to_string()))?;

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.put_u32(count);
    frame.put_u32(crc32fast::hash(&payload));
    frame.extend_from_slice(&payload);

    Ok(frame.freeze())
}

/// Decode one frame back into a batch
///
/// An empty buffer decodes to an empty batch; barriers send those.
pub fn decode_batch<T: DeserializeOwned>(frame: &[u8]) -> Result<Vec<T>> {
    if frame.is_empty() {
        return Ok(Vec::new());
    }

    if frame.len() < FRAME_HEADER_SIZE {
        return Err(ShardMapError::Serialization(format!(
            "Incomplete frame header: expected {} bytes, got {}",
            FRAME_HEADER_SIZE,
            frame.len()
        )));
    }

    // Parse header
    let count = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    let expected = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);

    let payload = &frame[FRAME_HEADER_SIZE..];
    let actual = crc32fast::hash(payload);
    if actual != expected {
        return Err(ShardMapError::Checksum { expected, actual });
    }

    let items: Vec<T> = bincode::deserialize(payload)
        .map_err(|e| ShardMapError::Serialization(e.to_string()))?;

    if items.len() != count {
        return Err(ShardMapError::Serialization(format!(
            "Frame declared {} items, decoded {}",
            count,
            items.len()
        )));
    }

    Ok(items)
}
