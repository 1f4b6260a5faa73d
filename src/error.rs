//! Error types for shardmap
//!
//! Provides a unified error type for all collective operations.

use std::collections::TryReserveError;

use thiserror::Error;

/// Result type alias using ShardMapError
pub type Result<T> = std::result::Result<T, ShardMapError>;

/// Unified error type for shardmap operations
#[derive(Debug, Error)]
pub enum ShardMapError {
    // -------------------------------------------------------------------------
    // Communication Errors
    // -------------------------------------------------------------------------
    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid rank {rank} for group of size {size}")]
    InvalidRank { rank: usize, size: usize },

    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),

    // -------------------------------------------------------------------------
    // Wire Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Frame checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    Checksum { expected: u32, actual: u32 },

    // -------------------------------------------------------------------------
    // Resource Errors
    // -------------------------------------------------------------------------
    #[error("Allocation failed: {0}")]
    Allocation(#[from] TryReserveError),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
