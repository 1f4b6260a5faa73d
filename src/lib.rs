//! # shardmap
//!
//! A distributed hash table for a fixed group of workers, with:
//! - Batch-oriented collective insert, find, count and erase
//! - Unique, multi-value, reduction and counting variants over one engine
//! - Four interchangeable query exchange strategies
//! - Caller-supplied key transforms and two-stage predicates
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ShardedMap                              │
//! │        (Map / MultiMap / ReductionMap / CountingMap)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Exchange   │          │    Query    │
//!   │ (strategy)  │─────────►│  Processor  │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ▼                        ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Distribute  │          │ Local Store │
//!   │ + Partition │          │ (HashStore) │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │    Comm     │
//!   │ (LocalComm) │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod comm;
pub mod partition;
pub mod store;
pub mod distribute;
pub mod query;
pub mod exchange;
pub mod map;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, ShardMapError};
pub use config::Config;
pub use comm::{Communicator, LocalComm, LocalGroup};
pub use exchange::Strategy;
pub use map::{CountingMap, Map, MultiMap, ReductionMap, ShardedMap};
pub use query::{AcceptAll, Predicate, RangeAndElement};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of shardmap
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
