//! Configuration for shardmap
//!
//! Centralized configuration with sensible defaults. Every rank of a group
//! must be built from the same configuration: the hash seeds and the
//! partitioning mode decide where keys live.

use crate::error::{Result, ShardMapError};
use crate::exchange::Strategy;
use crate::partition::Partitioning;

/// Main configuration for a sharded map instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Exchange Configuration
    // -------------------------------------------------------------------------
    /// Strategy used by `find_default`
    pub default_strategy: Strategy,

    /// Over-estimation factor applied whenever a result buffer is re-sized
    /// from the observed yield
    pub estimate_headroom: f64,

    /// Input batches are already sorted by key (enables adjacent dedup)
    pub sorted_input: bool,

    // -------------------------------------------------------------------------
    // Partitioning Configuration
    // -------------------------------------------------------------------------
    /// How a key hash is reduced to a rank
    pub partitioning: Partitioning,

    /// Seeds for the distribution hash (identical on every rank)
    pub hash_seeds: [u64; 4],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_strategy: Strategy::Adaptive,
            estimate_headroom: 1.1,
            sorted_input: false,
            partitioning: Partitioning::HighBits,
            hash_seeds: [
                0x243f_6a88_85a3_08d3,
                0x1319_8a2e_0370_7344,
                0xa409_3822_299f_31d0,
                0x082e_fa98_ec4e_6c89,
            ],
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> Result<()> {
        if !self.estimate_headroom.is_finite() || self.estimate_headroom < 1.0 {
            return Err(ShardMapError::Config(format!(
                "estimate_headroom must be a finite value >= 1.0, got {}",
                self.estimate_headroom
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the strategy used by `find_default`
    pub fn default_strategy(mut self, strategy: Strategy) -> Self {
        self.config.default_strategy = strategy;
        self
    }

    /// Set the result buffer over-estimation factor
    pub fn estimate_headroom(mut self, factor: f64) -> Self {
        self.config.estimate_headroom = factor;
        self
    }

    /// Declare input batches as sorted by key
    pub fn sorted_input(mut self, sorted: bool) -> Self {
        self.config.sorted_input = sorted;
        self
    }

    /// Set the hash-to-rank reduction
    pub fn partitioning(mut self, partitioning: Partitioning) -> Self {
        self.config.partitioning = partitioning;
        self
    }

    /// Set the distribution hash seeds
    pub fn hash_seeds(mut self, seeds: [u64; 4]) -> Self {
        self.config.hash_seeds = seeds;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
