use geovc_crypto::NameHash;
use serde::{Deserialize, Serialize};

use crate::error::{TreeError, TreeResult};

/// Shape parameters of every tree in a repository.
///
/// Changing either value changes tree ids, so both are fixed per repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// A tree with at least this many entries is split into buckets.
    pub split_threshold: usize,
    /// Bucket index width; a bucket tree has up to `2^bucket_bits` buckets.
    pub bucket_bits: u8,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            split_threshold: 512,
            bucket_bits: 5,
        }
    }
}

impl TreeConfig {
    pub fn new(split_threshold: usize, bucket_bits: u8) -> TreeResult<Self> {
        let config = Self {
            split_threshold,
            bucket_bits,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TreeResult<()> {
        if self.split_threshold < 2 {
            return Err(TreeError::InvalidConfig(format!(
                "split_threshold must be at least 2, got {}",
                self.split_threshold
            )));
        }
        if !(1..=8).contains(&self.bucket_bits) {
            return Err(TreeError::InvalidConfig(format!(
                "bucket_bits must be in 1..=8, got {}",
                self.bucket_bits
            )));
        }
        Ok(())
    }

    pub fn bucket_count(&self) -> u32 {
        1 << self.bucket_bits
    }

    /// Depth at which trees are leaves regardless of size.
    pub fn max_depth(&self) -> u32 {
        NameHash::max_depth(self.bucket_bits)
    }

    /// Bucket of `name` at `depth`, or `None` at or below the maximum depth.
    pub fn bucket_of(&self, name: &str, depth: u32) -> Option<u32> {
        NameHash::of(name).bucket(depth, self.bucket_bits)
    }
}
