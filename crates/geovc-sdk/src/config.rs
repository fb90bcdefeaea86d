use std::path::Path;

use geovc_cache::CacheConfig;
use geovc_tree::TreeConfig;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Repository settings, usually read from a TOML file:
///
/// ```toml
/// [tree]
/// split_threshold = 512
/// bucket_bits = 5
///
/// [cache]
/// l1_capacity = 16384
/// l2_max_bytes = "256M"
/// segments = 16
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub tree: TreeConfig,
    pub cache: CacheConfig,
}

impl RepositoryConfig {
    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SdkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn validate(&self) -> SdkResult<()> {
        self.tree.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}
