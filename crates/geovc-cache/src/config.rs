use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CacheError, CacheResult};

/// Sizing of a [`SharedCache`](crate::SharedCache).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of decoded objects held in L1.
    pub l1_capacity: usize,
    /// Maximum total bytes of encoded objects held in L2. In TOML either a
    /// byte count or a size string such as `"512M"`.
    #[serde(deserialize_with = "deserialize_size")]
    pub l2_max_bytes: u64,
    /// Number of independently locked segments.
    pub segments: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 16 * 1024,
            l2_max_bytes: 256 * 1024 * 1024,
            segments: 16,
        }
    }
}

impl CacheConfig {
    /// A cache that holds nothing. Every lookup misses.
    pub fn disabled() -> Self {
        Self {
            l1_capacity: 0,
            l2_max_bytes: 0,
            segments: 1,
        }
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.segments == 0 {
            return Err(CacheError::InvalidConfig("segments must be at least 1".into()));
        }
        if self.segments > 1024 {
            return Err(CacheError::InvalidConfig(format!(
                "segments must be at most 1024, got {}",
                self.segments
            )));
        }
        Ok(())
    }
}

/// Parse a size of the form `<number>[B|K|M|G]` (binary multiples, case
/// insensitive). A bare number is a byte count.
pub fn parse_size(value: &str) -> CacheResult<u64> {
    let invalid = |reason: &str| CacheError::InvalidSize {
        value: value.to_owned(),
        reason: reason.to_owned(),
    };
    let trimmed = value.trim();
    let (number, multiplier) = match trimmed.char_indices().last() {
        None => return Err(invalid("empty")),
        Some((i, c)) => match c.to_ascii_uppercase() {
            'B' => (&trimmed[..i], 1u64),
            'K' => (&trimmed[..i], 1 << 10),
            'M' => (&trimmed[..i], 1 << 20),
            'G' => (&trimmed[..i], 1 << 30),
            c if c.is_ascii_digit() || c == '.' => (trimmed, 1),
            _ => return Err(invalid("unknown unit, expected B, K, M or G")),
        },
    };
    let amount: f64 = number
        .trim()
        .parse()
        .map_err(|_| invalid("not a number"))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(invalid("must be a non-negative number"));
    }
    let bytes = amount * multiplier as f64;
    if bytes > u64::MAX as f64 {
        return Err(invalid("too large"));
    }
    Ok(bytes.floor() as u64)
}

fn deserialize_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(u64),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Bytes(n) => Ok(n),
        Size::Text(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}
