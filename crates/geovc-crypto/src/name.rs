use std::fmt;

use crate::hasher::ContentHasher;

/// Hash of a tree entry name, read as a big-endian bit string to pick the
/// bucket an entry belongs to at each tree depth.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameHash([u8; 32]);

impl NameHash {
    /// Total bits available for routing.
    pub const BITS: u32 = 256;

    pub fn of(name: &str) -> Self {
        Self(ContentHasher::NAME.digest(name.as_bytes()))
    }

    /// Deepest level at which a bucket index can still be taken with
    /// `bits`-wide indexes. Trees at this depth are always leaves.
    pub const fn max_depth(bits: u8) -> u32 {
        Self::BITS / bits as u32
    }

    /// Bucket index for depth `depth`: bits `[depth*bits, (depth+1)*bits)`.
    ///
    /// Returns `None` once the hash is exhausted. `bits` must be in `1..=8`.
    pub fn bucket(&self, depth: u32, bits: u8) -> Option<u32> {
        debug_assert!((1..=8).contains(&bits));
        let width = bits as u32;
        let start = depth.checked_mul(width)?;
        if start + width > Self::BITS {
            return None;
        }
        let mut value = 0u32;
        for bit in start..start + width {
            let byte = self.0[(bit / 8) as usize];
            let b = (byte >> (7 - bit % 8)) & 1;
            value = (value << 1) | b as u32;
        }
        Some(value)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameHash({})", hex::encode(&self.0[..4]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_for_same_name() {
        assert_eq!(NameHash::of("f1"), NameHash::of("f1"));
        assert_ne!(NameHash::of("f1"), NameHash::of("f2"));
    }

    #[test]
    fn bucket_reads_leading_bits() {
        let mut raw = [0u8; 32];
        raw[0] = 0b1010_1100;
        raw[1] = 0b0111_0000;
        let h = NameHash(raw);
        assert_eq!(h.bucket(0, 4), Some(0b1010));
        assert_eq!(h.bucket(1, 4), Some(0b1100));
        assert_eq!(h.bucket(2, 4), Some(0b0111));
        // 5-bit windows straddle byte boundaries.
        assert_eq!(h.bucket(0, 5), Some(0b10101));
        assert_eq!(h.bucket(1, 5), Some(0b10001));
    }

    #[test]
    fn bucket_is_within_range() {
        for i in 0..200 {
            let h = NameHash::of(&format!("feature-{i}"));
            for depth in 0..NameHash::max_depth(5) {
                assert!(h.bucket(depth, 5).unwrap() < 32);
            }
        }
    }

    #[test]
    fn exhausted_hash_yields_none() {
        let h = NameHash::of("x");
        assert_eq!(NameHash::max_depth(5), 51);
        assert!(h.bucket(50, 5).is_some());
        assert_eq!(h.bucket(51, 5), None);
        assert_eq!(h.bucket(32, 8), None);
        assert!(h.bucket(31, 8).is_some());
    }
}
