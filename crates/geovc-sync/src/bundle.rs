//! The transfer unit between repositories.
//!
//! Wire layout:
//!
//! ```text
//! [N bytes: bincode-serialized Vec<(ObjectId, Vec<u8>)>]
//! [4 bytes: CRC32 of the payload, little endian]
//! ```

use geovc_cache::ObjectDatabase;
use geovc_types::ObjectId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::progress::ProgressListener;

/// Canonical object bytes keyed by id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectBundle {
    objects: Vec<(ObjectId, Vec<u8>)>,
}

impl ObjectBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the raw bytes of `ids` from `source`.
    pub fn collect(source: &ObjectDatabase, ids: &[ObjectId]) -> SyncResult<Self> {
        let objects = ids
            .iter()
            .map(|id| Ok((*id, source.raw(id)?)))
            .collect::<SyncResult<Vec<_>>>()?;
        Ok(Self { objects })
    }

    pub fn push(&mut self, id: ObjectId, bytes: Vec<u8>) {
        self.objects.push((id, bytes));
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.iter().map(|(id, _)| *id)
    }

    /// Total size of the object payloads.
    pub fn payload_bytes(&self) -> u64 {
        self.objects.iter().map(|(_, b)| b.len() as u64).sum()
    }

    pub fn to_bytes(&self) -> SyncResult<Vec<u8>> {
        let mut out = bincode::serialize(&self.objects)
            .map_err(|e| SyncError::CorruptBundle(format!("serialize: {e}")))?;
        let crc = crc32fast::hash(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> SyncResult<Self> {
        let Some(split) = data.len().checked_sub(4) else {
            return Err(SyncError::CorruptBundle(format!(
                "{} bytes is too short for a bundle",
                data.len()
            )));
        };
        let (payload, trailer) = data.split_at(split);
        let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = crc32fast::hash(payload);
        if actual != expected {
            warn!(expected, actual, "bundle checksum mismatch");
            return Err(SyncError::CorruptBundle(format!(
                "checksum mismatch: expected {expected:08x}, got {actual:08x}"
            )));
        }
        let objects = bincode::deserialize(payload)
            .map_err(|e| SyncError::CorruptBundle(format!("deserialize: {e}")))?;
        Ok(Self { objects })
    }

    /// Store every object in `target`, verifying each one hashes to its id.
    /// Returns how many were new to `target`.
    pub fn import(&self, target: &ObjectDatabase, progress: &dyn ProgressListener) -> SyncResult<usize> {
        let total = self.objects.len() as u64;
        let mut inserted = 0;
        for (done, (id, bytes)) in self.objects.iter().enumerate() {
            if progress.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if target.put_verified(*id, bytes)? {
                inserted += 1;
            }
            progress.progress(done as u64 + 1, Some(total));
        }
        debug!(objects = total, inserted, "bundle imported");
        Ok(inserted)
    }
}
