use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use geovc_store::{codec, RevObject};
use geovc_types::ObjectId;
use lru::LruCache;
use tracing::{trace, warn};

use crate::config::CacheConfig;
use crate::error::CacheResult;

/// Point-in-time view of cache occupancy and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub l1_entries: usize,
    pub l1_capacity: usize,
    pub l2_entries: usize,
    pub l2_bytes: u64,
    pub l2_capacity: u64,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub l1_evictions: u64,
    pub l2_evictions: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.l1_hits + self.l2_hits
    }

    /// Fraction of lookups served from either tier, `0.0` before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

/// Partition of a [`SharedCache`] owned by one object store.
///
/// Entries are keyed by scope as well as id, so a store never sees objects
/// cached on behalf of another store even though both share the capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheScope(u64);

type Key = (CacheScope, ObjectId);

/// One independently locked slice of both tiers.
struct Segment {
    l1: LruCache<Key, RevObject>,
    l1_capacity: usize,
    l2: LruCache<Key, Arc<[u8]>>,
    l2_bytes: u64,
    l2_capacity: u64,
}

impl Segment {
    fn new(l1_capacity: usize, l2_capacity: u64) -> Self {
        Self {
            l1: LruCache::unbounded(),
            l1_capacity,
            l2: LruCache::unbounded(),
            l2_bytes: 0,
            l2_capacity,
        }
    }

    /// Insert into L1, returning how many entries were evicted.
    fn insert_decoded(&mut self, key: Key, object: RevObject) -> u64 {
        if self.l1_capacity == 0 {
            return 0;
        }
        self.l1.put(key, object);
        let mut evicted = 0;
        while self.l1.len() > self.l1_capacity {
            if self.l1.pop_lru().is_none() {
                break;
            }
            evicted += 1;
        }
        debug_assert!(self.l1.len() <= self.l1_capacity);
        evicted
    }

    /// Insert into L2, returning how many entries were evicted. Encodings
    /// larger than the whole segment are not cached.
    fn insert_encoded(&mut self, key: Key, bytes: Arc<[u8]>) -> u64 {
        let size = bytes.len() as u64;
        if size > self.l2_capacity {
            trace!(object = %key.1.short_hex(), size, "object larger than cache segment");
            return 0;
        }
        if let Some(old) = self.l2.put(key, bytes) {
            self.l2_bytes -= old.len() as u64;
        }
        self.l2_bytes += size;
        let mut evicted = 0;
        while self.l2_bytes > self.l2_capacity {
            match self.l2.pop_lru() {
                Some((_, old)) => {
                    self.l2_bytes -= old.len() as u64;
                    evicted += 1;
                }
                None => break,
            }
        }
        debug_assert!(self.l2_bytes <= self.l2_capacity);
        evicted
    }

    fn remove(&mut self, key: &Key) {
        self.l1.pop(key);
        if let Some(old) = self.l2.pop(key) {
            self.l2_bytes -= old.len() as u64;
        }
    }

    fn clear(&mut self) {
        self.l1.clear();
        self.l2.clear();
        self.l2_bytes = 0;
    }
}

/// Process-wide two-tier object cache.
///
/// Construct one and share it via `Arc` between every
/// [`ObjectDatabase`](crate::ObjectDatabase) that should benefit from it.
/// Capacity is shared; contents are partitioned by [`CacheScope`].
pub struct SharedCache {
    config: CacheConfig,
    segments: Vec<Mutex<Segment>>,
    next_scope: AtomicU64,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    l1_evictions: AtomicU64,
    l2_evictions: AtomicU64,
}

impl SharedCache {
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let n = config.segments;
        let segments = (0..n)
            .map(|i| {
                Mutex::new(Segment::new(
                    share(config.l1_capacity as u64, n, i) as usize,
                    share(config.l2_max_bytes, n, i),
                ))
            })
            .collect();
        Ok(Self {
            config,
            segments,
            next_scope: AtomicU64::new(0),
            l1_hits: AtomicU64::new(0),
            l2_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            l1_evictions: AtomicU64::new(0),
            l2_evictions: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Claim a fresh partition. Scopes are never reused.
    pub fn new_scope(&self) -> CacheScope {
        CacheScope(self.next_scope.fetch_add(1, Ordering::Relaxed))
    }

    fn segment(&self, id: &ObjectId) -> &Mutex<Segment> {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&id.as_bytes()[..8]);
        let index = u64::from_be_bytes(prefix) % self.segments.len() as u64;
        &self.segments[index as usize]
    }

    /// Look an object up in L1, then L2. An L2 hit is decoded and promoted
    /// into L1.
    pub fn lookup(&self, scope: CacheScope, id: &ObjectId) -> Option<RevObject> {
        let key = (scope, *id);
        let segment = self.segment(id);
        let encoded = {
            let mut seg = segment.lock().expect("lock poisoned");
            if let Some(object) = seg.l1.get(&key) {
                self.l1_hits.fetch_add(1, Ordering::Relaxed);
                return Some(object.clone());
            }
            seg.l2.get(&key).cloned()
        };

        let Some(bytes) = encoded else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        // Decode outside the lock.
        match codec::decode(&bytes) {
            Ok(object) => {
                self.l2_hits.fetch_add(1, Ordering::Relaxed);
                let evicted = segment
                    .lock()
                    .expect("lock poisoned")
                    .insert_decoded(key, object.clone());
                self.l1_evictions.fetch_add(evicted, Ordering::Relaxed);
                Some(object)
            }
            Err(e) => {
                warn!(object = %id.short_hex(), error = %e, "dropping undecodable cache entry");
                segment.lock().expect("lock poisoned").remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// True if either tier holds `id`. Does not touch recency or counters.
    pub fn contains(&self, scope: CacheScope, id: &ObjectId) -> bool {
        let key = (scope, *id);
        let seg = self.segment(id).lock().expect("lock poisoned");
        seg.l1.contains(&key) || seg.l2.contains(&key)
    }

    /// Populate both tiers after a miss.
    pub fn put(&self, scope: CacheScope, id: ObjectId, object: RevObject, bytes: Arc<[u8]>) {
        let (l1, l2) = {
            let mut seg = self.segment(&id).lock().expect("lock poisoned");
            (
                seg.insert_decoded((scope, id), object),
                seg.insert_encoded((scope, id), bytes),
            )
        };
        self.record_evictions(l1, l2);
    }

    /// Populate L1 only.
    pub fn put_decoded(&self, scope: CacheScope, id: ObjectId, object: RevObject) {
        let evicted = self
            .segment(&id)
            .lock()
            .expect("lock poisoned")
            .insert_decoded((scope, id), object);
        self.record_evictions(evicted, 0);
    }

    /// Populate L2 only.
    pub fn put_encoded(&self, scope: CacheScope, id: ObjectId, bytes: Arc<[u8]>) {
        let evicted = self
            .segment(&id)
            .lock()
            .expect("lock poisoned")
            .insert_encoded((scope, id), bytes);
        self.record_evictions(0, evicted);
    }

    /// Drop `id` from both tiers of `scope`.
    pub fn invalidate(&self, scope: CacheScope, id: &ObjectId) {
        self.segment(id)
            .lock()
            .expect("lock poisoned")
            .remove(&(scope, *id));
    }

    /// Drop everything in every scope. Counters are kept.
    pub fn clear(&self) {
        for segment in &self.segments {
            segment.lock().expect("lock poisoned").clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            l1_capacity: self.config.l1_capacity,
            l2_capacity: self.config.l2_max_bytes,
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            l1_evictions: self.l1_evictions.load(Ordering::Relaxed),
            l2_evictions: self.l2_evictions.load(Ordering::Relaxed),
            ..CacheStats::default()
        };
        for segment in &self.segments {
            let seg = segment.lock().expect("lock poisoned");
            stats.l1_entries += seg.l1.len();
            stats.l2_entries += seg.l2.len();
            stats.l2_bytes += seg.l2_bytes;
        }
        stats
    }

    fn record_evictions(&self, l1: u64, l2: u64) {
        if l1 > 0 {
            self.l1_evictions.fetch_add(l1, Ordering::Relaxed);
        }
        if l2 > 0 {
            self.l2_evictions.fetch_add(l2, Ordering::Relaxed);
        }
        if l1 + l2 > 0 {
            trace!(l1, l2, "cache evictions");
        }
    }
}

impl std::fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Segment `i`'s share of `total` split `n` ways; shares sum to `total`.
fn share(total: u64, n: usize, i: usize) -> u64 {
    let n = n as u64;
    let i = i as u64;
    total / n + u64::from(i < total % n)
}
