//! Bounded, expiring cache of raw (undeserialized) transaction bytes.
//!
//! Grounded on the teacher's `cache.rs`: an `lru::LruCache` behind a
//! `tokio::sync::Mutex` (LRU `get` mutates recency, so a plain `RwLock`
//! read lock would not suffice). Unlike the teacher's cache, entries also
//! expire after a fixed TTL — consulted before ancestors are re-fetched
//! (§4.3), so a stale raw transaction never shadows a chain reorg.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use bitcoin::Txid;
use lru::LruCache;
use tokio::sync::Mutex;

const DEFAULT_CAPACITY: usize = 1_000;
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct Entry {
    raw: Vec<u8>,
    inserted_at: Instant,
}

/// LRU-with-expiry over raw transaction bytes, keyed by txid (§4.7).
///
/// Stores undeserialized bytes only; callers decode. `get` returns a
/// defensive copy so callers cannot mutate cache state through the
/// returned buffer.
pub struct TxCache {
    entries: Mutex<LruCache<Txid, Entry>>,
    ttl: Duration,
}

impl TxCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_ttl(capacity, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("tx cache capacity must be > 0"),
            )),
            ttl,
        }
    }

    /// Look up a cached raw transaction. Returns `None` if absent or
    /// expired; an expired entry is evicted on the way out.
    pub async fn get(&self, txid: &Txid) -> Option<Vec<u8>> {
        let mut guard = self.entries.lock().await;
        let is_expired = matches!(guard.peek(txid), Some(entry) if entry.inserted_at.elapsed() > self.ttl);
        if is_expired {
            guard.pop(txid);
            return None;
        }
        guard.get(txid).map(|entry| entry.raw.clone())
    }

    /// Insert raw transaction bytes. `raw` must be non-empty (§4.7).
    pub async fn put(&self, txid: Txid, raw: Vec<u8>) {
        debug_assert!(!raw.is_empty(), "tx cache does not store empty transactions");
        self.entries.lock().await.put(
            txid,
            Entry {
                raw,
                inserted_at: Instant::now(),
            },
        );
    }
}

impl Default for TxCache {
    fn default() -> Self {
        Self::new()
    }
}
