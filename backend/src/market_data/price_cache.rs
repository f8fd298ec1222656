// =============================================================================
// Price Cache — short-TTL memo of the latest price/volume per symbol
// =============================================================================
//
// Suppresses redundant ticker requests. An entry older than the TTL is treated
// as absent by `get`; `evict_expired` only reclaims memory.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Entry {
    price: f64,
    volume: f64,
    cached_at: Instant,
}

pub struct PriceCache {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Cached `(price, volume)` if still fresh.
    pub fn get(&self, symbol: &str) -> Option<(f64, f64)> {
        self.get_at(symbol, Instant::now())
    }

    pub fn get_at(&self, symbol: &str, now: Instant) -> Option<(f64, f64)> {
        let map = self.entries.read();
        let entry = map.get(symbol)?;
        if now.saturating_duration_since(entry.cached_at) < self.ttl {
            Some((entry.price, entry.volume))
        } else {
            None
        }
    }

    /// Overwrite unconditionally, stamping the current time.
    pub fn set(&self, symbol: &str, price: f64, volume: f64) {
        self.set_at(symbol, price, volume, Instant::now());
    }

    pub fn set_at(&self, symbol: &str, price: f64, volume: f64, now: Instant) {
        self.entries.write().insert(
            symbol.to_string(),
            Entry {
                price,
                volume,
                cached_at: now,
            },
        );
    }

    /// Drop stale entries. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    pub fn evict_expired_at(&self, now: Instant) -> usize {
        let mut map = self.entries.write();
        let before = map.len();
        map.retain(|_, e| now.saturating_duration_since(e.cached_at) < self.ttl);
        let removed = before - map.len();
        if removed > 0 {
            debug!(removed, remaining = map.len(), "price cache swept");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}
