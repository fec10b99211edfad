//! Bounded rewrite cache: TTL expiry first, then least-recently-used eviction.

use gradewise_domain::entities::{RewriteResult, TargetLevel};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Deterministic key for a `(text, level)` pair.
pub fn cache_key(text: &str, level: TargetLevel) -> String {
    let mut hasher = Sha256::new();
    hasher.update(level.label().as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub result: Arc<RewriteResult>,
    pub created_at: Instant,
    pub access_count: u64,
    pub last_accessed_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub evictions: u64,
    pub expirations: u64,
}

pub struct AdaptiveCache {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
    ttl: Duration,
    evictions: u64,
    expirations: u64,
}

impl AdaptiveCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { entries: HashMap::new(), capacity, ttl, evictions: 0, expirations: 0 }
    }

    fn expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) > self.ttl
    }

    /// Returns the cached result and marks it as used. Entries past their TTL
    /// are reported absent even before cleanup removes them.
    pub fn get(&mut self, key: &str) -> Option<Arc<RewriteResult>> {
        let now = Instant::now();
        let ttl = self.ttl;
        let entry = self.entries.get_mut(key)?;
        if now.saturating_duration_since(entry.created_at) > ttl {
            return None;
        }
        entry.access_count += 1;
        entry.last_accessed_at = now;
        Some(entry.result.clone())
    }

    pub fn put(&mut self, key: String, result: Arc<RewriteResult>) {
        let now = Instant::now();
        self.entries.remove(&key);
        self.entries.insert(
            key.clone(),
            CacheEntry { key, result, created_at: now, access_count: 0, last_accessed_at: now },
        );
        self.cleanup();
    }

    pub fn cleanup(&mut self) {
        let now = Instant::now();
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, e| now.saturating_duration_since(e.created_at) <= ttl);
        let expired = before - self.entries.len();
        self.expirations += expired as u64;

        let mut evicted = 0usize;
        if self.entries.len() > self.capacity {
            let mut order: Vec<(Instant, Instant, String)> = self
                .entries
                .values()
                .map(|e| (e.last_accessed_at, e.created_at, e.key.clone()))
                .collect();
            order.sort();
            let excess = self.entries.len() - self.capacity;
            for (_, _, key) in order.into_iter().take(excess) {
                self.entries.remove(&key);
                evicted += 1;
            }
            self.evictions += evicted as u64;
        }
        if expired > 0 || evicted > 0 {
            debug!(target: "gradewise.cache", expired, evicted, remaining = self.entries.len(), "cache cleanup");
        }
    }

    /// Entry inspection without touching access bookkeeping.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        let now = Instant::now();
        self.entries.get(key).filter(|e| !self.expired(e, now))
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn clear(&mut self) { self.entries.clear(); }

    pub fn stats(&self) -> CacheStats {
        CacheStats { entries: self.entries.len(), evictions: self.evictions, expirations: self.expirations }
    }
}
