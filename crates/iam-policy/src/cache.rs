//! Time-bounded cache of permission check results.
//!
//! Keys are request fingerprints. The cache holds at most one result per
//! key and never serves a result once its TTL has elapsed. Inserts sweep
//! out expired entries at most once per TTL, so the map only holds what
//! was written during roughly the last two TTLs. Callers do
//! read, compute and write as separate steps, so two identical requests
//! racing on a miss may both compute; the last write wins.

use crate::error::{PolicyError, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    allowed: bool,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    next_sweep: DateTime<Utc>,
}

impl CacheState {
    fn sweep(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        self.next_sweep = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        before - self.entries.len()
    }
}

/// Fingerprint → result cache with a fixed TTL.
#[derive(Debug)]
pub struct ResultCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl ResultCache {
    /// Creates a cache whose entries live for `ttl`. A zero TTL stores nothing.
    pub fn new(ttl: std::time::Duration) -> Result<Self> {
        let ttl = Duration::from_std(ttl)
            .map_err(|e| PolicyError::invalid_field("cache_ttl", e.to_string()))?;
        Ok(Self {
            ttl,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_sweep: DateTime::<Utc>::MIN_UTC,
            }),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl > Duration::zero()
    }

    /// Returns the cached result if it has not expired.
    pub fn get(&self, key: &str) -> Option<bool> {
        self.get_at(key, Utc::now())
    }

    /// Stores a result, replacing any previous one for `key`.
    pub fn insert(&self, key: impl Into<String>, allowed: bool) {
        self.insert_at(key.into(), allowed, Utc::now());
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.state.lock().sweep(Utc::now(), self.ttl)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<bool> {
        let mut state = self.state.lock();
        let entry = *state.entries.get(key)?;
        if now < entry.expires_at {
            return Some(entry.allowed);
        }
        state.entries.remove(key);
        None
    }

    fn insert_at(&self, key: String, allowed: bool, now: DateTime<Utc>) {
        if !self.is_enabled() {
            return;
        }
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut state = self.state.lock();
        if now >= state.next_sweep {
            let removed = state.sweep(now, self.ttl);
            if removed > 0 {
                debug!(removed, remaining = state.entries.len(), "Swept expired cache entries");
            }
        }
        state.entries.insert(key, CacheEntry { allowed, expires_at });
    }
}
