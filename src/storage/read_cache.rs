// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache of decoded values.
//!
//! Saves the decompress/decrypt work for hot keys such as balances that the UI
//! polls constantly. Entries are keyed by `(persist, logical key)` because the
//! two read paths probe different tiers.
//!
//! The tiers stay the source of truth. A hit is only served when the stored
//! payload and metadata still match what the entry was decoded from, so
//! writes by other handles and late inserts from slow readers never surface.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use super::metadata::ItemMetadata;

/// Decoded value plus the stored form it was decoded from.
#[derive(Debug, Clone)]
pub struct CachedValue {
    pub raw: String,
    pub decoded: String,
    pub meta: Option<ItemMetadata>,
}

struct CacheEntry {
    value: CachedValue,
    inserted_at: Instant,
}

/// In-process LRU cache for decoded reads. Capacity 0 disables it.
pub struct ReadCache {
    cache: Option<Mutex<LruCache<(bool, String), CacheEntry>>>,
    ttl: Duration,
}

impl ReadCache {
    /// Create a new cache with the given capacity and TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            ttl,
        }
    }

    /// Cached value for a key whose stored form is still `raw` and `meta`.
    ///
    /// `None` if absent, older than the TTL or decoded from something else.
    pub fn get(
        &self,
        persist: bool,
        key: &str,
        raw: &str,
        meta: Option<&ItemMetadata>,
    ) -> Option<CachedValue> {
        let mut cache = self.cache.as_ref()?.lock().ok()?;
        let cache_key = (persist, key.to_string());
        if let Some(entry) = cache.get(&cache_key) {
            let current = entry.value.raw == raw && entry.value.meta.as_ref() == meta;
            if current && entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.value.clone());
            }
            // Stale
            cache.pop(&cache_key);
        }
        None
    }

    pub fn put(&self, persist: bool, key: &str, value: CachedValue) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        if let Ok(mut cache) = cache.lock() {
            cache.put(
                (persist, key.to_string()),
                CacheEntry {
                    value,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Drop both read paths of a key.
    pub fn invalidate(&self, key: &str) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        if let Ok(mut cache) = cache.lock() {
            cache.pop(&(true, key.to_string()));
            cache.pop(&(false, key.to_string()));
        }
    }

    pub fn clear(&self) {
        if let Some(Ok(mut cache)) = self.cache.as_ref().map(|c| c.lock()) {
            cache.clear();
        }
    }
}
