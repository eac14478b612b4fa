// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process tier backed by a `HashMap`.
//!
//! Used for the session tier (values live as long as the process) and for the
//! memory fallback that mirrors writes when the other tiers misbehave. An
//! optional byte quota mimics the per-origin limit browsers put on storage.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{TierError, TierResult};

use super::tier::StorageTier;

#[derive(Debug, Default)]
struct Entries {
    values: HashMap<String, String>,
    used: usize,
}

/// Thread-safe in-memory key/value tier.
#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: Mutex<Entries>,
    quota: Option<usize>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tier that rejects writes once keys plus values exceed `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            quota: Some(quota),
        }
    }

    /// Bytes currently held (keys plus values).
    pub fn used_bytes(&self) -> usize {
        self.lock().map(|e| e.used).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> TierResult<MutexGuard<'_, Entries>> {
        self.entries
            .lock()
            .map_err(|_| TierError::Unavailable("memory tier lock poisoned".to_string()))
    }
}

impl StorageTier for MemoryTier {
    fn get(&self, key: &str) -> TierResult<Option<String>> {
        Ok(self.lock()?.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> TierResult<()> {
        let mut entries = self.lock()?;
        let previous = entries
            .values
            .get(key)
            .map(|old| key.len() + old.len())
            .unwrap_or(0);
        let requested = key.len() + value.len();
        let next = entries.used.saturating_sub(previous) + requested;

        if let Some(quota) = self.quota {
            if next > quota {
                return Err(TierError::QuotaExceeded {
                    used: entries.used,
                    quota,
                    requested,
                });
            }
        }

        entries.values.insert(key.to_string(), value.to_string());
        entries.used = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> TierResult<()> {
        let mut entries = self.lock()?;
        if let Some(old) = entries.values.remove(key) {
            entries.used -= key.len() + old.len();
        }
        Ok(())
    }

    fn keys(&self) -> TierResult<Vec<String>> {
        Ok(self.lock()?.values.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let tier = MemoryTier::new();
        assert!(tier.get("a").unwrap().is_none());

        tier.set("a", "1").unwrap();
        assert_eq!(tier.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(tier.used_bytes(), 2);

        tier.set("a", "123").unwrap();
        assert_eq!(tier.used_bytes(), 4);

        tier.remove("a").unwrap();
        assert!(tier.get("a").unwrap().is_none());
        assert_eq!(tier.used_bytes(), 0);

        // Removing twice is fine
        tier.remove("a").unwrap();
    }

    #[test]
    fn quota_rejects_oversized_writes() {
        let tier = MemoryTier::with_quota(10);
        tier.set("k", "12345").unwrap();

        let err = tier.set("j", "123456").unwrap_err();
        assert!(err.is_quota());
        assert!(tier.get("j").unwrap().is_none());

        // Overwriting in place only counts the delta
        tier.set("k", "12345678").unwrap();
        assert_eq!(tier.used_bytes(), 9);
    }

    #[test]
    fn keys_lists_everything() {
        let tier = MemoryTier::new();
        tier.set("a", "1").unwrap();
        tier.set("b", "2").unwrap();

        let mut keys = tier.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(tier.len(), 2);
    }
}
