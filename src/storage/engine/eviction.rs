// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Expiry sweeps and quota eviction.

use crate::config::StorageConfig;
use crate::storage::policy::EvictionStrategy;
use crate::storage::tier::TierKind;

use super::{now_millis, StorageEngine};

impl StorageEngine {
    /// Remove every expired item from every tier. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = now_millis();
        let removed: usize = TierKind::ALL
            .into_iter()
            .filter(|&kind| self.availability.is_usable(kind))
            .map(|kind| self.sweep_expired(kind, now, &[]))
            .sum();

        if removed > 0 {
            self.read_cache.clear();
            tracing::info!(removed, "Removed expired items");
        }
        removed
    }

    /// Run the configured eviction strategy against the durable tier.
    pub fn evict(&self) -> usize {
        let config = self.settings();
        self.evict_with(&config)
    }

    pub(super) fn evict_with(&self, config: &StorageConfig) -> usize {
        let policy = &config.policy;
        let mut removed = self.sweep_expired(TierKind::Durable, now_millis(), &[]);

        match policy.eviction.strategy {
            EvictionStrategy::ExpiredOnly => {}
            EvictionStrategy::DropUnprotected => {
                for name in self.durable_items() {
                    if !policy.is_protected(&name) && self.remove_entry(TierKind::Durable, &name) {
                        removed += 1;
                    }
                }
            }
            EvictionStrategy::OldestFirst => {
                removed += self.evict_oldest(config);
            }
        }

        self.read_cache.clear();
        tracing::info!(
            strategy = ?policy.eviction.strategy,
            removed,
            "Durable tier eviction finished"
        );
        removed
    }

    /// Drop unprotected items oldest first until durable usage is at or
    /// below the target ratio.
    fn evict_oldest(&self, config: &StorageConfig) -> usize {
        let target = (config.max_storage_size as f64 * config.policy.eviction.target_ratio) as usize;
        let mut used = self.refresh_stats().durable.bytes;

        let mut candidates: Vec<(i64, String)> = self
            .durable_items()
            .into_iter()
            .filter(|name| !config.policy.is_protected(name))
            .map(|name| {
                let timestamp = self
                    .read_meta(TierKind::Durable, &name)
                    .map_or(0, |meta| meta.timestamp);
                (timestamp, name)
            })
            .collect();
        candidates.sort();

        let mut removed = 0;
        for (_, name) in candidates {
            if used <= target {
                break;
            }
            let freed = self.entry_bytes(TierKind::Durable, &name);
            if self.remove_entry(TierKind::Durable, &name) {
                used = used.saturating_sub(freed);
                removed += 1;
            }
        }
        removed
    }

    /// Remove expired items from one tier, skipping preserved keys.
    pub(super) fn sweep_expired(&self, kind: TierKind, now: i64, preserve: &[String]) -> usize {
        let Some(keys) = self.tier_keys(kind) else {
            return 0;
        };

        // Collect first: removing metadata mid-scan would hide expiry
        let expired: Vec<String> = keys
            .iter()
            .filter(|key| !self.is_preserved(key, preserve))
            .filter_map(|key| self.keys.item_name(key))
            .filter(|name| {
                self.read_meta(kind, name)
                    .is_some_and(|meta| meta.is_expired(now))
            })
            .map(str::to_string)
            .collect();

        expired
            .iter()
            .filter(|name| self.remove_entry(kind, name))
            .count()
    }

    fn durable_items(&self) -> Vec<String> {
        self.tier_keys(TierKind::Durable)
            .unwrap_or_default()
            .iter()
            .filter_map(|key| self.keys.item_name(key))
            .map(str::to_string)
            .collect()
    }

    /// Bytes an item and its metadata occupy in one tier.
    fn entry_bytes(&self, kind: TierKind, name: &str) -> usize {
        [self.keys.item(name), self.keys.meta(name)]
            .iter()
            .filter_map(|key| self.tier_get(kind, key).map(|raw| key.len() + raw.len()))
            .sum()
    }
}
