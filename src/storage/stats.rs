// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Derived usage statistics. Never a source of truth: recomputed from the
//! tiers on demand and on the maintenance timer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Usage of one tier, counting only namespaced keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    /// Key plus value bytes.
    pub bytes: usize,
    /// Stored items, metadata records excluded.
    pub items: usize,
    pub available: bool,
}

/// Snapshot returned by `StorageEngine::get_storage_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    pub durable: TierStats,
    pub session: TierStats,
    pub memory: TierStats,
    pub total_bytes: usize,
    /// Durable usage relative to the soft ceiling, 0..=100+.
    pub usage_percent: f64,
    pub encrypted_items: usize,
    pub compressed_items: usize,
    pub error_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl StorageStats {
    pub fn empty() -> Self {
        Self {
            durable: TierStats::default(),
            session: TierStats::default(),
            memory: TierStats::default(),
            total_bytes: 0,
            usage_percent: 0.0,
            encrypted_items: 0,
            compressed_items: 0,
            error_count: 0,
            last_updated: Utc::now(),
        }
    }

    /// Durable usage as a fraction of `ceiling`.
    pub fn durable_ratio(&self, ceiling: usize) -> f64 {
        if ceiling == 0 {
            return 0.0;
        }
        self.durable.bytes as f64 / ceiling as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_against_ceiling() {
        let mut stats = StorageStats::empty();
        stats.durable.bytes = 450;
        assert!((stats.durable_ratio(500) - 0.9).abs() < f64::EPSILON);
        assert_eq!(stats.durable_ratio(0), 0.0);
    }
}
