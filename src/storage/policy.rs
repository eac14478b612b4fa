// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key classification: which keys are sensitive, which are backed up, and
//! which survive quota eviction.

use serde::{Deserialize, Serialize};

/// Identifiers that are encrypted even without `sensitive: true`.
pub const DEFAULT_SENSITIVE_NAMES: &[&str] = &[
    "user_id",
    "auth_token",
    "token",
    "balance",
    "coins",
    "wallet_address",
    "private_key",
    "password",
];

/// Keys included in backup snapshots.
pub const DEFAULT_IMPORTANT_KEYS: &[&str] = &[
    "user_id",
    "auth_token",
    "balance",
    "coins",
    "wallet_address",
    "staking_data",
    "settings",
];

/// Keys never removed by quota eviction, in addition to important keys.
pub const DEFAULT_PROTECTED_KEYS: &[&str] = &["device_id"];

/// Default fraction of the soft ceiling `OldestFirst` evicts down to.
pub const DEFAULT_EVICTION_TARGET: f64 = 0.75;

/// How the engine frees durable space after a quota failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionStrategy {
    /// Drop expired items, then every namespaced item that is not protected.
    #[default]
    DropUnprotected,
    /// Drop expired items, then unprotected items oldest first until usage
    /// falls under the target ratio.
    OldestFirst,
    /// Only drop expired items.
    ExpiredOnly,
}

/// Eviction order and allow-list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvictionPolicy {
    pub strategy: EvictionStrategy,
    /// Logical names never evicted.
    pub protected_keys: Vec<String>,
    /// Usage ratio `OldestFirst` stops at.
    pub target_ratio: f64,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            strategy: EvictionStrategy::default(),
            protected_keys: DEFAULT_PROTECTED_KEYS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            target_ratio: DEFAULT_EVICTION_TARGET,
        }
    }
}

/// Name-based classification of logical keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPolicy {
    pub sensitive_names: Vec<String>,
    pub important_keys: Vec<String>,
    pub eviction: EvictionPolicy,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            sensitive_names: DEFAULT_SENSITIVE_NAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            important_keys: DEFAULT_IMPORTANT_KEYS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            eviction: EvictionPolicy::default(),
        }
    }
}

impl KeyPolicy {
    /// Exact match, `name_` prefix or `_name` suffix against a sensitive name.
    pub fn is_sensitive(&self, key: &str) -> bool {
        self.sensitive_names.iter().any(|name| {
            key == name
                || key
                    .strip_prefix(name.as_str())
                    .is_some_and(|rest| rest.starts_with('_'))
                || key
                    .strip_suffix(name.as_str())
                    .is_some_and(|rest| rest.ends_with('_'))
        })
    }

    pub fn is_important(&self, key: &str) -> bool {
        self.important_keys.iter().any(|k| k == key)
    }

    /// Protected from quota eviction.
    pub fn is_protected(&self, key: &str) -> bool {
        self.is_important(key) || self.eviction.protected_keys.iter().any(|k| k == key)
    }
}
