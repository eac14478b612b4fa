// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Engine configuration, its defaults, and the environment variables the
//! `winix-storage` binary reads at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the durable redb file | `./data` |
//! | `WINIX_STORAGE_PREFIX` | Namespace prefix for every key | `winix_` |
//! | `WINIX_ENCRYPTION` | `false`/`0` disables value obfuscation | `true` |
//! | `WINIX_MAX_STORAGE_BYTES` | Soft ceiling / durable quota in bytes | `5242880` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::keys::DEFAULT_PREFIX;
use crate::storage::{CompressionScheme, KeyPolicy};

/// Environment variable name for the durable data directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Default durable data directory.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// File name of the durable tier inside `DATA_DIR`.
pub const DURABLE_FILE_NAME: &str = "storage.redb";

/// Environment variable name for the key namespace prefix.
pub const STORAGE_PREFIX_ENV: &str = "WINIX_STORAGE_PREFIX";

/// Environment variable toggling value obfuscation.
pub const ENCRYPTION_ENV: &str = "WINIX_ENCRYPTION";

/// Environment variable overriding the soft storage ceiling.
pub const MAX_STORAGE_BYTES_ENV: &str = "WINIX_MAX_STORAGE_BYTES";

/// Environment variable selecting the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Largest single serialized value (1 MiB).
pub const DEFAULT_MAX_ITEM_SIZE: usize = 1024 * 1024;

/// Soft ceiling for the durable tier (5 MiB, the usual browser quota).
pub const DEFAULT_MAX_STORAGE_SIZE: usize = 5 * 1024 * 1024;

/// Usage ratio above which a quota failure triggers eviction.
pub const DEFAULT_EVICTION_THRESHOLD: f64 = 0.9;

/// Payloads larger than this are compressed automatically (10 KiB).
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 10 * 1024;

pub const DEFAULT_BACKUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_BACKUP_DEBOUNCE: Duration = Duration::from_secs(5);
pub const DEFAULT_BACKUP_RETENTION: usize = 3;
pub const DEFAULT_READ_CACHE_CAPACITY: usize = 256;
pub const DEFAULT_READ_CACHE_TTL: Duration = Duration::from_secs(60);

/// Effective engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Namespace prefix. Fixed for the lifetime of an engine.
    pub prefix: String,
    pub encryption_enabled: bool,
    pub compression_enabled: bool,
    /// Mirror every write into the memory tier.
    pub memory_fallback: bool,
    pub preferred_compression: CompressionScheme,
    pub compression_threshold: usize,
    pub max_item_size: usize,
    pub max_storage_size: usize,
    pub eviction_threshold: f64,
    pub backup_interval: Duration,
    pub stats_interval: Duration,
    pub cleanup_interval: Duration,
    pub backup_debounce: Duration,
    pub backup_retention: usize,
    /// Fixed at construction.
    pub read_cache_capacity: usize,
    /// Fixed at construction.
    pub read_cache_ttl: Duration,
    pub policy: KeyPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            encryption_enabled: true,
            compression_enabled: true,
            memory_fallback: true,
            preferred_compression: CompressionScheme::default(),
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            max_item_size: DEFAULT_MAX_ITEM_SIZE,
            max_storage_size: DEFAULT_MAX_STORAGE_SIZE,
            eviction_threshold: DEFAULT_EVICTION_THRESHOLD,
            backup_interval: DEFAULT_BACKUP_INTERVAL,
            stats_interval: DEFAULT_STATS_INTERVAL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            backup_debounce: DEFAULT_BACKUP_DEBOUNCE,
            backup_retention: DEFAULT_BACKUP_RETENTION,
            read_cache_capacity: DEFAULT_READ_CACHE_CAPACITY,
            read_cache_ttl: DEFAULT_READ_CACHE_TTL,
            policy: KeyPolicy::default(),
        }
    }
}

impl StorageConfig {
    /// Defaults overridden by the documented environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(prefix) = env::var(STORAGE_PREFIX_ENV) {
            if !prefix.is_empty() {
                config.prefix = prefix;
            }
        }

        if let Ok(flag) = env::var(ENCRYPTION_ENV) {
            match parse_flag(&flag) {
                Some(enabled) => config.encryption_enabled = enabled,
                None => tracing::warn!(variable = ENCRYPTION_ENV, value = %flag, "Ignoring invalid flag"),
            }
        }

        if let Ok(bytes) = env::var(MAX_STORAGE_BYTES_ENV) {
            match bytes.parse::<usize>() {
                Ok(bytes) if bytes > 0 => config.max_storage_size = bytes,
                _ => tracing::warn!(variable = MAX_STORAGE_BYTES_ENV, value = %bytes, "Ignoring invalid size"),
            }
        }

        config
    }

    /// Merge a partial update. `prefix` and read cache settings are not
    /// updatable.
    pub fn apply(&mut self, update: ConfigUpdate) {
        let ConfigUpdate {
            encryption_enabled,
            compression_enabled,
            memory_fallback,
            preferred_compression,
            compression_threshold,
            max_item_size,
            max_storage_size,
            eviction_threshold,
            backup_interval,
            stats_interval,
            cleanup_interval,
            backup_debounce,
            backup_retention,
            policy,
        } = update;

        if let Some(v) = encryption_enabled {
            self.encryption_enabled = v;
        }
        if let Some(v) = compression_enabled {
            self.compression_enabled = v;
        }
        if let Some(v) = memory_fallback {
            self.memory_fallback = v;
        }
        if let Some(v) = preferred_compression {
            self.preferred_compression = v;
        }
        if let Some(v) = compression_threshold {
            self.compression_threshold = v;
        }
        if let Some(v) = max_item_size {
            self.max_item_size = v;
        }
        if let Some(v) = max_storage_size {
            self.max_storage_size = v;
        }
        if let Some(v) = eviction_threshold {
            self.eviction_threshold = v.clamp(0.0, 1.0);
        }
        if let Some(v) = backup_interval {
            self.backup_interval = v;
        }
        if let Some(v) = stats_interval {
            self.stats_interval = v;
        }
        if let Some(v) = cleanup_interval {
            self.cleanup_interval = v;
        }
        if let Some(v) = backup_debounce {
            self.backup_debounce = v;
        }
        if let Some(v) = backup_retention {
            self.backup_retention = v.max(1);
        }
        if let Some(v) = policy {
            self.policy = v;
        }
    }
}

/// Partial configuration accepted by `StorageEngine::update_config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub encryption_enabled: Option<bool>,
    pub compression_enabled: Option<bool>,
    pub memory_fallback: Option<bool>,
    pub preferred_compression: Option<CompressionScheme>,
    pub compression_threshold: Option<usize>,
    pub max_item_size: Option<usize>,
    pub max_storage_size: Option<usize>,
    pub eviction_threshold: Option<f64>,
    pub backup_interval: Option<Duration>,
    pub stats_interval: Option<Duration>,
    pub cleanup_interval: Option<Duration>,
    pub backup_debounce: Option<Duration>,
    pub backup_retention: Option<usize>,
    pub policy: Option<KeyPolicy>,
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_documented_limits() {
        let config = StorageConfig::default();
        assert_eq!(config.prefix, "winix_");
        assert_eq!(config.max_item_size, 1_048_576);
        assert_eq!(config.compression_threshold, 10_240);
        assert_eq!(config.backup_retention, 3);
        assert!(config.encryption_enabled);
        assert!(config.memory_fallback);
    }

    #[test]
    fn partial_update_from_json() {
        let update: ConfigUpdate = serde_json::from_value(json!({
            "encryption_enabled": false,
            "compression_threshold": 2048,
            "backup_retention": 0
        }))
        .unwrap();

        let mut config = StorageConfig::default();
        config.apply(update);

        assert!(!config.encryption_enabled);
        assert_eq!(config.compression_threshold, 2048);
        // Retention never drops below one snapshot
        assert_eq!(config.backup_retention, 1);
        // Untouched fields keep their values
        assert!(config.compression_enabled);
        assert_eq!(config.max_item_size, DEFAULT_MAX_ITEM_SIZE);
    }

    #[test]
    fn flags_parse_loosely() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
