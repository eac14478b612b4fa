// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key layout inside the shared tiers.
//!
//! ```text
//! <prefix><name>                  value
//! <prefix><name>_meta             JSON metadata
//! <prefix>backup_<unixMillis>     encoded backup snapshot
//! <prefix>backup_<unixMillis>_meta
//! <prefix>device_id               per-device identifier
//! ```

/// Namespace applied to every application key.
pub const DEFAULT_PREFIX: &str = "winix_";

/// Suffix of a metadata companion key.
pub const META_SUFFIX: &str = "_meta";

/// Logical name prefix of a backup snapshot.
pub const BACKUP_NAME_PREFIX: &str = "backup_";

/// Logical name of the device identifier.
pub const DEVICE_ID_NAME: &str = "device_id";

/// Key naming utilities for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    prefix: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl StorageKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    // ========== Item Keys ==========

    /// Storage key of a logical item.
    pub fn item(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    /// Storage key of an item's metadata.
    pub fn meta(&self, name: &str) -> String {
        format!("{}{name}{META_SUFFIX}", self.prefix)
    }

    /// Logical name of a storage key, if it belongs to this namespace.
    pub fn logical<'a>(&self, storage_key: &'a str) -> Option<&'a str> {
        storage_key.strip_prefix(self.prefix.as_str())
    }

    pub fn is_namespaced(&self, storage_key: &str) -> bool {
        storage_key.starts_with(self.prefix.as_str())
    }

    pub fn is_meta(storage_key: &str) -> bool {
        storage_key.ends_with(META_SUFFIX)
    }

    // ========== Backup Keys ==========

    /// Logical name of the snapshot taken at `timestamp`.
    pub fn backup_name(timestamp: i64) -> String {
        format!("{BACKUP_NAME_PREFIX}{timestamp}")
    }

    /// Timestamp of a snapshot storage key (not its metadata key).
    pub fn backup_timestamp(&self, storage_key: &str) -> Option<i64> {
        self.logical(storage_key)?
            .strip_prefix(BACKUP_NAME_PREFIX)?
            .parse()
            .ok()
    }

    /// Whether a storage key is a snapshot or a snapshot's metadata.
    pub fn is_backup(&self, storage_key: &str) -> bool {
        let Some(name) = self.logical(storage_key) else {
            return false;
        };
        Self::is_backup_name(name.strip_suffix(META_SUFFIX).unwrap_or(name))
    }

    /// Whether a logical name has the `backup_<digits>` snapshot shape.
    pub fn is_backup_name(name: &str) -> bool {
        name.strip_prefix(BACKUP_NAME_PREFIX)
            .is_some_and(|ts| !ts.is_empty() && ts.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Logical names callers may not write: they would collide with
    /// metadata companions or snapshots.
    pub fn is_reserved(name: &str) -> bool {
        Self::is_meta(name) || Self::is_backup_name(name)
    }

    /// Logical names of stored items (no metadata, no snapshots).
    pub fn item_name<'a>(&self, storage_key: &'a str) -> Option<&'a str> {
        if Self::is_meta(storage_key) || self.is_backup(storage_key) {
            return None;
        }
        self.logical(storage_key)
    }
}
