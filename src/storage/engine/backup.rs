// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Backup snapshots of important keys.
//!
//! A snapshot is a JSON document stored as an ordinary item named
//! `backup_<millis>`, run through the same encryption and compression
//! pipeline as any other value. Snapshots go to the first usable tier in
//! durable, session, memory order and only the newest few are retained.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::storage::codec::{self, Transform};
use crate::storage::keys::StorageKeys;
use crate::storage::tier::TierKind;
use crate::storage::value::{self, ValueKind};

use super::{encrypted_len, now_millis, SetOptions, StorageEngine};

/// One important key captured in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// Decoded plaintext value.
    pub value: String,
    /// Logical type from the item metadata, when it had any.
    #[serde(default, rename = "type")]
    pub kind: Option<ValueKind>,
    pub timestamp: i64,
    /// Tier the value was read from.
    pub source: TierKind,
}

/// Full snapshot document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub timestamp: i64,
    pub entries: BTreeMap<String, BackupEntry>,
}

/// Metadata record stored next to a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub timestamp: i64,
    /// Serialized snapshot size before any transform.
    pub size: usize,
    pub keys: usize,
    pub compressed: bool,
    pub encrypted: bool,
}

/// What a backup attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Created {
        timestamp: i64,
        keys: usize,
        tier: TierKind,
    },
    /// The previous snapshot is younger than the backup interval.
    RateLimited { last: i64 },
    /// No important key currently holds a value.
    NothingToBackup,
    Failed(String),
}

/// Result of [`StorageEngine::restore_from_backup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResult {
    pub success: bool,
    pub message: String,
    /// Timestamp of the snapshot used.
    pub timestamp: Option<i64>,
    /// Number of keys written back.
    pub keys: Option<usize>,
}

impl RestoreResult {
    fn failed(message: impl Into<String>, timestamp: Option<i64>) -> Self {
        Self {
            success: false,
            message: message.into(),
            timestamp,
            keys: None,
        }
    }
}

impl StorageEngine {
    /// Snapshot important keys, at most once per backup interval.
    pub fn create_backup(&self) -> BackupOutcome {
        self.backup(false)
    }

    /// Snapshot timestamps, newest first.
    pub fn list_backups(&self) -> Vec<i64> {
        self.snapshots().into_iter().map(|(ts, _)| ts).collect()
    }

    /// Timestamp of the newest snapshot, including ones found in the tiers
    /// when the engine started.
    pub fn last_backup(&self) -> Option<i64> {
        *super::lock(&self.last_backup)
    }

    pub(super) fn backup(&self, force: bool) -> BackupOutcome {
        match self.try_backup(force) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_error("create_backup", &e);
                BackupOutcome::Failed(e.to_string())
            }
        }
    }

    fn try_backup(&self, force: bool) -> StorageResult<BackupOutcome> {
        let config = self.settings();
        let now = now_millis();

        if !force {
            if let Some(last) = self.last_backup() {
                let interval = i64::try_from(config.backup_interval.as_millis()).unwrap_or(i64::MAX);
                if now.saturating_sub(last) < interval {
                    return Ok(BackupOutcome::RateLimited { last });
                }
            }
        }

        let entries = self.collect_important(&config, now);
        if entries.is_empty() {
            tracing::debug!("No important keys to back up");
            return Ok(BackupOutcome::NothingToBackup);
        }

        // Snapshot timestamps stay strictly increasing within a millisecond
        let timestamp = self
            .list_backups()
            .first()
            .map_or(now, |&newest| now.max(newest + 1));

        let snapshot = BackupSnapshot { timestamp, entries };
        let json = serde_json::to_string(&snapshot)?;
        let name = StorageKeys::backup_name(timestamp);

        let mut plan = Vec::with_capacity(2);
        if config.encryption_enabled {
            plan.push(Transform::Encrypt);
        }
        let projected = if config.encryption_enabled {
            encrypted_len(json.len())
        } else {
            json.len()
        };
        if config.compression_enabled && projected > config.compression_threshold {
            plan.push(Transform::Compress(config.preferred_compression));
        }
        let encoded = codec::encode(&json, &name, &plan);

        let meta = BackupMetadata {
            timestamp,
            size: json.len(),
            keys: snapshot.entries.len(),
            compressed: encoded.compressed(),
            encrypted: encoded.encrypted(),
        };
        let meta_json = serde_json::to_string(&meta)?;

        let mut written = None;
        for kind in TierKind::ALL {
            if !self.availability.is_usable(kind) {
                continue;
            }
            match self.write_pair(kind, &name, &encoded.payload, &meta_json) {
                Ok(()) => {
                    written = Some(kind);
                    break;
                }
                Err(e) => self.tier_failed(kind, "create_backup", e),
            }
        }
        let Some(tier) = written else {
            return Err(StorageError::Backup("no tier accepted the snapshot".into()));
        };

        *super::lock(&self.last_backup) = Some(now);
        self.rotate_backups(config.backup_retention);

        tracing::info!(
            timestamp,
            keys = meta.keys,
            tier = %tier,
            bytes = encoded.payload.len(),
            "Backup snapshot created"
        );
        Ok(BackupOutcome::Created {
            timestamp,
            keys: meta.keys,
            tier,
        })
    }

    /// Current values of important keys, first tier wins.
    fn collect_important(&self, config: &StorageConfig, now: i64) -> BTreeMap<String, BackupEntry> {
        let mut entries = BTreeMap::new();

        for kind in TierKind::ALL {
            for key in self.tier_keys(kind).unwrap_or_default() {
                let Some(name) = self.keys.item_name(&key) else {
                    continue;
                };
                if !config.policy.is_important(name) || entries.contains_key(name) {
                    continue;
                }
                let Some(raw) = self.tier_get(kind, &key) else {
                    continue;
                };
                let meta = self.read_meta(kind, name);
                if meta.as_ref().is_some_and(|m| m.is_expired(now)) {
                    continue;
                }

                entries.insert(
                    name.to_string(),
                    BackupEntry {
                        value: self.decode_payload(name, &raw, meta.as_ref()),
                        kind: meta.as_ref().map(|m| m.kind),
                        timestamp: meta.as_ref().map_or(now, |m| m.timestamp),
                        source: kind,
                    },
                );
            }
        }
        entries
    }

    /// Every stored snapshot and its tier, newest first.
    fn snapshots(&self) -> Vec<(i64, TierKind)> {
        let mut found: Vec<(i64, TierKind)> = TierKind::ALL
            .into_iter()
            .flat_map(|kind| {
                self.tier_keys(kind)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(move |key| self.keys.backup_timestamp(&key).map(|ts| (ts, kind)))
            })
            .collect();
        found.sort_by(|a, b| b.0.cmp(&a.0));
        found
    }

    fn rotate_backups(&self, retention: usize) {
        for (timestamp, kind) in self.snapshots().into_iter().skip(retention.max(1)) {
            let name = StorageKeys::backup_name(timestamp);
            if self.remove_entry(kind, &name) {
                tracing::debug!(timestamp, tier = %kind, "Rotated out old snapshot");
            }
        }
    }

    /// Write the newest snapshot's entries back through `set_item`.
    pub fn restore_from_backup(&self) -> RestoreResult {
        let Some((timestamp, kind)) = self.snapshots().first().copied() else {
            return RestoreResult::failed("No backup snapshot found", None);
        };

        let name = StorageKeys::backup_name(timestamp);
        let Some(raw) = self.tier_get(kind, &self.keys.item(&name)) else {
            return RestoreResult::failed("Backup snapshot could not be read", Some(timestamp));
        };

        let recorded = self
            .tier_get(kind, &self.keys.meta(&name))
            .and_then(|meta| serde_json::from_str::<BackupMetadata>(&meta).ok());
        let decoded = match recorded {
            Some(meta) => codec::decode_recorded(&raw, &name, meta.encrypted, meta.compressed),
            None => codec::decode(&raw, &name),
        };
        if let Some(source) = decoded.error {
            let message = format!("Backup snapshot could not be decoded: {source}");
            self.record_error(
                "restore_from_backup",
                &StorageError::Transform { key: name, source },
            );
            return RestoreResult::failed(message, Some(timestamp));
        }

        let snapshot: BackupSnapshot = match serde_json::from_str(&decoded.value) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let message = format!("Backup snapshot is not valid JSON: {e}");
                self.record_error("restore_from_backup", &StorageError::from(e));
                return RestoreResult::failed(message, Some(timestamp));
            }
        };

        let policy = self.settings().policy;
        let total = snapshot.entries.len();
        let mut restored = 0;
        for (key, entry) in &snapshot.entries {
            let value = match entry.kind {
                Some(kind) => value::reconstruct(&entry.value, kind).unwrap_or_else(|e| {
                    self.record_error("restore_from_backup", &e);
                    Value::String(entry.value.clone())
                }),
                None => value::sniff(&entry.value),
            };
            let options = SetOptions {
                persist: entry.source != TierKind::Session,
                sensitive: policy.is_sensitive(key),
                ..SetOptions::default()
            };
            if self.set_item(key, &value, options) {
                restored += 1;
            } else {
                tracing::warn!(key = %key, "Could not restore key from snapshot");
            }
        }

        self.read_cache.clear();
        tracing::info!(timestamp, restored, total, "Restored from backup snapshot");

        RestoreResult {
            success: restored == total,
            message: format!("Restored {restored} of {total} keys"),
            timestamp: Some(timestamp),
            keys: Some(restored),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::config::ConfigUpdate;
    use crate::storage::engine::{GetOptions, RemoveOptions};
    use crate::storage::test_support::Harness;
    use crate::storage::StorageTier;

    #[test]
    fn backup_then_restore_brings_values_back() {
        let h = Harness::new(StorageConfig::default());
        assert!(h.engine.set_item("balance", &json!(100), SetOptions::default()));
        assert!(h.engine.set_item("coins", &json!(40), SetOptions::default()));
        assert!(h.engine.set_item("theme", &json!("dark"), SetOptions::default()));

        let outcome = h.engine.create_backup();
        assert!(matches!(
            outcome,
            BackupOutcome::Created { keys: 2, tier: TierKind::Durable, .. }
        ));

        assert!(h.engine.set_item("balance", &json!(5), SetOptions::default()));
        assert!(h.engine.remove_item("coins", RemoveOptions::default()));

        let result = h.engine.restore_from_backup();
        assert!(result.success, "{}", result.message);
        assert_eq!(result.keys, Some(2));

        let get = |key| h.engine.get_item(key, Value::Null, GetOptions::default());
        assert_eq!(get("balance"), json!(100));
        assert_eq!(get("coins"), json!(40));
        assert_eq!(get("theme"), json!("dark"));
    }

    #[test]
    fn restore_without_snapshot_changes_nothing() {
        let h = Harness::new(StorageConfig::default());
        assert!(h.engine.set_item("balance", &json!(1), SetOptions::default()));
        let before = h.durable.keys().unwrap().len();

        let result = h.engine.restore_from_backup();
        assert!(!result.success);
        assert_eq!(result.timestamp, None);
        assert_eq!(h.durable.keys().unwrap().len(), before);
    }

    #[test]
    fn backups_are_rate_limited_unless_forced() {
        let h = Harness::new(StorageConfig::default());
        assert!(h.engine.set_item("user_id", &json!("u-1"), SetOptions::default()));

        assert!(matches!(h.engine.create_backup(), BackupOutcome::Created { .. }));
        assert!(matches!(
            h.engine.create_backup(),
            BackupOutcome::RateLimited { .. }
        ));
        assert!(matches!(h.engine.backup(true), BackupOutcome::Created { .. }));
        assert_eq!(h.engine.list_backups().len(), 2);
    }

    #[test]
    fn rate_limit_survives_restart() {
        let h = Harness::new(StorageConfig::default());
        assert!(h.engine.set_item("balance", &json!(5), SetOptions::default()));
        let BackupOutcome::Created { timestamp, .. } = h.engine.create_backup() else {
            panic!("backup not created");
        };

        let restarted = StorageEngine::new(StorageConfig::default(), h.tiers.clone());
        assert_eq!(restarted.last_backup(), Some(timestamp));
        assert_eq!(
            restarted.create_backup(),
            BackupOutcome::RateLimited { last: timestamp }
        );
        assert_eq!(restarted.list_backups().len(), 1);
    }

    #[test]
    fn nothing_to_back_up() {
        let h = Harness::new(StorageConfig::default());
        assert_eq!(h.engine.create_backup(), BackupOutcome::NothingToBackup);
        assert_eq!(h.engine.last_backup(), None);
    }

    #[test]
    fn only_newest_snapshots_are_kept() {
        let h = Harness::new(StorageConfig::default());
        assert!(h.engine.set_item("settings", &json!({"sound": true}), SetOptions::default()));

        let mut created = Vec::new();
        for _ in 0..5 {
            match h.engine.backup(true) {
                BackupOutcome::Created { timestamp, .. } => created.push(timestamp),
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        let kept = h.engine.list_backups();
        assert_eq!(kept.len(), 3);
        created.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(kept, created[..3].to_vec());
    }

    #[test]
    fn snapshots_are_encrypted_and_hidden_from_keys() {
        let h = Harness::new(StorageConfig::default());
        assert!(h.engine.set_item("wallet_address", &json!("EQabc"), SetOptions::default()));
        let BackupOutcome::Created { timestamp, .. } = h.engine.create_backup() else {
            panic!("backup not created");
        };

        let raw = h
            .durable
            .get(&format!("winix_backup_{timestamp}"))
            .unwrap()
            .unwrap();
        assert!(raw.starts_with(codec::ENC_MARKER));
        assert!(!raw.contains("EQabc"));

        let meta: BackupMetadata = serde_json::from_str(
            &h.durable
                .get(&format!("winix_backup_{timestamp}_meta"))
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(meta.keys, 1);
        assert!(meta.encrypted);

        let keys = h.engine.get_keys(Default::default());
        assert!(keys.iter().all(|k| !k.starts_with("backup_")));
    }

    #[test]
    fn restore_keeps_session_entries_in_session() {
        let h = Harness::new(StorageConfig::default());
        h.engine.update_config(ConfigUpdate {
            memory_fallback: Some(false),
            ..ConfigUpdate::default()
        });
        assert!(h.engine.set_item("auth_token", &json!("tok"), SetOptions::session()));
        assert!(matches!(h.engine.create_backup(), BackupOutcome::Created { .. }));

        assert!(h.engine.remove_item("auth_token", RemoveOptions { persist: false }));
        assert!(h.engine.restore_from_backup().success);

        assert!(h.session.get("winix_auth_token").unwrap().is_some());
        assert!(h.durable.get("winix_auth_token").unwrap().is_none());
    }

    #[test]
    fn corrupt_snapshot_fails_restore() {
        let h = Harness::new(StorageConfig::default());
        h.durable.set("winix_backup_42", "{not json").unwrap();

        let result = h.engine.restore_from_backup();
        assert!(!result.success);
        assert_eq!(result.timestamp, Some(42));
        assert!(h.engine.error_count() > 0);
    }
}
