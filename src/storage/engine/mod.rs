// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The layered storage engine.
//!
//! One [`StorageEngine`] owns the three tiers and every piece of state that
//! used to be ambient: configuration, availability flags, the error counter,
//! the backup clock and the read cache. Construct it once and share it as
//! `Arc<StorageEngine>`.
//!
//! Public methods never return errors. Internal steps use
//! [`StorageResult`] and `?`; the public wrapper logs the error, bumps the
//! error counter and answers with a typed fallback (`false`, the default
//! value, an empty list).

mod backup;
mod eviction;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::config::{ConfigUpdate, StorageConfig, DURABLE_FILE_NAME};
use crate::error::{StorageError, StorageResult, TierError};

use super::codec::{self, Transform, ENC_MARKER};
use super::keys::{StorageKeys, DEVICE_ID_NAME, META_SUFFIX};
use super::memory::MemoryTier;
use super::metadata::ItemMetadata;
use super::read_cache::{CachedValue, ReadCache};
use super::redb_tier::RedbTier;
use super::stats::{StorageStats, TierStats};
use super::tier::{TierAvailability, TierKind, TierSet};
use super::value::{self, ValueKind};

pub use backup::{BackupEntry, BackupMetadata, BackupOutcome, BackupSnapshot, RestoreResult};

// =============================================================================
// Options
// =============================================================================

/// Options for [`StorageEngine::set_item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOptions {
    /// Durable tier when true, session tier when false.
    pub persist: bool,
    /// Time to live.
    pub expires: Option<Duration>,
    /// Force obfuscation regardless of the key name.
    pub sensitive: bool,
    /// `Some(true)` always tries, `Some(false)` never, `None` decides by size.
    pub compress: Option<bool>,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            persist: true,
            expires: None,
            sensitive: false,
            compress: None,
        }
    }
}

impl SetOptions {
    pub fn session() -> Self {
        Self {
            persist: false,
            ..Self::default()
        }
    }

    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires = Some(ttl);
        self
    }

    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = sensitive;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }
}

/// Options for [`StorageEngine::get_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetOptions {
    pub check_expiry: bool,
    /// Probe the durable tier when true, the session tier when false.
    pub persist: bool,
    /// Rebuild the logical type; when false the decoded string is returned.
    pub parse: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            check_expiry: true,
            persist: true,
            parse: true,
        }
    }
}

impl GetOptions {
    pub fn session() -> Self {
        Self {
            persist: false,
            ..Self::default()
        }
    }

    pub fn raw() -> Self {
        Self {
            parse: false,
            ..Self::default()
        }
    }
}

/// Options for [`StorageEngine::remove_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOptions {
    pub persist: bool,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self { persist: true }
    }
}

/// What [`StorageEngine::clear`] removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearMode {
    /// Every entry in every tier, foreign keys included.
    #[default]
    All,
    /// Only items whose metadata expiry has passed.
    OnlyExpired,
    /// Only keys under the namespace prefix.
    OnlyPrefix,
}

/// Options for [`StorageEngine::clear`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearOptions {
    pub mode: ClearMode,
    /// Logical or storage keys left untouched, together with their metadata.
    pub preserve_keys: Vec<String>,
}

impl ClearOptions {
    pub fn only_prefix() -> Self {
        Self {
            mode: ClearMode::OnlyPrefix,
            preserve_keys: Vec::new(),
        }
    }

    pub fn only_expired() -> Self {
        Self {
            mode: ClearMode::OnlyExpired,
            preserve_keys: Vec::new(),
        }
    }

    pub fn preserve<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preserve_keys.extend(keys.into_iter().map(Into::into));
        self
    }
}

/// Options for [`StorageEngine::get_keys`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeysOptions {
    /// Return storage keys (with the namespace prefix) instead of names.
    pub with_prefix: bool,
    pub only_expired: bool,
    pub only_sensitive: bool,
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Length of `size` plaintext bytes once encrypted and base64 wrapped.
fn encrypted_len(size: usize) -> usize {
    ENC_MARKER.len() + size.div_ceil(3) * 4
}

// =============================================================================
// StorageEngine
// =============================================================================

/// Layered key/value store over durable, session and memory tiers.
pub struct StorageEngine {
    config: RwLock<StorageConfig>,
    keys: StorageKeys,
    tiers: TierSet,
    availability: TierAvailability,
    read_cache: ReadCache,
    stats: Mutex<StorageStats>,
    error_count: AtomicU64,
    last_backup: Mutex<Option<i64>>,
    backup_trigger: Arc<Notify>,
    config_changed: Arc<Notify>,
}

impl StorageEngine {
    /// Build an engine over the given tiers.
    ///
    /// Probes the durable and session tiers, picks up the newest existing
    /// snapshot for the backup rate limit, creates the device id if it is
    /// missing and computes initial stats.
    pub fn new(config: StorageConfig, tiers: TierSet) -> Self {
        let engine = Self {
            keys: StorageKeys::new(config.prefix.clone()),
            read_cache: ReadCache::new(config.read_cache_capacity, config.read_cache_ttl),
            config: RwLock::new(config),
            tiers,
            availability: TierAvailability::default(),
            stats: Mutex::new(StorageStats::empty()),
            error_count: AtomicU64::new(0),
            last_backup: Mutex::new(None),
            backup_trigger: Arc::new(Notify::new()),
            config_changed: Arc::new(Notify::new()),
        };

        engine.probe_tiers();
        // Restarts keep the backup rate limit
        *lock(&engine.last_backup) = engine.list_backups().first().copied();
        if engine.ensure_device_id().is_none() {
            tracing::warn!("Could not persist a device id");
        }
        engine.refresh_stats();
        engine
    }

    /// Engine with all three tiers held in memory.
    pub fn in_memory(config: StorageConfig) -> Self {
        Self::new(config, TierSet::in_memory())
    }

    /// Engine whose durable tier is a redb file inside `data_dir`.
    pub fn open(data_dir: &Path, config: StorageConfig) -> StorageResult<Self> {
        let path = data_dir.join(DURABLE_FILE_NAME);
        let durable = RedbTier::open(&path, Some(config.max_storage_size)).map_err(|e| {
            StorageError::TierUnavailable {
                tier: TierKind::Durable,
                reason: e.to_string(),
            }
        })?;

        tracing::info!(path = %path.display(), "Durable tier opened");

        let tiers = TierSet::new(
            Arc::new(durable),
            Arc::new(MemoryTier::new()),
            Arc::new(MemoryTier::new()),
        );
        Ok(Self::new(config, tiers))
    }

    // ========== Public API ==========

    /// Store a value. Returns false when no tier accepted it.
    pub fn set_item(&self, key: &str, value: &Value, options: SetOptions) -> bool {
        match self.write_item(key, value, &options) {
            Ok(stored) => stored,
            Err(e) => {
                self.record_error("set_item", &e);
                false
            }
        }
    }

    /// Read a value, or `default` when it is absent, expired or unreadable.
    pub fn get_item(&self, key: &str, default: Value, options: GetOptions) -> Value {
        match self.read_item(key, options) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                self.record_error("get_item", &e);
                default
            }
        }
    }

    /// Remove a value and its metadata. Removing an absent key succeeds.
    pub fn remove_item(&self, key: &str, options: RemoveOptions) -> bool {
        if key.is_empty() {
            self.record_error("remove_item", &StorageError::InvalidKey("empty key".into()));
            return false;
        }

        let primary = if options.persist {
            TierKind::Durable
        } else {
            TierKind::Session
        };
        let ok = [primary, TierKind::Memory]
            .into_iter()
            .map(|kind| self.remove_entry(kind, key))
            .fold(true, |acc, removed| acc && removed);

        self.read_cache.invalidate(key);
        tracing::debug!(key = %key, tier = %primary, "Removed item");
        ok
    }

    /// Serialize any `T` and store it.
    pub fn set_json<T: Serialize>(&self, key: &str, value: &T, options: SetOptions) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => self.set_item(key, &value, options),
            Err(e) => {
                self.record_error("set_json", &StorageError::from(e));
                false
            }
        }
    }

    /// Read and deserialize a `T`. `None` when absent or of the wrong shape.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.get_item(key, Value::Null, GetOptions::default()) {
            Value::Null => None,
            value => match serde_json::from_value(value) {
                Ok(typed) => Some(typed),
                Err(e) => {
                    self.record_error("get_json", &StorageError::from(e));
                    None
                }
            },
        }
    }

    /// Bulk removal. A forced backup snapshot is attempted first and
    /// snapshots are never removed.
    pub fn clear(&self, options: ClearOptions) -> bool {
        if let BackupOutcome::Failed(reason) = self.backup(true) {
            tracing::warn!(reason = %reason, "Pre-clear backup failed, clearing anyway");
        }

        let now = now_millis();
        let mut ok = true;
        let mut removed = 0usize;

        for kind in TierKind::ALL {
            if !self.availability.is_usable(kind) {
                continue;
            }

            if options.mode == ClearMode::OnlyExpired {
                removed += self.sweep_expired(kind, now, &options.preserve_keys);
                continue;
            }

            let Some(keys) = self.tier_keys(kind) else {
                ok = false;
                continue;
            };
            for key in keys {
                if self.keys.is_backup(&key) || self.is_preserved(&key, &options.preserve_keys) {
                    continue;
                }
                if options.mode == ClearMode::OnlyPrefix && !self.keys.is_namespaced(&key) {
                    continue;
                }
                ok &= self.tier_remove(kind, &key);
                removed += 1;
            }
        }

        self.read_cache.clear();
        tracing::info!(mode = ?options.mode, removed, "Storage cleared");
        ok
    }

    /// Application keys across all tiers, sorted and de-duplicated.
    pub fn get_keys(&self, options: KeysOptions) -> Vec<String> {
        let policy = self.settings().policy;
        let now = now_millis();
        let mut names = BTreeSet::new();

        for kind in TierKind::ALL {
            for key in self.tier_keys(kind).unwrap_or_default() {
                let Some(name) = self.keys.item_name(&key) else {
                    continue;
                };

                if options.only_expired || options.only_sensitive {
                    let meta = self.read_meta(kind, name);
                    if options.only_expired && !meta.as_ref().is_some_and(|m| m.is_expired(now)) {
                        continue;
                    }
                    if options.only_sensitive
                        && !(policy.is_sensitive(name) || meta.as_ref().is_some_and(|m| m.encrypted))
                    {
                        continue;
                    }
                }

                names.insert(if options.with_prefix {
                    key.clone()
                } else {
                    name.to_string()
                });
            }
        }

        names.into_iter().collect()
    }

    /// Merge `update` into the configuration and return the result.
    pub fn update_config(&self, update: ConfigUpdate) -> StorageConfig {
        let effective = {
            let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
            config.apply(update);
            config.clone()
        };
        self.read_cache.clear();
        self.config_changed.notify_one();
        tracing::info!(
            encryption = effective.encryption_enabled,
            compression = effective.compression_enabled,
            memory_fallback = effective.memory_fallback,
            "Storage configuration updated"
        );
        effective
    }

    /// Current effective configuration.
    pub fn settings(&self) -> StorageConfig {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Recompute usage statistics.
    pub fn get_storage_stats(&self) -> StorageStats {
        self.refresh_stats()
    }

    /// Stats from the last refresh, without touching the tiers.
    pub fn cached_stats(&self) -> StorageStats {
        lock(&self.stats).clone()
    }

    /// Recompute stats and remember them.
    pub fn refresh_stats(&self) -> StorageStats {
        let stats = self.compute_stats();
        *lock(&self.stats) = stats.clone();
        stats
    }

    /// Errors absorbed since construction.
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn is_tier_usable(&self, kind: TierKind) -> bool {
        self.availability.is_usable(kind)
    }

    /// The persisted per-device identifier, created if missing.
    pub fn device_id(&self) -> Option<String> {
        self.ensure_device_id()
    }

    /// Signalled after every successful write of an important key.
    pub fn backup_trigger(&self) -> Arc<Notify> {
        Arc::clone(&self.backup_trigger)
    }

    /// Signalled after every `update_config`.
    pub fn config_changed(&self) -> Arc<Notify> {
        Arc::clone(&self.config_changed)
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    // ========== Write Path ==========

    fn write_item(&self, name: &str, value: &Value, options: &SetOptions) -> StorageResult<bool> {
        let config = self.settings();
        if name.is_empty() {
            return Err(StorageError::InvalidKey("empty key".into()));
        }
        if StorageKeys::is_reserved(name) {
            return Err(StorageError::InvalidKey(format!("`{name}` is a reserved name")));
        }

        let serialized = value::serialize(value)?;
        let size = serialized.len();
        if size > config.max_item_size {
            return Err(StorageError::SizeExceeded {
                key: name.to_string(),
                size,
                limit: config.max_item_size,
            });
        }

        let encrypt =
            config.encryption_enabled && (options.sensitive || config.policy.is_sensitive(name));
        let projected = if encrypt { encrypted_len(size) } else { size };
        let compress = match options.compress {
            Some(explicit) => explicit,
            None => config.compression_enabled && projected > config.compression_threshold,
        };

        let mut plan = Vec::with_capacity(2);
        if encrypt {
            plan.push(Transform::Encrypt);
        }
        if compress {
            plan.push(Transform::Compress(config.preferred_compression));
        }
        let encoded = codec::encode(&serialized, name, &plan);

        let now = now_millis();
        let meta = ItemMetadata {
            timestamp: now,
            expires: options
                .expires
                .map(|ttl| now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))),
            kind: ValueKind::of(value),
            encrypted: encoded.encrypted(),
            compressed: encoded.compressed(),
            size,
        };
        let meta_json = serde_json::to_string(&meta)?;

        let primary = if options.persist {
            TierKind::Durable
        } else {
            TierKind::Session
        };
        let stored_primary = self.persist_entry(primary, name, &encoded.payload, &meta_json, &config);
        if !stored_primary && self.availability.is_usable(primary) {
            // Do not leave an older value shadowing the mirrored one
            self.remove_entry(primary, name);
        }

        let mirror = config.memory_fallback || !stored_primary;
        let stored_memory =
            mirror && self.persist_entry(TierKind::Memory, name, &encoded.payload, &meta_json, &config);

        self.read_cache.invalidate(name);

        if !stored_primary && !stored_memory {
            return Ok(false);
        }

        let tier = if stored_primary { primary } else { TierKind::Memory };
        tracing::debug!(
            key = %name,
            tier = %tier,
            encrypted = meta.encrypted,
            compressed = meta.compressed,
            bytes = encoded.payload.len(),
            "Stored item"
        );

        if config.policy.is_important(name) {
            self.backup_trigger.notify_one();
        }
        Ok(true)
    }

    /// Write value and metadata to one tier, recovering from a durable quota
    /// failure by eviction.
    fn persist_entry(
        &self,
        kind: TierKind,
        name: &str,
        payload: &str,
        meta_json: &str,
        config: &StorageConfig,
    ) -> bool {
        if !self.availability.is_usable(kind) {
            return false;
        }

        match self.write_pair(kind, name, payload, meta_json) {
            Ok(()) => true,
            Err(e) if e.is_quota() && kind == TierKind::Durable => {
                self.record_error(
                    "set_item",
                    &StorageError::QuotaExceeded {
                        tier: kind,
                        key: name.to_string(),
                    },
                );
                self.recover_from_quota(name, payload, meta_json, config)
            }
            Err(e) => {
                self.tier_failed(kind, "set_item", e);
                false
            }
        }
    }

    fn recover_from_quota(
        &self,
        name: &str,
        payload: &str,
        meta_json: &str,
        config: &StorageConfig,
    ) -> bool {
        let stats = self.refresh_stats();
        let ratio = stats.durable_ratio(config.max_storage_size);
        if ratio <= config.eviction_threshold {
            tracing::warn!(
                key = %name,
                usage = ratio,
                "Durable quota hit below eviction threshold, not evicting"
            );
            return false;
        }

        let evicted = self.evict_with(config);
        tracing::info!(key = %name, evicted, "Evicted items after quota failure, retrying write");

        match self.write_pair(TierKind::Durable, name, payload, meta_json) {
            Ok(()) => true,
            Err(e) => {
                if self.availability.disable(TierKind::Durable) {
                    tracing::warn!(error = %e, "Durable tier still full after eviction, disabling it");
                }
                self.record_error("set_item", &StorageError::Tier(e));
                false
            }
        }
    }

    /// Value then metadata. A failed metadata write removes the value.
    fn write_pair(
        &self,
        kind: TierKind,
        name: &str,
        payload: &str,
        meta_json: &str,
    ) -> Result<(), TierError> {
        let tier = self.tiers.get(kind);
        let item_key = self.keys.item(name);
        let meta_key = self.keys.meta(name);

        tier.set(&item_key, payload)?;
        if let Err(e) = tier.set(&meta_key, meta_json) {
            let _ = tier.remove(&item_key);
            let _ = tier.remove(&meta_key);
            return Err(e);
        }
        Ok(())
    }

    // ========== Read Path ==========

    fn read_item(&self, name: &str, options: GetOptions) -> StorageResult<Option<Value>> {
        if name.is_empty() {
            return Err(StorageError::InvalidKey("empty key".into()));
        }
        let now = now_millis();

        let order = if options.persist {
            [TierKind::Durable, TierKind::Memory]
        } else {
            [TierKind::Session, TierKind::Memory]
        };
        let item_key = self.keys.item(name);
        let found = order
            .into_iter()
            .find_map(|kind| self.tier_get(kind, &item_key).map(|raw| (kind, raw)));
        let Some((kind, raw)) = found else {
            self.read_cache.invalidate(name);
            return Ok(None);
        };

        let meta = self.read_meta(kind, name);
        if options.check_expiry && meta.as_ref().is_some_and(|m| m.is_expired(now)) {
            tracing::debug!(key = %name, tier = %kind, "Dropping expired item");
            self.purge(name);
            return Ok(None);
        }

        let cached = match self.read_cache.get(options.persist, name, &raw, meta.as_ref()) {
            Some(hit) => hit,
            None => {
                let fresh = CachedValue {
                    decoded: self.decode_payload(name, &raw, meta.as_ref()),
                    raw,
                    meta,
                };
                self.read_cache.put(options.persist, name, fresh.clone());
                fresh
            }
        };
        Ok(Some(self.materialize(name, &cached, options.parse)))
    }

    fn read_meta(&self, kind: TierKind, name: &str) -> Option<ItemMetadata> {
        self.tier_get(kind, &self.keys.meta(name))
            .and_then(|raw| ItemMetadata::parse(&raw))
    }

    /// Reverse stored transforms, counting a failed layer as an error.
    ///
    /// Metadata decides which layers were applied. Markers are only sniffed
    /// for items written without it.
    fn decode_payload(&self, name: &str, raw: &str, meta: Option<&ItemMetadata>) -> String {
        let decoded = match meta {
            Some(meta) => codec::decode_recorded(raw, name, meta.encrypted, meta.compressed),
            None => codec::decode(raw, name),
        };
        if let Some(source) = decoded.error {
            self.record_error(
                "decode",
                &StorageError::Transform {
                    key: name.to_string(),
                    source,
                },
            );
        }
        decoded.value
    }

    /// Turn a decoded payload into the caller's value.
    ///
    /// A payload that does not match its recorded kind is returned as a
    /// string and counted as an error.
    fn materialize(&self, name: &str, cached: &CachedValue, parse: bool) -> Value {
        if !parse {
            return Value::String(cached.decoded.clone());
        }
        let Some(meta) = &cached.meta else {
            return value::sniff(&cached.decoded);
        };
        value::reconstruct(&cached.decoded, meta.kind).unwrap_or_else(|e| {
            tracing::debug!(key = %name, kind = ?meta.kind, "Stored value does not match its type");
            self.record_error("get_item", &e);
            Value::String(cached.decoded.clone())
        })
    }

    // ========== Removal Helpers ==========

    /// Remove an item and its metadata from one tier.
    fn remove_entry(&self, kind: TierKind, name: &str) -> bool {
        let item = self.tier_remove(kind, &self.keys.item(name));
        let meta = self.tier_remove(kind, &self.keys.meta(name));
        item && meta
    }

    /// Remove an item from every tier.
    fn purge(&self, name: &str) {
        for kind in TierKind::ALL {
            self.remove_entry(kind, name);
        }
        self.read_cache.invalidate(name);
    }

    /// Exact key, its metadata key, or the namespaced form of either.
    fn is_preserved(&self, storage_key: &str, preserve: &[String]) -> bool {
        let logical = self.keys.logical(storage_key).unwrap_or(storage_key);
        let base = logical.strip_suffix(META_SUFFIX).unwrap_or(logical);
        let raw_base = storage_key.strip_suffix(META_SUFFIX).unwrap_or(storage_key);
        preserve
            .iter()
            .any(|p| p == logical || p == base || p == storage_key || p == raw_base)
    }

    // ========== Device Id ==========

    fn ensure_device_id(&self) -> Option<String> {
        if let Value::String(id) = self.get_item(DEVICE_ID_NAME, Value::Null, GetOptions::default()) {
            if !id.is_empty() {
                return Some(id);
            }
        }

        let id = format!("{}-{}", Uuid::new_v4().simple(), now_millis());
        if self.set_item(DEVICE_ID_NAME, &Value::String(id.clone()), SetOptions::default()) {
            tracing::info!(device_id = %id, "Generated device id");
            Some(id)
        } else {
            None
        }
    }

    // ========== Stats ==========

    fn compute_stats(&self) -> StorageStats {
        let config = self.settings();
        let mut encrypted = BTreeSet::new();
        let mut compressed = BTreeSet::new();

        let mut per_tier = |kind: TierKind| -> TierStats {
            if !self.availability.is_usable(kind) {
                return TierStats::default();
            }
            let Some(keys) = self.tier_keys(kind) else {
                return TierStats::default();
            };

            let mut stats = TierStats {
                available: self.availability.is_usable(kind),
                ..TierStats::default()
            };
            for key in keys.iter().filter(|k| self.keys.is_namespaced(k)) {
                if let Some(raw) = self.tier_get(kind, key) {
                    stats.bytes += key.len() + raw.len();
                }
                if let Some(name) = self.keys.item_name(key) {
                    stats.items += 1;
                    if let Some(meta) = self.read_meta(kind, name) {
                        if meta.encrypted {
                            encrypted.insert(name.to_string());
                        }
                        if meta.compressed {
                            compressed.insert(name.to_string());
                        }
                    }
                }
            }
            stats
        };

        let durable = per_tier(TierKind::Durable);
        let session = per_tier(TierKind::Session);
        let memory = per_tier(TierKind::Memory);

        let usage_percent = if config.max_storage_size == 0 {
            0.0
        } else {
            durable.bytes as f64 / config.max_storage_size as f64 * 100.0
        };

        StorageStats {
            total_bytes: durable.bytes + session.bytes + memory.bytes,
            durable,
            session,
            memory,
            usage_percent,
            encrypted_items: encrypted.len(),
            compressed_items: compressed.len(),
            error_count: self.error_count(),
            last_updated: Utc::now(),
        }
    }

    // ========== Tier Access ==========

    fn probe_tiers(&self) {
        for kind in [TierKind::Durable, TierKind::Session] {
            if let Err(e) = self.tiers.get(kind).probe() {
                self.availability.disable(kind);
                self.record_error(
                    "probe",
                    &StorageError::TierUnavailable {
                        tier: kind,
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    fn tier_get(&self, kind: TierKind, key: &str) -> Option<String> {
        if !self.availability.is_usable(kind) {
            return None;
        }
        match self.tiers.get(kind).get(key) {
            Ok(value) => value,
            Err(e) => {
                self.tier_failed(kind, "get", e);
                None
            }
        }
    }

    /// Unusable tiers are skipped and count as success.
    fn tier_remove(&self, kind: TierKind, key: &str) -> bool {
        if !self.availability.is_usable(kind) {
            return true;
        }
        match self.tiers.get(kind).remove(key) {
            Ok(()) => true,
            Err(e) => {
                self.tier_failed(kind, "remove", e);
                false
            }
        }
    }

    fn tier_keys(&self, kind: TierKind) -> Option<Vec<String>> {
        if !self.availability.is_usable(kind) {
            return None;
        }
        match self.tiers.get(kind).keys() {
            Ok(keys) => Some(keys),
            Err(e) => {
                self.tier_failed(kind, "keys", e);
                None
            }
        }
    }

    fn tier_failed(&self, kind: TierKind, operation: &'static str, error: TierError) {
        if matches!(error, TierError::Unavailable(_)) && self.availability.disable(kind) {
            tracing::warn!(tier = %kind, "Tier marked unavailable for this session");
        }
        self.record_error(operation, &StorageError::Tier(error));
    }

    fn record_error(&self, operation: &'static str, error: &StorageError) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(operation, error = %error, "Storage operation failed");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// Tests
// =============================================================================
