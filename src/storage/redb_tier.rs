// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable tier backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `entries`: storage key → raw stored string (already transformed by the
//!   engine, so this table only ever sees opaque strings)
//!
//! The tier keeps a running total of key + value bytes so it can enforce a
//! quota the same way a browser enforces its per-origin storage limit.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::{TierError, TierResult};

use super::tier::StorageTier;

// =============================================================================
// Table Definitions
// =============================================================================

/// Storage key → raw value.
const ENTRIES: TableDefinition<&str, &str> = TableDefinition::new("entries");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RedbTierError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error(transparent)]
    Tier(#[from] TierError),
}

impl From<RedbTierError> for TierError {
    fn from(err: RedbTierError) -> Self {
        match err {
            RedbTierError::Tier(inner) => inner,
            RedbTierError::RedbDatabase(e) => TierError::Unavailable(e.to_string()),
            other => TierError::Backend(other.to_string()),
        }
    }
}

type RedbResult<T> = Result<T, RedbTierError>;

// =============================================================================
// RedbTier
// =============================================================================

/// Durable key/value tier stored in a single redb file.
pub struct RedbTier {
    db: Database,
    used: Mutex<usize>,
    quota: Option<usize>,
}

impl RedbTier {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path, quota: Option<usize>) -> RedbResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ENTRIES)?;
        }
        write_txn.commit()?;

        let used = {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(ENTRIES)?;
            let mut total = 0usize;
            for entry in table.iter()? {
                let (key, value) = entry?;
                total += key.value().len() + value.value().len();
            }
            total
        };

        tracing::debug!(path = %path.display(), used_bytes = used, "Opened durable tier");

        Ok(Self {
            db,
            used: Mutex::new(used),
            quota,
        })
    }

    /// Bytes currently held (keys plus values).
    pub fn used_bytes(&self) -> usize {
        self.used.lock().map(|used| *used).unwrap_or(0)
    }

    fn lock_used(&self) -> RedbResult<MutexGuard<'_, usize>> {
        self.used
            .lock()
            .map_err(|_| TierError::Unavailable("durable tier lock poisoned".to_string()).into())
    }

    fn read(&self, key: &str) -> RedbResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;
        match table.get(key)? {
            Some(value) => Ok(Some(value.value().to_string())),
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, value: &str) -> RedbResult<()> {
        let mut used = self.lock_used()?;
        let requested = key.len() + value.len();

        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(ENTRIES)?;
            let previous = table
                .get(key)?
                .map(|old| key.len() + old.value().len())
                .unwrap_or(0);
            let next = used.saturating_sub(previous) + requested;

            match self.quota {
                Some(quota) if next > quota => Err(TierError::QuotaExceeded {
                    used: *used,
                    quota,
                    requested,
                }),
                _ => {
                    table.insert(key, value)?;
                    Ok(next)
                }
            }
        };

        match outcome {
            Ok(next) => {
                write_txn.commit()?;
                *used = next;
                Ok(())
            }
            Err(quota_err) => {
                write_txn.abort()?;
                Err(quota_err.into())
            }
        }
    }

    fn delete(&self, key: &str) -> RedbResult<()> {
        let mut used = self.lock_used()?;

        let write_txn = self.db.begin_write()?;
        let freed = {
            let mut table = write_txn.open_table(ENTRIES)?;
            let removed = table.remove(key)?;
            removed.map(|old| key.len() + old.value().len()).unwrap_or(0)
        };
        write_txn.commit()?;

        *used = used.saturating_sub(freed);
        Ok(())
    }

    fn list(&self) -> RedbResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;
        let mut keys = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

impl StorageTier for RedbTier {
    fn get(&self, key: &str) -> TierResult<Option<String>> {
        Ok(self.read(key)?)
    }

    fn set(&self, key: &str, value: &str) -> TierResult<()> {
        Ok(self.write(key, value)?)
    }

    fn remove(&self, key: &str) -> TierResult<()> {
        Ok(self.delete(key)?)
    }

    fn keys(&self) -> TierResult<Vec<String>> {
        Ok(self.list()?)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_tier(quota: Option<usize>) -> (RedbTier, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let tier = RedbTier::open(&dir.path().join("storage.redb"), quota).unwrap();
        (tier, dir)
    }

    #[test]
    fn set_and_get() {
        let (tier, _dir) = temp_tier(None);
        tier.set("winix_balance", "42").unwrap();
        assert_eq!(tier.get("winix_balance").unwrap().as_deref(), Some("42"));
        assert!(tier.get("missing").unwrap().is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let (tier, _dir) = temp_tier(None);
        tier.set("k", "v").unwrap();
        tier.remove("k").unwrap();
        tier.remove("k").unwrap();
        assert!(tier.get("k").unwrap().is_none());
        assert_eq!(tier.used_bytes(), 0);
    }

    #[test]
    fn quota_is_enforced_and_rolled_back() {
        let (tier, _dir) = temp_tier(Some(16));
        tier.set("aaaa", "12345678").unwrap();
        assert_eq!(tier.used_bytes(), 12);

        let err = tier.set("bbbb", "12345").unwrap_err();
        assert!(err.is_quota());
        assert!(tier.get("bbbb").unwrap().is_none());
        assert_eq!(tier.used_bytes(), 12);
    }

    #[test]
    fn usage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.redb");
        {
            let tier = RedbTier::open(&path, None).unwrap();
            tier.set("abc", "defg").unwrap();
            tier.set("xy", "z").unwrap();
        }

        let tier = RedbTier::open(&path, None).unwrap();
        assert_eq!(tier.used_bytes(), 10);

        let mut keys = tier.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["abc".to_string(), "xy".to_string()]);
    }

    #[test]
    fn probe_passes() {
        let (tier, _dir) = temp_tier(None);
        tier.probe().unwrap();
        assert!(tier.keys().unwrap().is_empty());
    }
}
