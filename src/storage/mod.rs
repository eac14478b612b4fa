// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Layered Storage
//!
//! Key/value storage over three tiers:
//!
//! - **durable**: survives restarts (redb file in `DATA_DIR`)
//! - **session**: lives as long as the process
//! - **memory**: in-process fallback that mirrors writes
//!
//! ## Storage Layout
//!
//! ```text
//! winix_<key>              # encoded value
//! winix_<key>_meta         # ItemMetadata JSON
//! winix_backup_<millis>    # backup snapshot (encoded like any value)
//! winix_backup_<millis>_meta
//! ```
//!
//! Values are serialized by type, obfuscated when sensitive, then compressed
//! when large. Compression is always the outermost layer so the marker at the
//! start of a stored string tells how to peel it.
//!
//! ## Important Notes
//!
//! - The value cipher is an obfuscation layer, not confidentiality
//! - A tier that fails is skipped for the rest of the process
//! - Keys outside the namespace prefix are only touched by a full clear

pub mod codec;
pub mod engine;
pub mod keys;
pub mod memory;
pub mod metadata;
pub mod policy;
pub mod read_cache;
pub mod redb_tier;
pub mod stats;
pub mod tier;
pub mod value;

#[cfg(test)]
pub(crate) mod test_support;

pub use codec::{CompressionScheme, Transform};
pub use engine::{
    BackupEntry, BackupMetadata, BackupOutcome, BackupSnapshot, ClearMode, ClearOptions,
    GetOptions, KeysOptions, RemoveOptions, RestoreResult, SetOptions, StorageEngine,
};
pub use keys::StorageKeys;
pub use memory::MemoryTier;
pub use metadata::ItemMetadata;
pub use policy::{EvictionPolicy, EvictionStrategy, KeyPolicy};
pub use redb_tier::RedbTier;
pub use stats::{StorageStats, TierStats};
pub use tier::{StorageTier, TierKind, TierSet};
pub use value::ValueKind;
