// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The uniform interface every backing tier implements.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{TierError, TierResult};

use super::memory::MemoryTier;

/// Key written and removed by [`StorageTier::probe`].
pub const PROBE_KEY: &str = "__winix_storage_probe__";

/// Which tier a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    /// Survives restarts (redb file).
    Durable,
    /// Lives as long as the process session.
    Session,
    /// In-process fallback.
    Memory,
}

impl TierKind {
    pub const ALL: [TierKind; 3] = [TierKind::Durable, TierKind::Session, TierKind::Memory];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Durable => "durable",
            TierKind::Session => "session",
            TierKind::Memory => "memory",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal string key/value store.
///
/// Implementations use interior mutability so a tier can be shared between
/// the engine and its maintenance task.
pub trait StorageTier: Send + Sync {
    /// Read a raw value.
    fn get(&self, key: &str) -> TierResult<Option<String>>;

    /// Write a raw value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> TierResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> TierResult<()>;

    /// Every key currently stored, in no particular order.
    fn keys(&self) -> TierResult<Vec<String>>;

    /// Write-read-remove round trip used to decide whether the tier is usable.
    fn probe(&self) -> TierResult<()> {
        self.set(PROBE_KEY, "1")?;
        let read = self.get(PROBE_KEY)?;
        self.remove(PROBE_KEY)?;
        match read.as_deref() {
            Some("1") => Ok(()),
            _ => Err(TierError::Unavailable("probe value mismatch".to_string())),
        }
    }
}

/// The three tiers handed to the engine.
#[derive(Clone)]
pub struct TierSet {
    pub durable: Arc<dyn StorageTier>,
    pub session: Arc<dyn StorageTier>,
    pub memory: Arc<MemoryTier>,
}

impl TierSet {
    pub fn new(
        durable: Arc<dyn StorageTier>,
        session: Arc<dyn StorageTier>,
        memory: Arc<MemoryTier>,
    ) -> Self {
        Self {
            durable,
            session,
            memory,
        }
    }

    /// All three tiers in memory, for tests and ephemeral sessions.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryTier::new()),
            Arc::new(MemoryTier::new()),
            Arc::new(MemoryTier::new()),
        )
    }

    pub fn get(&self, kind: TierKind) -> &dyn StorageTier {
        match kind {
            TierKind::Durable => self.durable.as_ref(),
            TierKind::Session => self.session.as_ref(),
            TierKind::Memory => self.memory.as_ref(),
        }
    }
}

/// Runtime usability of the two browser-like tiers. Memory is always usable.
#[derive(Debug)]
pub struct TierAvailability {
    durable: AtomicBool,
    session: AtomicBool,
}

impl Default for TierAvailability {
    fn default() -> Self {
        Self {
            durable: AtomicBool::new(true),
            session: AtomicBool::new(true),
        }
    }
}

impl TierAvailability {
    pub fn is_usable(&self, kind: TierKind) -> bool {
        match kind {
            TierKind::Durable => self.durable.load(Ordering::Acquire),
            TierKind::Session => self.session.load(Ordering::Acquire),
            TierKind::Memory => true,
        }
    }

    /// Mark a tier unusable for the rest of the process.
    ///
    /// Returns true if this call changed the flag.
    pub fn disable(&self, kind: TierKind) -> bool {
        match kind {
            TierKind::Durable => self.durable.swap(false, Ordering::AcqRel),
            TierKind::Session => self.session.swap(false, Ordering::AcqRel),
            TierKind::Memory => false,
        }
    }
}
