// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for engine tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::StorageConfig;
use crate::error::{TierError, TierResult};

use super::{MemoryTier, StorageEngine, StorageTier, TierSet};

/// Memory tier that can be switched into failing every call.
#[derive(Debug, Default)]
pub struct FaultyTier {
    inner: MemoryTier,
    failing: AtomicBool,
}

impl FaultyTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryTier {
        &self.inner
    }

    fn check(&self) -> TierResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TierError::Unavailable("simulated failure".to_string()));
        }
        Ok(())
    }
}

impl StorageTier for FaultyTier {
    fn get(&self, key: &str) -> TierResult<Option<String>> {
        self.check()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> TierResult<()> {
        self.check()?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> TierResult<()> {
        self.check()?;
        self.inner.remove(key)
    }

    fn keys(&self) -> TierResult<Vec<String>> {
        self.check()?;
        self.inner.keys()
    }
}

/// Engine over in-memory tiers with handles to inspect raw storage.
pub struct Harness {
    pub engine: StorageEngine,
    pub tiers: TierSet,
    pub durable: Arc<MemoryTier>,
    pub session: Arc<MemoryTier>,
    pub memory: Arc<MemoryTier>,
}

impl Harness {
    pub fn new(config: StorageConfig) -> Self {
        let durable = Arc::new(MemoryTier::new());
        let session = Arc::new(MemoryTier::new());
        let memory = Arc::new(MemoryTier::new());
        let tiers = TierSet::new(durable.clone(), session.clone(), memory.clone());

        Self {
            engine: StorageEngine::new(config, tiers.clone()),
            tiers,
            durable,
            session,
            memory,
        }
    }
}

/// Engine whose durable tier is `durable`.
pub fn engine_with(
    durable: FaultyTier,
    config: StorageConfig,
) -> (StorageEngine, Arc<FaultyTier>, Arc<MemoryTier>) {
    let durable = Arc::new(durable);
    let memory = Arc::new(MemoryTier::new());
    let tiers = TierSet::new(durable.clone(), Arc::new(MemoryTier::new()), memory.clone());
    (StorageEngine::new(config, tiers), durable, memory)
}
