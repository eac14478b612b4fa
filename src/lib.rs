// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WINIX Storage - layered client-side key/value storage
//!
//! Durable, session and in-memory tiers behind one engine that handles
//! typing, obfuscation of sensitive values, compression, expiry, quota
//! eviction and backup snapshots of important keys.
//!
//! ## Modules
//!
//! - `storage` - tiers, value codec and the `StorageEngine`
//! - `maintenance` - background backup, stats and expiry timers (Tokio)
//! - `config` - engine configuration and environment variables
//! - `logging` - tracing subscriber setup

pub mod config;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod storage;

pub use config::{ConfigUpdate, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use maintenance::MaintenanceScheduler;
pub use storage::StorageEngine;
