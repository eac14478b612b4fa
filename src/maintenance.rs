// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Maintenance
//!
//! Background task that keeps a [`StorageEngine`] tidy while the process runs.
//!
//! ## Strategy
//!
//! - every `backup_interval` (default 24 h): snapshot important keys
//! - every `stats_interval` (default 30 min): recompute usage statistics
//! - every `cleanup_interval` (default 2 h): drop expired items
//! - after a write to an important key: wait until writes have been quiet
//!   for `backup_debounce` (default 5 s), then attempt a backup
//!
//! Backups started by the debounce go through the normal rate limit, so a
//! burst of balance updates produces at most one snapshot per interval.
//!
//! Intervals follow `StorageEngine::update_config`: a changed period restarts
//! its timer from the moment of the update.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`. Cancelling the token stops the
//! loop, including a debounce that is still waiting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::storage::{BackupOutcome, StorageEngine};

/// Background maintenance loop for one engine.
pub struct MaintenanceScheduler {
    engine: Arc<StorageEngine>,
}

/// Timer periods taken from one configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Periods {
    backup: Duration,
    stats: Duration,
    cleanup: Duration,
}

impl Periods {
    fn of(config: &StorageConfig) -> Self {
        Self {
            backup: config.backup_interval,
            stats: config.stats_interval,
            cleanup: config.cleanup_interval,
        }
    }
}

impl MaintenanceScheduler {
    /// Scheduler using the engine's configured intervals.
    pub fn new(engine: Arc<StorageEngine>) -> Self {
        Self { engine }
    }

    /// Run until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(scheduler.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        let mut periods = Periods::of(&self.engine.settings());
        info!(
            backup_secs = periods.backup.as_secs(),
            stats_secs = periods.stats.as_secs(),
            cleanup_secs = periods.cleanup.as_secs(),
            "Storage maintenance starting"
        );

        let mut backup_tick = ticker(periods.backup);
        let mut stats_tick = ticker(periods.stats);
        let mut cleanup_tick = ticker(periods.cleanup);
        let trigger = self.engine.backup_trigger();
        let config_changed = self.engine.config_changed();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Storage maintenance shutting down");
                    return;
                }
                _ = backup_tick.tick() => self.backup("scheduled"),
                _ = stats_tick.tick() => self.report_stats(),
                _ = cleanup_tick.tick() => {
                    let removed = self.engine.cleanup_expired();
                    debug!(removed, "Expiry sweep finished");
                }
                _ = trigger.notified() => {
                    if !self.debounce(&trigger, &shutdown).await {
                        info!("Storage maintenance shutting down");
                        return;
                    }
                    self.backup("debounced");
                }
                _ = config_changed.notified() => {
                    let next = Periods::of(&self.engine.settings());
                    if next != periods {
                        if next.backup != periods.backup {
                            backup_tick = ticker(next.backup);
                        }
                        if next.stats != periods.stats {
                            stats_tick = ticker(next.stats);
                        }
                        if next.cleanup != periods.cleanup {
                            cleanup_tick = ticker(next.cleanup);
                        }
                        info!(
                            backup_secs = next.backup.as_secs(),
                            stats_secs = next.stats.as_secs(),
                            cleanup_secs = next.cleanup.as_secs(),
                            "Storage maintenance intervals changed"
                        );
                        periods = next;
                    }
                }
            }
        }
    }

    /// Wait until no trigger fires for a full debounce window.
    ///
    /// The window is re-read on every trigger. Returns false when shutdown
    /// wins.
    async fn debounce(&self, trigger: &Notify, shutdown: &CancellationToken) -> bool {
        loop {
            let window = self.engine.settings().backup_debounce;
            tokio::select! {
                _ = tokio::time::sleep(window) => return true,
                _ = trigger.notified() => continue,
                _ = shutdown.cancelled() => return false,
            }
        }
    }

    fn backup(&self, reason: &'static str) {
        match self.engine.create_backup() {
            BackupOutcome::Created {
                timestamp,
                keys,
                tier,
            } => info!(reason, timestamp, keys, tier = %tier, "Maintenance backup created"),
            BackupOutcome::RateLimited { last } => {
                debug!(reason, last, "Maintenance backup skipped: rate limited")
            }
            BackupOutcome::NothingToBackup => {
                debug!(reason, "Maintenance backup skipped: nothing to back up")
            }
            BackupOutcome::Failed(error) => {
                warn!(reason, error = %error, "Maintenance backup failed")
            }
        }
    }

    fn report_stats(&self) {
        let stats = self.engine.refresh_stats();
        info!(
            total_bytes = stats.total_bytes,
            usage_percent = stats.usage_percent,
            durable_items = stats.durable.items,
            durable_available = stats.durable.available,
            errors = stats.error_count,
            "Storage stats refreshed"
        );
    }
}

/// Interval whose first tick is one period from now.
fn ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigUpdate;
    use crate::storage::SetOptions;
    use serde_json::json;

    fn quiet_config() -> StorageConfig {
        StorageConfig {
            backup_interval: Duration::from_secs(3600),
            stats_interval: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(3600),
            backup_debounce: Duration::from_millis(30),
            ..StorageConfig::default()
        }
    }

    #[tokio::test]
    async fn important_writes_trigger_one_debounced_backup() {
        let engine = Arc::new(StorageEngine::in_memory(quiet_config()));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(MaintenanceScheduler::new(engine.clone()).run(shutdown.clone()));

        for coins in [10, 20, 30] {
            assert!(engine.set_item("coins", &json!(coins), SetOptions::default()));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.list_backups().len(), 1);
        assert!(engine.last_backup().is_some());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn unimportant_writes_do_not_back_up() {
        let engine = Arc::new(StorageEngine::in_memory(quiet_config()));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(MaintenanceScheduler::new(engine.clone()).run(shutdown.clone()));

        assert!(engine.set_item("theme", &json!("dark"), SetOptions::default()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(engine.list_backups().is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_timer_removes_expired_items() {
        let config = StorageConfig {
            cleanup_interval: Duration::from_millis(20),
            ..quiet_config()
        };
        let engine = Arc::new(StorageEngine::in_memory(config));
        let options = SetOptions::default().expires_in(Duration::from_millis(1));
        assert!(engine.set_item("flash_sale", &json!(true), options));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(MaintenanceScheduler::new(engine.clone()).run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!engine.get_keys(Default::default()).contains(&"flash_sale".to_string()));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_interrupts_pending_debounce() {
        let config = StorageConfig {
            backup_debounce: Duration::from_secs(3600),
            ..quiet_config()
        };
        let engine = Arc::new(StorageEngine::in_memory(config));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(MaintenanceScheduler::new(engine.clone()).run(shutdown.clone()));

        assert!(engine.set_item("balance", &json!(1), SetOptions::default()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert!(engine.list_backups().is_empty());
    }

    #[tokio::test]
    async fn updated_cleanup_interval_takes_effect() {
        let engine = Arc::new(StorageEngine::in_memory(quiet_config()));
        let options = SetOptions::default().expires_in(Duration::from_millis(1));
        assert!(engine.set_item("flash_sale", &json!(true), options));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(MaintenanceScheduler::new(engine.clone()).run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        // The hourly sweep has not run yet
        assert!(engine.get_keys(Default::default()).contains(&"flash_sale".to_string()));

        engine.update_config(ConfigUpdate {
            cleanup_interval: Some(Duration::from_millis(20)),
            ..ConfigUpdate::default()
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!engine.get_keys(Default::default()).contains(&"flash_sale".to_string()));

        shutdown.cancel();
        handle.await.unwrap();
    }
}
