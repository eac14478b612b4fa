// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use winix_storage::config::{DATA_DIR_ENV, DEFAULT_DATA_DIR};
use winix_storage::logging::{init_tracing, LogFormat};
use winix_storage::{MaintenanceScheduler, StorageConfig, StorageEngine};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing(LogFormat::from_env());

    let data_dir = PathBuf::from(env::var(DATA_DIR_ENV).unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string()));
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return ExitCode::FAILURE;
    }

    let config = StorageConfig::from_env();
    let engine = match StorageEngine::open(&data_dir, config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!(error = %e, "Failed to open storage");
            return ExitCode::FAILURE;
        }
    };

    let stats = engine.get_storage_stats();
    tracing::info!(
        device_id = engine.device_id().as_deref().unwrap_or("unknown"),
        items = stats.durable.items,
        usage_percent = stats.usage_percent,
        "Storage ready"
    );

    let shutdown = CancellationToken::new();
    let maintenance = tokio::spawn(MaintenanceScheduler::new(engine.clone()).run(shutdown.clone()));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
    if let Err(e) = maintenance.await {
        tracing::warn!(error = %e, "Maintenance task ended abnormally");
    }

    ExitCode::SUCCESS
}
