// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration Types

use std::path::PathBuf;
use std::time::Duration;

use crate::merge::MergeStrategy;
use crate::sync::CollisionStrategy;

use super::error::CoreError;

/// Service endpoints and install-level settings the core reads.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Sync service base URL.
    pub sync_base_url: String,
    /// Auth service base URL.
    pub auth_base_url: String,
    /// Realtime endpoint URL (`ws://` or `wss://`).
    pub realtime_url: String,
    /// Update service base URL.
    pub update_base_url: String,
    /// Update signature public key (PEM).
    pub update_public_key_pem: String,
    /// Per-user data directory (store, staged updates, backups).
    pub data_dir: PathBuf,
    /// Application version reported to the services.
    pub app_version: String,
}

impl CoreConfig {
    /// Reads the configuration from the environment.
    pub fn from_env() -> Result<Self, CoreError> {
        let var = |name: &str| {
            std::env::var(name)
                .map_err(|_| CoreError::Configuration(format!("missing env var {}", name)))
        };

        Ok(CoreConfig {
            sync_base_url: var("CHAIRSIDE_SYNC_URL")?,
            auth_base_url: var("CHAIRSIDE_AUTH_URL")?,
            realtime_url: var("CHAIRSIDE_REALTIME_URL")?,
            update_base_url: var("CHAIRSIDE_UPDATE_URL")?,
            update_public_key_pem: var("CHAIRSIDE_UPDATE_PUBKEY_PEM")?,
            data_dir: var("CHAIRSIDE_DATA_DIR").map(PathBuf::from)?,
            app_version: option_env!("CARGO_PKG_VERSION").unwrap_or("0.1.0").to_string(),
        })
    }

    /// Directory for staged update downloads.
    pub fn updates_dir(&self) -> PathBuf {
        self.data_dir.join("updates")
    }

    /// Directory for pre-apply backups.
    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    /// Path of the local store database.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("chairside.db")
    }
}

/// Sync behavior knobs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Whether the scheduler drives periodic syncs.
    pub auto_sync: bool,
    /// Scheduler cadence.
    pub sync_interval: Duration,
    /// Minimum spacing between sync cycles (rate limit).
    pub min_sync_interval: Duration,
    /// Upload batch ceiling.
    pub batch_size: usize,
    /// Retry ceiling before a pending row is a permanent failure.
    pub max_retries: u32,
    /// Download page size.
    pub page_limit: usize,
    /// Downloader collision handling.
    pub collision_strategy: CollisionStrategy,
    /// Realtime patch merge strategy.
    pub merge_strategy: MergeStrategy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            auto_sync: true,
            sync_interval: Duration::from_secs(10),
            min_sync_interval: Duration::from_secs(10),
            batch_size: crate::sync::MAX_BATCH_SIZE,
            max_retries: crate::sync::MAX_RETRIES,
            page_limit: crate::sync::DOWNLOAD_PAGE_LIMIT,
            collision_strategy: CollisionStrategy::ServerWins,
            merge_strategy: MergeStrategy::LastWriterWins,
        }
    }
}
