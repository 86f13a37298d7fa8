// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Protocol Layer
//!
//! The bidirectional delta protocol against the sync service: the upload
//! queue for locally originated changes, the delta downloader for server
//! changes past the cursor, and the shared wire/envelope types.

#[cfg(feature = "testing")]
pub mod client;
#[cfg(not(feature = "testing"))]
mod client;

#[cfg(feature = "testing")]
pub mod download;
#[cfg(not(feature = "testing"))]
mod download;

#[cfg(feature = "testing")]
pub mod upload;
#[cfg(not(feature = "testing"))]
mod upload;

pub mod entity;
pub mod envelope;

pub use client::{
    DownloadResponse, HttpSyncClient, RemoteChange, SyncApi, SyncError, SyncScope, UploadChange,
    UploadRequest, UploadResponse,
};
pub use download::{CollisionStrategy, DeltaDownloader, DownloadOutcome, DOWNLOAD_PAGE_LIMIT};
pub use entity::EntityKind;
pub use envelope::{now_millis, PatchEnvelope, RecordMeta};
pub use upload::{BatchOutcome, UploadQueue, MAX_BATCH_SIZE, MAX_RETRIES};
