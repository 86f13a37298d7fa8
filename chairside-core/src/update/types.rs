// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Update manifest and pipeline state types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::integrity::IntegrityError;
use super::signature::SignatureError;

/// A downloadable full application package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePackage {
    pub version: String,
    pub url: String,
    /// SHA-256 checksum in format "sha256:hexstring".
    pub checksum: String,
    /// Base64 RSA-SHA256 signature over the package bytes.
    pub signature: String,
    pub size_bytes: u64,
}

/// A differential patch from a specific installed version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifferentialPatch {
    pub from_version: String,
    pub url: String,
    pub checksum: String,
    pub signature: String,
    pub size_bytes: u64,
}

/// Manifest entry returned by `updates/latest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheckResult {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub package: UpdatePackage,
    /// Preferred over the full package when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub differential_patch: Option<DifferentialPatch>,
}

/// Pipeline phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    Checking,
    Downloading,
    Applying,
    /// Applied; restart required.
    Completed,
    Failed { error: String },
    RollingBack,
}

/// Installation telemetry event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallationEventKind {
    DownloadStarted,
    ApplyCompleted,
    ApplyFailed,
    Rollback,
}

impl InstallationEventKind {
    /// Wire name posted to `updates/register-installation`.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallationEventKind::DownloadStarted => "download_started",
            InstallationEventKind::ApplyCompleted => "apply_completed",
            InstallationEventKind::ApplyFailed => "update_apply_failure",
            InstallationEventKind::Rollback => "rollback",
        }
    }
}

/// Installation telemetry event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationEvent {
    pub device_id: String,
    pub from_version: String,
    pub to_version: String,
    pub platform: String,
    pub arch: String,
    pub event_type: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Progress/status events the pipeline emits.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    PhaseChanged(UpdatePhase),
    DownloadProgress { received: u64, total: Option<u64> },
}

/// Update pipeline error types.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Integrity check failed")]
    Integrity(#[from] IntegrityError),

    #[error("Signature verification failed")]
    Signature(#[from] SignatureError),

    #[error("Download too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No backup available for version {0}")]
    NoBackup(String),

    #[error("Patch application failed: {0}")]
    PatchFailed(String),

    #[error("Another update is already in progress")]
    Busy,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
