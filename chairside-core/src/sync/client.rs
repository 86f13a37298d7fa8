// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Service Client
//!
//! Wire-level client for the sync service's upload/download endpoints.
//! The [`SyncApi`] trait is the seam the queue and downloader are built
//! against; tests provide scripted implementations.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::storage::StorageError;

/// Default timeout for sync service requests.
const SYNC_TIMEOUT_SECS: u64 = 30;

/// Sync error types.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Device token expired")]
    AuthExpired,

    #[error("Rate limited by server")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server rejected request: HTTP {0}")]
    Http(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Scoping ids every sync call carries.
#[derive(Debug, Clone)]
pub struct SyncScope {
    pub device_id: String,
    pub tenant_id: String,
    pub organization_id: String,
    pub clinic_id: Option<String>,
}

/// One change in an upload batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChange {
    pub local_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_data: Option<Value>,
    /// Unix milliseconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub device_id: String,
    pub tenant_id: String,
    pub organization_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinic_id: Option<String>,
    /// The client's cursor when the batch was assembled.
    pub last_sequence: u64,
    pub changes: Vec<UploadChange>,
    /// Unix milliseconds.
    pub timestamp: i64,
}

/// The server commits the batch as an ordered prefix: the first `accepted`
/// changes landed, the remaining `rejected` did not.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub accepted: usize,
    pub rejected: usize,
    pub new_sequence: u64,
}

/// One change pulled from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChange {
    pub change_id: String,
    pub sequence_number: u64,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_data: Option<Value>,
    #[serde(default)]
    pub version: u64,
    /// Unix milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_device_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub changes: Vec<RemoteChange>,
    pub current_sequence: u64,
}

/// Sync service operations consumed by the core.
#[async_trait]
pub trait SyncApi: Send + Sync {
    async fn upload(
        &self,
        token: &str,
        request: &UploadRequest,
    ) -> Result<UploadResponse, SyncError>;

    async fn download(
        &self,
        token: &str,
        scope: &SyncScope,
        since_sequence: u64,
        limit: usize,
    ) -> Result<DownloadResponse, SyncError>;
}

/// HTTP implementation of [`SyncApi`].
pub struct HttpSyncClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSyncClient {
    pub fn new(base_url: &str) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SYNC_TIMEOUT_SECS))
            .user_agent(format!(
                "Chairside/{}",
                option_env!("CARGO_PKG_VERSION").unwrap_or("0.1.0")
            ))
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(HttpSyncClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn classify(status: reqwest::StatusCode) -> SyncError {
        match status.as_u16() {
            401 => SyncError::AuthExpired,
            429 => SyncError::RateLimited,
            other => SyncError::Http(other),
        }
    }
}

#[async_trait]
impl SyncApi for HttpSyncClient {
    async fn upload(
        &self,
        token: &str,
        request: &UploadRequest,
    ) -> Result<UploadResponse, SyncError> {
        let url = format!("{}/sync/upload", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("x-device-id", &request.device_id)
            .json(request)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            log::debug!("upload failed with HTTP {}", status);
            return Err(Self::classify(status));
        }

        response
            .json()
            .await
            .map_err(|e| SyncError::InvalidResponse(e.to_string()))
    }

    async fn download(
        &self,
        token: &str,
        scope: &SyncScope,
        since_sequence: u64,
        limit: usize,
    ) -> Result<DownloadResponse, SyncError> {
        let url = format!(
            "{}/sync/download?sinceSequence={}&limit={}",
            self.base_url, since_sequence, limit
        );

        let mut request = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("x-device-id", &scope.device_id)
            .header("x-tenant-id", &scope.tenant_id)
            .header("x-organization-id", &scope.organization_id);
        if let Some(clinic_id) = &scope.clinic_id {
            request = request.header("x-clinic-id", clinic_id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            log::debug!("download failed with HTTP {}", status);
            return Err(Self::classify(status));
        }

        response
            .json()
            .await
            .map_err(|e| SyncError::InvalidResponse(e.to_string()))
    }
}
