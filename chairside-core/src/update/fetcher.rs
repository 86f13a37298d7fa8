//! Update fetcher for the update service
//!
//! HTTP access to the update manifest and package downloads with:
//! - Size limits
//! - Download progress callbacks
//! - Timeout configuration
//!
//! The [`UpdateSource`] trait is the seam the pipeline is built against;
//! tests provide in-memory implementations.

use std::time::Duration;

use async_trait::async_trait;

use super::types::{InstallationEvent, UpdateCheckResult, UpdateError};

/// Default timeout for manifest requests.
const CHECK_TIMEOUT_SECS: u64 = 30;

/// Default cap on downloaded package size (512 MiB).
pub const MAX_PACKAGE_SIZE: u64 = 512 * 1024 * 1024;

/// Progress callback: (received bytes, total bytes when known).
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Update service operations consumed by the pipeline.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Checks the latest manifest entry; `None` means up to date.
    async fn check_latest(
        &self,
        platform: &str,
        arch: &str,
        current_version: &str,
        channel: &str,
    ) -> Result<Option<UpdateCheckResult>, UpdateError>;

    /// Downloads a payload, reporting progress.
    async fn fetch(
        &self,
        url: &str,
        max_size: u64,
        progress: ProgressFn<'_>,
    ) -> Result<Vec<u8>, UpdateError>;

    /// Posts an installation telemetry event. Best-effort at call sites.
    async fn register_installation(&self, event: &InstallationEvent) -> Result<(), UpdateError>;
}

/// HTTP implementation of [`UpdateSource`].
pub struct HttpUpdateSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpdateSource {
    pub fn new(base_url: &str) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(CHECK_TIMEOUT_SECS))
            .user_agent(format!(
                "Chairside/{}",
                option_env!("CARGO_PKG_VERSION").unwrap_or("0.1.0")
            ))
            .build()
            .map_err(|e| UpdateError::Network(e.to_string()))?;

        Ok(HttpUpdateSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl UpdateSource for HttpUpdateSource {
    async fn check_latest(
        &self,
        platform: &str,
        arch: &str,
        current_version: &str,
        channel: &str,
    ) -> Result<Option<UpdateCheckResult>, UpdateError> {
        let url = format!(
            "{}/updates/latest?platform={}&arch={}&currentVersion={}&channel={}",
            self.base_url, platform, arch, current_version, channel
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| UpdateError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(UpdateError::Http(response.status().as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UpdateError::InvalidResponse(e.to_string()))?;

        // An empty object is the service's other way of saying "no update".
        if body.as_object().is_some_and(|o| o.is_empty()) {
            return Ok(None);
        }

        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| UpdateError::InvalidResponse(e.to_string()))
    }

    async fn fetch(
        &self,
        url: &str,
        max_size: u64,
        progress: ProgressFn<'_>,
    ) -> Result<Vec<u8>, UpdateError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdateError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UpdateError::Http(response.status().as_u16()));
        }

        let total = response.content_length();
        if let Some(len) = total {
            if len > max_size {
                return Err(UpdateError::TooLarge {
                    size: len,
                    max: max_size,
                });
            }
        }

        let mut response = response;
        let mut data = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| UpdateError::Network(e.to_string()))?
        {
            data.extend_from_slice(&chunk);
            if data.len() as u64 > max_size {
                return Err(UpdateError::TooLarge {
                    size: data.len() as u64,
                    max: max_size,
                });
            }
            progress(data.len() as u64, total);
        }

        Ok(data)
    }

    async fn register_installation(&self, event: &InstallationEvent) -> Result<(), UpdateError> {
        let url = format!("{}/updates/register-installation", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(event)
            .send()
            .await
            .map_err(|e| UpdateError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UpdateError::Http(response.status().as_u16()));
        }
        Ok(())
    }
}
