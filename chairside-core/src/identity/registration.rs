// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device Registration & Token Lifecycle
//!
//! Registration protocol: the caller supplies scoping ids and a short-lived
//! user bearer token; the client collects device metadata, registers,
//! exchanges the bootstrap token for device access/refresh tokens,
//! generates a fresh encryption key, and persists secrets + identity row.
//!
//! Token refresh runs on initialization and on 401 from any
//! device-authenticated call. On refresh failure the identity is marked
//! "needs re-login" and outbound sync suspends.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::vault::{DeviceSecretStore, DeviceSecrets, SecretContext};
use super::{hardware_fingerprint, DeviceIdentity, IdentityError, Platform};
use crate::crypto::SymmetricKey;
use crate::storage::Store;
use crate::sync::envelope::now_millis;

/// Default timeout for auth service requests.
const AUTH_TIMEOUT_SECS: u64 = 30;

/// Auth service error types.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(e.to_string())
    }
}

/// Device metadata posted at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetadata {
    pub device_name: String,
    pub hardware_fingerprint: String,
    pub platform: String,
    pub os_version: String,
    pub app_version: String,
}

impl DeviceMetadata {
    /// Collects metadata for this machine.
    pub fn collect(device_name: &str, app_version: &str) -> Self {
        DeviceMetadata {
            device_name: device_name.to_string(),
            hardware_fingerprint: hardware_fingerprint(),
            platform: Platform::current().as_str().to_string(),
            os_version: std::env::consts::OS.to_string(),
            app_version: app_version.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    pub tenant_id: String,
    pub organization_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinic_id: Option<String>,
    pub user_id: String,
    pub metadata: DeviceMetadata,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceResponse {
    pub device_id: String,
    /// Intermediate bootstrap token, exchanged at device login.
    pub device_access_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLoginRequest {
    pub device_id: String,
    pub device_access_token: String,
    pub tenant_id: String,
    pub organization_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinic_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Auth service operations consumed by the core.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn register_device(
        &self,
        user_token: &str,
        request: &RegisterDeviceRequest,
    ) -> Result<RegisterDeviceResponse, AuthError>;

    async fn device_login(&self, request: &DeviceLoginRequest) -> Result<TokenPair, AuthError>;

    async fn refresh(
        &self,
        refresh_token: &str,
        organization_id: &str,
    ) -> Result<TokenPair, AuthError>;

    async fn revoke_device(&self, device_token: &str, device_id: &str) -> Result<(), AuthError>;
}

/// HTTP implementation of [`AuthApi`].
pub struct HttpAuthApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(base_url: &str) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(AUTH_TIMEOUT_SECS))
            .user_agent(format!(
                "Chairside/{}",
                option_env!("CARGO_PKG_VERSION").unwrap_or("0.1.0")
            ))
            .build()?;

        Ok(HttpAuthApi {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn classify(status: reqwest::StatusCode) -> AuthError {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            AuthError::Unauthorized
        } else {
            AuthError::Http(status.as_u16())
        }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn register_device(
        &self,
        user_token: &str,
        request: &RegisterDeviceRequest,
    ) -> Result<RegisterDeviceResponse, AuthError> {
        let url = format!("{}/devices/register", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(user_token)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::classify(response.status()));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }

    async fn device_login(&self, request: &DeviceLoginRequest) -> Result<TokenPair, AuthError> {
        let url = format!("{}/auth/device/login", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(Self::classify(response.status()));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        organization_id: &str,
    ) -> Result<TokenPair, AuthError> {
        let url = format!("{}/auth/refresh", self.base_url);
        let body = serde_json::json!({
            "refreshToken": refresh_token,
            "organizationId": organization_id,
        });
        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(Self::classify(response.status()));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }

    async fn revoke_device(&self, device_token: &str, device_id: &str) -> Result<(), AuthError> {
        let url = format!("{}/devices/{}/revoke", self.base_url, device_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(device_token)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::classify(response.status()));
        }

        Ok(())
    }
}

/// Caller-side view of a registration request.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub tenant_id: String,
    pub organization_id: String,
    pub clinic_id: Option<String>,
    pub user_id: String,
    pub device_name: String,
    /// Short-lived user bearer token.
    pub user_token: String,
}

/// Drives the registration protocol and the token lifecycle.
pub struct DeviceRegistrar {
    auth: Arc<dyn AuthApi>,
    vault: Arc<DeviceSecretStore>,
    store: Arc<Mutex<Store>>,
    app_version: String,
}

impl DeviceRegistrar {
    pub fn new(
        auth: Arc<dyn AuthApi>,
        vault: Arc<DeviceSecretStore>,
        store: Arc<Mutex<Store>>,
        app_version: &str,
    ) -> Self {
        DeviceRegistrar {
            auth,
            vault,
            store,
            app_version: app_version.to_string(),
        }
    }

    /// Registers this install as a device and persists identity + secrets.
    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<DeviceIdentity, IdentityError> {
        if request.device_name.trim().is_empty() {
            return Err(IdentityError::EmptyDeviceName);
        }

        let metadata = DeviceMetadata::collect(&request.device_name, &self.app_version);

        let registered = self
            .auth
            .register_device(
                &request.user_token,
                &RegisterDeviceRequest {
                    tenant_id: request.tenant_id.clone(),
                    organization_id: request.organization_id.clone(),
                    clinic_id: request.clinic_id.clone(),
                    user_id: request.user_id.clone(),
                    metadata: metadata.clone(),
                },
            )
            .await?;

        let tokens = self
            .auth
            .device_login(&DeviceLoginRequest {
                device_id: registered.device_id.clone(),
                device_access_token: registered.device_access_token.clone(),
                tenant_id: request.tenant_id.clone(),
                organization_id: request.organization_id.clone(),
                clinic_id: request.clinic_id.clone(),
            })
            .await?;

        let now = now_millis();
        let identity = DeviceIdentity {
            device_id: registered.device_id,
            device_name: request.device_name,
            tenant_id: request.tenant_id,
            organization_id: request.organization_id,
            clinic_id: request.clinic_id,
            user_id: request.user_id,
            hardware_fingerprint: metadata.hardware_fingerprint,
            platform: Platform::current(),
            os_version: metadata.os_version,
            app_version: metadata.app_version,
            registered_at: now,
            last_seen_at: Some(now),
        };

        let secrets = DeviceSecrets {
            device_access_token: tokens.access_token,
            device_refresh_token: Some(tokens.refresh_token),
            encryption_key: SymmetricKey::generate(),
            last_login_at: now,
        };

        self.vault.save(&identity.secret_context(), &secrets)?;
        self.store
            .lock()
            .expect("store mutex poisoned")
            .save_device(&identity)?;

        log::info!(
            "registered device {} for tenant {}",
            identity.device_id,
            identity.tenant_id
        );

        Ok(identity)
    }

    /// Refreshes the device tokens, persisting the rotated pair.
    ///
    /// A refresh failure means the identity needs a fresh login; callers
    /// must suspend outbound sync until the UI drives re-registration.
    pub async fn refresh_tokens(
        &self,
        identity: &DeviceIdentity,
    ) -> Result<DeviceSecrets, IdentityError> {
        let ctx = identity.secret_context();
        let secrets = self.vault.load(&ctx)?.ok_or(IdentityError::NotRegistered)?;

        let Some(refresh_token) = secrets.device_refresh_token.clone() else {
            return Err(IdentityError::NeedsRelogin);
        };

        let tokens = self
            .auth
            .refresh(&refresh_token, &identity.organization_id)
            .await
            .map_err(|e| {
                log::warn!("device token refresh failed: {}", e);
                match e {
                    AuthError::Unauthorized | AuthError::Http(400..=499) => {
                        IdentityError::NeedsRelogin
                    }
                    other => IdentityError::Auth(other),
                }
            })?;

        let rotated = DeviceSecrets {
            device_access_token: tokens.access_token,
            device_refresh_token: Some(tokens.refresh_token),
            encryption_key: secrets.encryption_key.clone(),
            last_login_at: now_millis(),
        };
        self.vault.save(&ctx, &rotated)?;

        Ok(rotated)
    }

    /// Unlinks this device: server-side revoke, then secrets, then the
    /// identity row. Local domain data is NOT wiped (separate policy).
    pub async fn unlink(&self, identity: &DeviceIdentity) -> Result<(), IdentityError> {
        let ctx = identity.secret_context();
        let secrets = self.vault.load(&ctx)?.ok_or(IdentityError::NotRegistered)?;

        self.auth
            .revoke_device(&secrets.device_access_token, &identity.device_id)
            .await?;

        self.vault.clear(&ctx)?;
        self.store
            .lock()
            .expect("store mutex poisoned")
            .delete_device(&identity.device_id)?;

        log::info!("unlinked device {}", identity.device_id);
        Ok(())
    }
}
