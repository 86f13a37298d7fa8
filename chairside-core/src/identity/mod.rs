// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device Identity Module
//!
//! A device identity is the (tenant, organization, device) triple that
//! uniquely identifies this install for a customer, plus the hardware and
//! platform metadata the registration endpoint wants. Secrets never live
//! here; they belong to the vault.

#[cfg(feature = "testing")]
pub mod registration;
#[cfg(not(feature = "testing"))]
mod registration;

#[cfg(feature = "testing")]
pub mod session;
#[cfg(not(feature = "testing"))]
mod session;

#[cfg(feature = "testing")]
pub mod vault;
#[cfg(not(feature = "testing"))]
mod vault;

pub use registration::{
    AuthApi, AuthError, DeviceLoginRequest, DeviceMetadata, DeviceRegistrar, HttpAuthApi,
    RegisterDeviceRequest, RegisterDeviceResponse, RegistrationRequest, TokenPair,
};
pub use session::{LockError, LockPolicy, LockReason, SessionLock};
pub use vault::{DeviceSecretStore, DeviceSecrets, SecretContext};

use ring::digest::{Context, SHA256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StorageError;

/// Identity error types.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Auth service error: {0}")]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("No device identity registered")]
    NotRegistered,

    #[error("Device token refresh failed; re-login required")]
    NeedsRelogin,

    #[error("Device name cannot be empty")]
    EmptyDeviceName,
}

/// Platform tag reported at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "windows" => Some(Platform::Windows),
            "macos" => Some(Platform::MacOs),
            "linux" => Some(Platform::Linux),
            _ => None,
        }
    }
}

/// Non-secret device identity row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Server-assigned device id.
    pub device_id: String,
    pub device_name: String,
    pub tenant_id: String,
    pub organization_id: String,
    pub clinic_id: Option<String>,
    /// Owning user.
    pub user_id: String,
    /// Stable derived hardware id.
    pub hardware_fingerprint: String,
    pub platform: Platform,
    pub os_version: String,
    pub app_version: String,
    /// Unix milliseconds.
    pub registered_at: i64,
    pub last_seen_at: Option<i64>,
}

impl DeviceIdentity {
    /// The vault context addressing this identity's secrets.
    pub fn secret_context(&self) -> SecretContext {
        SecretContext {
            tenant_id: self.tenant_id.clone(),
            organization_id: self.organization_id.clone(),
            device_id: self.device_id.clone(),
        }
    }
}

/// Derives the stable hardware fingerprint for this machine.
///
/// Hash over platform tag, CPU architecture and the machine's parallelism
/// class; stable across restarts on the same hardware.
pub fn hardware_fingerprint() -> String {
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let mut context = Context::new(&SHA256);
    context.update(Platform::current().as_str().as_bytes());
    context.update(std::env::consts::ARCH.as_bytes());
    context.update(&(parallelism as u64).to_le_bytes());
    let digest = context.finish();

    hex::encode(digest.as_ref())
}
