// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device Secret Vault
//!
//! Scoped credential persistence on top of a [`SecureStorage`] backend.
//! Every entry is addressed by a composite `tenant:organization:device:suffix`
//! key so multiple device identities coexist without bleeding into each
//! other. Secret values are never logged.

use std::sync::Arc;

use crate::crypto::SymmetricKey;
use crate::storage::{SecureStorage, StorageError};

const SUFFIX_ACCESS_TOKEN: &str = "access-token";
const SUFFIX_REFRESH_TOKEN: &str = "refresh-token";
const SUFFIX_ENCRYPTION_KEY: &str = "encryption-key";
const SUFFIX_LAST_LOGIN: &str = "last-login";
const SUFFIX_LOCAL_PIN: &str = "local-pin";

/// Addresses the secrets of one device identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretContext {
    pub tenant_id: String,
    pub organization_id: String,
    pub device_id: String,
}

impl SecretContext {
    pub fn new(
        tenant_id: impl Into<String>,
        organization_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        SecretContext {
            tenant_id: tenant_id.into(),
            organization_id: organization_id.into(),
            device_id: device_id.into(),
        }
    }

    fn entry(&self, suffix: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            self.tenant_id, self.organization_id, self.device_id, suffix
        )
    }
}

/// The secrets held for a device identity.
#[derive(Clone)]
pub struct DeviceSecrets {
    pub device_access_token: String,
    pub device_refresh_token: Option<String>,
    pub encryption_key: SymmetricKey,
    /// Unix milliseconds of the last successful login/refresh.
    pub last_login_at: i64,
}

impl std::fmt::Debug for DeviceSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose token material in debug output
        f.debug_struct("DeviceSecrets")
            .field("device_access_token", &"[REDACTED]")
            .field(
                "device_refresh_token",
                &self.device_refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("last_login_at", &self.last_login_at)
            .finish()
    }
}

/// Credential vault for device identities.
pub struct DeviceSecretStore {
    backend: Arc<dyn SecureStorage>,
}

impl DeviceSecretStore {
    pub fn new(backend: Arc<dyn SecureStorage>) -> Self {
        DeviceSecretStore { backend }
    }

    /// Saves the full secret set for a context.
    pub fn save(&self, ctx: &SecretContext, secrets: &DeviceSecrets) -> Result<(), StorageError> {
        self.backend.save_key(
            &ctx.entry(SUFFIX_ACCESS_TOKEN),
            secrets.device_access_token.as_bytes(),
        )?;

        match &secrets.device_refresh_token {
            Some(token) => self
                .backend
                .save_key(&ctx.entry(SUFFIX_REFRESH_TOKEN), token.as_bytes())?,
            None => self.backend.delete_key(&ctx.entry(SUFFIX_REFRESH_TOKEN))?,
        }

        self.backend.save_key(
            &ctx.entry(SUFFIX_ENCRYPTION_KEY),
            secrets.encryption_key.as_bytes(),
        )?;
        self.backend.save_key(
            &ctx.entry(SUFFIX_LAST_LOGIN),
            secrets.last_login_at.to_string().as_bytes(),
        )?;

        Ok(())
    }

    /// Loads the secret set for a context.
    ///
    /// Returns `None` unless the minimum triple (access token, encryption
    /// key, last-login) is present. Partial residue is treated as absent;
    /// callers should [`clear`](Self::clear).
    pub fn load(&self, ctx: &SecretContext) -> Result<Option<DeviceSecrets>, StorageError> {
        let access = self.backend.load_key(&ctx.entry(SUFFIX_ACCESS_TOKEN))?;
        let key = self.backend.load_key(&ctx.entry(SUFFIX_ENCRYPTION_KEY))?;
        let last_login = self.backend.load_key(&ctx.entry(SUFFIX_LAST_LOGIN))?;

        let (Some(access), Some(key), Some(last_login)) = (access, key, last_login) else {
            return Ok(None);
        };

        let key: [u8; 32] = match key.try_into() {
            Ok(k) => k,
            // A malformed key is residue, not a usable secret set.
            Err(_) => return Ok(None),
        };

        let access = match String::from_utf8(access) {
            Ok(s) => s,
            Err(_) => return Ok(None),
        };

        let last_login_at = String::from_utf8(last_login)
            .ok()
            .and_then(|s| s.parse::<i64>().ok());
        let Some(last_login_at) = last_login_at else {
            return Ok(None);
        };

        let refresh = self
            .backend
            .load_key(&ctx.entry(SUFFIX_REFRESH_TOKEN))?
            .and_then(|b| String::from_utf8(b).ok());

        Ok(Some(DeviceSecrets {
            device_access_token: access,
            device_refresh_token: refresh,
            encryption_key: SymmetricKey::from_bytes(key),
            last_login_at,
        }))
    }

    /// Removes every entry for a context, the local PIN included.
    pub fn clear(&self, ctx: &SecretContext) -> Result<(), StorageError> {
        for suffix in [
            SUFFIX_ACCESS_TOKEN,
            SUFFIX_REFRESH_TOKEN,
            SUFFIX_ENCRYPTION_KEY,
            SUFFIX_LAST_LOGIN,
            SUFFIX_LOCAL_PIN,
        ] {
            self.backend.delete_key(&ctx.entry(suffix))?;
        }
        Ok(())
    }

    /// Saves the local PIN hash.
    pub fn save_local_pin(&self, ctx: &SecretContext, pin_hash: &str) -> Result<(), StorageError> {
        self.backend
            .save_key(&ctx.entry(SUFFIX_LOCAL_PIN), pin_hash.as_bytes())
    }

    /// Loads the local PIN hash.
    pub fn load_local_pin(&self, ctx: &SecretContext) -> Result<Option<String>, StorageError> {
        Ok(self
            .backend
            .load_key(&ctx.entry(SUFFIX_LOCAL_PIN))?
            .and_then(|b| String::from_utf8(b).ok()))
    }

    /// Clears the local PIN hash.
    pub fn clear_local_pin(&self, ctx: &SecretContext) -> Result<(), StorageError> {
        self.backend.delete_key(&ctx.entry(SUFFIX_LOCAL_PIN))
    }
}
