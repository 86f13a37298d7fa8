// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Secure Storage Module
//!
//! Backend abstraction for the credential vault. Production installs use
//! the OS secret service (macOS Keychain, Linux Secret Service, Windows
//! Credential Manager); installs without one fall back to files encrypted
//! with the device key. Tests run on the in-memory backend.
//!
//! `Ok(None)` from `load_key` means not-found, which is a normal state;
//! any `Err` is a backend failure and should be treated as transient.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::crypto::SymmetricKey;
use crate::storage::StorageError;

/// Trait for secure storage of credentials and keys.
pub trait SecureStorage: Send + Sync {
    /// Saves a value under a name, replacing any previous value.
    fn save_key(&self, name: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Loads a value; `None` when no entry exists.
    fn load_key(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Deletes a value. Deleting a missing entry is not an error.
    fn delete_key(&self, name: &str) -> Result<(), StorageError>;

    /// Whether an entry exists.
    fn has_key(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.load_key(name)?.is_some())
    }
}

/// OS secret-service backend via the `keyring` crate.
///
/// Entries are scoped under one service name (e.g. "chairside") so they
/// are distinguishable in the platform's credential UI.
#[cfg(feature = "secure-storage")]
pub struct PlatformKeyring {
    service: String,
}

#[cfg(feature = "secure-storage")]
impl PlatformKeyring {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry, StorageError> {
        keyring::Entry::new(&self.service, name)
            .map_err(|e| StorageError::SecretBackend(format!("Keyring error: {}", e)))
    }
}

#[cfg(feature = "secure-storage")]
impl SecureStorage for PlatformKeyring {
    fn save_key(&self, name: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entry(name)?
            .set_secret(value)
            .map_err(|e| StorageError::SecretBackend(format!("Failed to save to keychain: {}", e)))
    }

    fn load_key(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self.entry(name)?.get_secret() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::SecretBackend(format!(
                "Failed to load from keychain: {}",
                e
            ))),
        }
    }

    fn delete_key(&self, name: &str) -> Result<(), StorageError> {
        match self.entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::SecretBackend(format!(
                "Failed to delete from keychain: {}",
                e
            ))),
        }
    }
}

/// Encrypted-file backend for installs without an OS secret service.
///
/// Each entry is one file under `dir`, encrypted with the device key
/// before it touches the disk.
pub struct FileKeyStorage {
    dir: PathBuf,
    encryption_key: SymmetricKey,
}

impl FileKeyStorage {
    pub fn new(dir: PathBuf, encryption_key: SymmetricKey) -> Self {
        Self {
            dir,
            encryption_key,
        }
    }

    /// Entry names become file names; anything outside [A-Za-z0-9_] is
    /// flattened to '_' so a name can never traverse out of `dir`.
    fn entry_path(&self, name: &str) -> PathBuf {
        let mut file: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        file.push_str(".key");
        self.dir.join(file)
    }
}

impl SecureStorage for FileKeyStorage {
    fn save_key(&self, name: &str, value: &[u8]) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| StorageError::SecretBackend(format!("Failed to create directory: {}", e)))?;

        let sealed = crate::crypto::encrypt(&self.encryption_key, value)
            .map_err(|e| StorageError::Encryption(format!("Encryption failed: {}", e)))?;

        std::fs::write(self.entry_path(name), sealed)
            .map_err(|e| StorageError::SecretBackend(format!("Failed to write key file: {}", e)))
    }

    fn load_key(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.entry_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let sealed = std::fs::read(&path)
            .map_err(|e| StorageError::SecretBackend(format!("Failed to read key file: {}", e)))?;

        crate::crypto::decrypt(&self.encryption_key, &sealed)
            .map(Some)
            .map_err(|e| StorageError::Encryption(format!("Decryption failed: {}", e)))
    }

    fn delete_key(&self, name: &str) -> Result<(), StorageError> {
        let path = self.entry_path(name);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| {
                StorageError::SecretBackend(format!("Failed to delete key file: {}", e))
            })?;
        }
        Ok(())
    }
}

/// In-memory backend for tests.
#[derive(Default)]
pub struct MemoryKeyStorage {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStorage for MemoryKeyStorage {
    fn save_key(&self, name: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries
            .write()
            .expect("entries lock poisoned")
            .insert(name.to_string(), value.to_vec());
        Ok(())
    }

    fn load_key(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .entries
            .read()
            .expect("entries lock poisoned")
            .get(name)
            .cloned())
    }

    fn delete_key(&self, name: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .expect("entries lock poisoned")
            .remove(name);
        Ok(())
    }
}
