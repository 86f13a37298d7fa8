// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Symmetric Encryption (XChaCha20-Poly1305)
//!
//! Authenticated encryption for secrets that have to live on disk outside
//! the OS keychain (file-backed key storage, exported bundles).
//!
//! Ciphertext format: `algorithm_tag (1 byte) || nonce (24 bytes) || ciphertext || tag (16 bytes)`.
//! The leading tag byte leaves room to rotate ciphers without a data
//! migration.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use zeroize::Zeroize;

/// Encryption error types.
#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed: data may be corrupted or wrong key")]
    DecryptionFailed,
    #[error("Ciphertext too short")]
    CiphertextTooShort,
    #[error("Unknown algorithm tag: {0:#04x}")]
    UnknownAlgorithm(u8),
}

const ALG_TAG_XCHACHA20: u8 = 0x02;
const NONCE_LEN: usize = 24;
const POLY1305_TAG_LEN: usize = 16;

/// 256-bit symmetric encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; 32],
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material must never reach debug output
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl SymmetricKey {
    /// Generates a fresh random key.
    pub fn generate() -> Self {
        let rng = SystemRandom::new();
        let bytes = ring::rand::generate::<[u8; 32]>(&rng)
            .expect("System RNG should not fail")
            .expose();
        SymmetricKey { bytes }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SymmetricKey { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// Encrypts data, producing the tagged ciphertext format.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let mut nonce = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce)
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    let sealed = XChaCha20Poly1305::new(key.as_bytes().into())
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(1 + NONCE_LEN + sealed.len());
    out.push(ALG_TAG_XCHACHA20);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypts data produced by [`encrypt`].
pub fn decrypt(key: &SymmetricKey, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let (&tag, body) = ciphertext
        .split_first()
        .ok_or(EncryptionError::CiphertextTooShort)?;

    if tag != ALG_TAG_XCHACHA20 {
        return Err(EncryptionError::UnknownAlgorithm(tag));
    }
    if body.len() < NONCE_LEN + POLY1305_TAG_LEN {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let (nonce, sealed) = body.split_at(NONCE_LEN);
    XChaCha20Poly1305::new(key.as_bytes().into())
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| EncryptionError::DecryptionFailed)
}
