// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! PIN Hashing
//!
//! bcrypt hashing for the local session-lock PIN. Verification is
//! constant-time inside bcrypt itself.

use thiserror::Error;

/// bcrypt work factor for PIN hashing.
///
/// PINs are short, so the cost stays at the library default rather than
/// something interactive-login-grade; the lockout policy is the primary
/// brute-force defense.
const PIN_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// PIN hashing error types.
#[derive(Error, Debug)]
pub enum PinError {
    #[error("PIN hashing failed: {0}")]
    HashFailed(String),
    #[error("Stored PIN hash is malformed")]
    MalformedHash,
}

/// Hashes a PIN with bcrypt.
pub fn hash_pin(pin: &str) -> Result<String, PinError> {
    bcrypt::hash(pin, PIN_BCRYPT_COST).map_err(|e| PinError::HashFailed(e.to_string()))
}

/// Verifies a PIN against a stored bcrypt hash.
pub fn verify_pin(pin: &str, hash: &str) -> Result<bool, PinError> {
    bcrypt::verify(pin, hash).map_err(|_| PinError::MalformedHash)
}
