//! Payload integrity verification using SHA-256 checksums
//!
//! Every downloaded update payload is verified against the manifest's
//! checksum before the signature check, the backup, or the apply.
//! Checksums travel as `sha256:<hex>` strings.

use ring::digest;
use thiserror::Error;

/// Errors that can occur during integrity verification
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("Invalid checksum format, expected 'sha256:...'")]
    InvalidFormat,

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data).as_ref())
}

/// Computes the checksum string for a payload.
pub fn compute_checksum(data: &[u8]) -> String {
    format!("sha256:{}", sha256_hex(data))
}

/// Verifies a payload against a manifest checksum.
pub fn verify_checksum(data: &[u8], expected: &str) -> Result<(), IntegrityError> {
    let expected_hex = expected
        .strip_prefix("sha256:")
        .ok_or(IntegrityError::InvalidFormat)?;

    let actual_hex = sha256_hex(data);
    if actual_hex != expected_hex {
        return Err(IntegrityError::ChecksumMismatch {
            expected: expected_hex.to_string(),
            actual: actual_hex,
        });
    }
    Ok(())
}
