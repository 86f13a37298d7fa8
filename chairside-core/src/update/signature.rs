// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Update signature verification
//!
//! RSA-SHA256 (PKCS#1 v1.5) verification of update payloads against the
//! pinned publisher key configured as a PEM. Verification is mandatory:
//! an unverifiable payload is never applied.

use base64::Engine;
use ring::signature::{UnparsedPublicKey, RSA_PKCS1_2048_8192_SHA256};
use thiserror::Error;

/// Errors that can occur during signature handling
#[derive(Debug, Error)]
pub enum SignatureError {
    /// PEM armor is missing or malformed
    #[error("Invalid PEM: {0}")]
    InvalidPem(String),

    /// Key DER could not be parsed
    #[error("Invalid public key encoding")]
    InvalidKey,

    /// The signature does not verify
    #[error("Signature mismatch")]
    Mismatch,
}

/// A pinned RSA publisher key, parsed from PEM once at startup.
pub struct PublisherKey {
    /// PKCS#1 RSAPublicKey DER.
    der: Vec<u8>,
}

impl PublisherKey {
    /// Parses a PEM public key.
    ///
    /// Accepts both `PUBLIC KEY` (SubjectPublicKeyInfo) and
    /// `RSA PUBLIC KEY` (raw PKCS#1) armors.
    pub fn from_pem(pem: &str) -> Result<Self, SignatureError> {
        let (label, body) = read_pem_body(pem)?;
        let der = base64::engine::general_purpose::STANDARD
            .decode(body)
            .map_err(|e| SignatureError::InvalidPem(e.to_string()))?;

        let der = match label.as_str() {
            "RSA PUBLIC KEY" => der,
            "PUBLIC KEY" => unwrap_spki(&der)?,
            other => {
                return Err(SignatureError::InvalidPem(format!(
                    "unsupported PEM label: {}",
                    other
                )))
            }
        };

        Ok(PublisherKey { der })
    }

    /// Verifies an RSA-SHA256 signature over `data`.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
        let key = UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA256, &self.der);
        key.verify(data, signature)
            .map_err(|_| SignatureError::Mismatch)
    }

    /// Verifies a base64-encoded signature (manifest format).
    pub fn verify_base64(&self, data: &[u8], signature_b64: &str) -> Result<(), SignatureError> {
        let signature = base64::engine::general_purpose::STANDARD
            .decode(signature_b64)
            .map_err(|_| SignatureError::Mismatch)?;
        self.verify(data, &signature)
    }
}

/// Strips PEM armor, returning (label, concatenated base64 body).
fn read_pem_body(pem: &str) -> Result<(String, String), SignatureError> {
    let mut label = None;
    let mut body = String::new();
    let mut inside = false;

    for line in pem.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("-----BEGIN ") {
            let name = rest
                .strip_suffix("-----")
                .ok_or_else(|| SignatureError::InvalidPem("malformed BEGIN line".into()))?;
            label = Some(name.to_string());
            inside = true;
        } else if line.starts_with("-----END ") {
            inside = false;
        } else if inside {
            body.push_str(line);
        }
    }

    match label {
        Some(label) if !body.is_empty() => Ok((label, body)),
        _ => Err(SignatureError::InvalidPem("no PEM block found".into())),
    }
}

/// Unwraps a SubjectPublicKeyInfo to the inner PKCS#1 RSAPublicKey DER.
///
/// SPKI layout: SEQUENCE { SEQUENCE { OID, NULL }, BIT STRING { key } }.
fn unwrap_spki(der: &[u8]) -> Result<Vec<u8>, SignatureError> {
    let mut reader = DerReader::new(der);

    // Outer SEQUENCE
    let outer = reader.read_tlv(0x30)?;
    let mut outer_reader = DerReader::new(outer);

    // AlgorithmIdentifier SEQUENCE, skipped
    outer_reader.read_tlv(0x30)?;

    // BIT STRING with a leading unused-bits octet
    let bit_string = outer_reader.read_tlv(0x03)?;
    if bit_string.first() != Some(&0x00) {
        return Err(SignatureError::InvalidKey);
    }

    Ok(bit_string[1..].to_vec())
}

/// Minimal DER TLV reader; just enough to unwrap an SPKI.
struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        DerReader { data, pos: 0 }
    }

    fn read_tlv(&mut self, expected_tag: u8) -> Result<&'a [u8], SignatureError> {
        let tag = *self.data.get(self.pos).ok_or(SignatureError::InvalidKey)?;
        if tag != expected_tag {
            return Err(SignatureError::InvalidKey);
        }
        self.pos += 1;

        let first = *self.data.get(self.pos).ok_or(SignatureError::InvalidKey)?;
        self.pos += 1;

        let length = if first & 0x80 == 0 {
            first as usize
        } else {
            let num_octets = (first & 0x7f) as usize;
            if num_octets == 0 || num_octets > 4 {
                return Err(SignatureError::InvalidKey);
            }
            let mut length = 0usize;
            for _ in 0..num_octets {
                let octet = *self.data.get(self.pos).ok_or(SignatureError::InvalidKey)?;
                self.pos += 1;
                length = (length << 8) | octet as usize;
            }
            length
        };

        let end = self.pos.checked_add(length).ok_or(SignatureError::InvalidKey)?;
        let value = self.data.get(self.pos..end).ok_or(SignatureError::InvalidKey)?;
        self.pos = end;
        Ok(value)
    }
}
