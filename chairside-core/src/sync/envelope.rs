// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Patch Envelopes
//!
//! A patch envelope is a single-resource update carrying only the changed
//! fields plus the version/timestamp/actor metadata the merge engine needs.
//! Envelopes arrive over the realtime channel or are synthesized from
//! uploaded changes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// CRDT metadata carried by every domain record.
///
/// These three fields are the authoritative inputs to conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    /// Monotonic per-record version.
    pub version: u64,
    /// Unix milliseconds of the last write.
    pub updated_at: i64,
    /// Actor (device or server) that produced the last write.
    pub actor_id: String,
}

impl RecordMeta {
    /// Metadata for a record that has never been written.
    pub fn initial() -> Self {
        RecordMeta {
            version: 0,
            updated_at: 0,
            actor_id: String::new(),
        }
    }
}

/// A single-resource update delivered via realtime or derived from an
/// uploaded change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchEnvelope {
    pub envelope_id: String,
    /// Dotted entity-type path; the leaf selects the entity kind.
    pub resource_type: String,
    pub resource_id: String,
    pub actor_id: String,
    pub version: u64,
    /// Unix milliseconds.
    pub timestamp: i64,
    /// Changed fields only.
    pub patch: Map<String, Value>,
    pub tenant_id: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinic_id: Option<String>,
}

impl PatchEnvelope {
    /// The envelope's metadata triple, as a [`RecordMeta`].
    pub fn meta(&self) -> RecordMeta {
        RecordMeta {
            version: self.version,
            updated_at: self.timestamp,
            actor_id: self.actor_id.clone(),
        }
    }
}

/// Returns the current Unix timestamp in milliseconds.
/// Falls back to 0 if the system clock is before UNIX_EPOCH.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
