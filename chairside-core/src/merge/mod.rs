// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Merge Engine
//!
//! Given a local record, its CRDT metadata and a remote patch envelope,
//! produces a merged record plus a list of per-field conflicts with an
//! annotated resolution. Non-manual strategies are deterministic: the same
//! inputs always yield the same merged value.

pub mod value;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::sync::envelope::{PatchEnvelope, RecordMeta};
use value::{deep_equal, is_plain_object, shallow_merge};

/// Conflict-resolution strategy tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Higher timestamp wins; ties broken by higher version; then remote.
    LastWriterWins,
    /// Higher version wins; ties broken by higher timestamp; then remote.
    HighestVersionWins,
    /// Shallow-merge plain objects, remote overlaying local; otherwise
    /// falls back to last-writer-wins per field.
    MergeObjects,
    /// Take remote provisionally and defer every contested field to the user.
    Manual,
}

/// Which side a resolved conflict settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    Local,
    Remote,
    Merged,
}

/// A per-field disagreement between local and remote values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConflict {
    pub field: String,
    pub local_value: Option<Value>,
    pub remote_value: Option<Value>,
    pub local_version: u64,
    pub remote_version: u64,
    /// Unix milliseconds.
    pub local_timestamp: i64,
    pub remote_timestamp: i64,
    /// `None` when the conflict awaits manual resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ConflictResolution>,
}

/// Result of merging one envelope into a local record.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub merged: Value,
    pub conflicts: Vec<FieldConflict>,
    pub resolved: bool,
    pub needs_manual_resolution: bool,
    /// Metadata the merged record should carry.
    pub meta: RecordMeta,
}

/// Merge error types.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Local record is not a JSON object")]
    LocalNotObject,
}

/// Field-level merge of local records against remote patch envelopes.
pub struct MergeEngine {
    strategy: MergeStrategy,
}

impl MergeEngine {
    pub fn new(strategy: MergeStrategy) -> Self {
        MergeEngine { strategy }
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Merges a remote patch envelope into the local record.
    ///
    /// Fields enumerated are `keys(local) ∪ keys(patch)`:
    /// - absent locally, present in patch: take remote, not a conflict
    /// - present locally, absent in patch: keep local
    /// - both present, deep-equal: keep either, not a conflict
    /// - both present, unequal: conflict, resolved per strategy
    pub fn merge(
        &self,
        local_data: &Value,
        local_meta: &RecordMeta,
        envelope: &PatchEnvelope,
    ) -> Result<MergeOutcome, MergeError> {
        let local = local_data.as_object().ok_or(MergeError::LocalNotObject)?;
        self.merge_with(local, local_meta, envelope, self.strategy)
    }

    /// Merges with an explicit strategy, overriding the engine default.
    pub fn merge_with_strategy(
        &self,
        local_data: &Value,
        local_meta: &RecordMeta,
        envelope: &PatchEnvelope,
        strategy: MergeStrategy,
    ) -> Result<MergeOutcome, MergeError> {
        let local = local_data.as_object().ok_or(MergeError::LocalNotObject)?;
        self.merge_with(local, local_meta, envelope, strategy)
    }

    /// Folds multiple patches into the local record.
    ///
    /// Patches are applied sorted by `(version ASC, timestamp ASC)`; the
    /// accumulator's metadata advances to each applied patch's metadata
    /// before the next fold step.
    pub fn merge_multiple(
        &self,
        local_data: &Value,
        local_meta: &RecordMeta,
        envelopes: &[PatchEnvelope],
    ) -> Result<MergeOutcome, MergeError> {
        let mut ordered: Vec<&PatchEnvelope> = envelopes.iter().collect();
        ordered.sort_by_key(|e| (e.version, e.timestamp));

        let mut merged = local_data.clone();
        let mut meta = local_meta.clone();
        let mut conflicts = Vec::new();
        let mut needs_manual = false;

        for envelope in ordered {
            let step = self.merge(&merged, &meta, envelope)?;
            merged = step.merged;
            meta = step.meta;
            conflicts.extend(step.conflicts);
            needs_manual |= step.needs_manual_resolution;
        }

        Ok(MergeOutcome {
            merged,
            resolved: !needs_manual,
            needs_manual_resolution: needs_manual,
            conflicts,
            meta,
        })
    }

    fn merge_with(
        &self,
        local: &Map<String, Value>,
        local_meta: &RecordMeta,
        envelope: &PatchEnvelope,
        strategy: MergeStrategy,
    ) -> Result<MergeOutcome, MergeError> {
        let remote = &envelope.patch;
        let remote_meta = envelope.meta();

        let mut merged = local.clone();
        let mut conflicts = Vec::new();
        let mut needs_manual = false;

        for (field, remote_value) in remote {
            match local.get(field) {
                None => {
                    // Absent locally: take remote, not a conflict.
                    merged.insert(field.clone(), remote_value.clone());
                }
                Some(local_value) if deep_equal(local_value, remote_value) => {}
                Some(local_value) => {
                    let (winner, resolution) = match strategy {
                        MergeStrategy::LastWriterWins => {
                            resolve_lww(local_value, remote_value, local_meta, &remote_meta)
                        }
                        MergeStrategy::HighestVersionWins => {
                            resolve_hvw(local_value, remote_value, local_meta, &remote_meta)
                        }
                        MergeStrategy::MergeObjects => {
                            if is_plain_object(local_value) && is_plain_object(remote_value) {
                                let combined = shallow_merge(
                                    local_value.as_object().expect("checked plain object"),
                                    remote_value.as_object().expect("checked plain object"),
                                );
                                (combined, ConflictResolution::Merged)
                            } else {
                                resolve_lww(local_value, remote_value, local_meta, &remote_meta)
                            }
                        }
                        MergeStrategy::Manual => {
                            // Remote is provisional; the decision is the user's.
                            needs_manual = true;
                            (remote_value.clone(), ConflictResolution::Remote)
                        }
                    };

                    conflicts.push(FieldConflict {
                        field: field.clone(),
                        local_value: Some(local_value.clone()),
                        remote_value: Some(remote_value.clone()),
                        local_version: local_meta.version,
                        remote_version: remote_meta.version,
                        local_timestamp: local_meta.updated_at,
                        remote_timestamp: remote_meta.updated_at,
                        resolution: if strategy == MergeStrategy::Manual {
                            None
                        } else {
                            Some(resolution)
                        },
                    });

                    merged.insert(field.clone(), winner);
                }
            }
        }

        let meta = advanced_meta(local_meta, &remote_meta);

        Ok(MergeOutcome {
            merged: Value::Object(merged),
            resolved: !needs_manual,
            needs_manual_resolution: needs_manual,
            conflicts,
            meta,
        })
    }
}

/// Last-writer-wins: higher timestamp, ties by higher version, then remote.
fn resolve_lww(
    local: &Value,
    remote: &Value,
    local_meta: &RecordMeta,
    remote_meta: &RecordMeta,
) -> (Value, ConflictResolution) {
    let local_key = (local_meta.updated_at, local_meta.version);
    let remote_key = (remote_meta.updated_at, remote_meta.version);
    if local_key > remote_key {
        (local.clone(), ConflictResolution::Local)
    } else {
        (remote.clone(), ConflictResolution::Remote)
    }
}

/// Highest-version-wins: higher version, ties by higher timestamp, then remote.
fn resolve_hvw(
    local: &Value,
    remote: &Value,
    local_meta: &RecordMeta,
    remote_meta: &RecordMeta,
) -> (Value, ConflictResolution) {
    let local_key = (local_meta.version, local_meta.updated_at);
    let remote_key = (remote_meta.version, remote_meta.updated_at);
    if local_key > remote_key {
        (local.clone(), ConflictResolution::Local)
    } else {
        (remote.clone(), ConflictResolution::Remote)
    }
}

/// Advances record metadata after absorbing a remote patch.
///
/// The remote metadata is adopted when it is at or ahead of the local
/// (version, timestamp) ordering; otherwise the local metadata stands.
fn advanced_meta(local: &RecordMeta, remote: &RecordMeta) -> RecordMeta {
    if (remote.version, remote.updated_at) >= (local.version, local.updated_at) {
        remote.clone()
    } else {
        local.clone()
    }
}
