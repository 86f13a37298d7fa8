// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Delta Downloader
//!
//! Pulls server changes past the local cursor, detects collisions with
//! pending local changes, writes into the domain tables and advances the
//! cursor — in server-sequence order, atomically per change.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::client::{RemoteChange, SyncApi, SyncError, SyncScope};
use super::entity::EntityKind;
use crate::storage::{ChangeLogEntry, ChangeOperation, Store};

/// Default page size for download requests.
pub const DOWNLOAD_PAGE_LIMIT: usize = 200;

/// How a collision between a remote change and a pending local edit is
/// resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionStrategy {
    /// The server value lands; the pending row is marked resolved with its
    /// data overwritten.
    #[default]
    ServerWins,
    /// The local pending edit stays authoritative; the change is logged and
    /// the cursor advances, but the domain record is untouched. The pending
    /// row's retry count is raised so the next upload re-asserts it.
    ClientWins,
    /// Remote data is deep-merged onto the local pending data before the
    /// domain write.
    Merge,
}

/// Counters for one download cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub applied: usize,
    pub conflicts: usize,
    pub current_sequence: u64,
}

/// Pulls and applies server deltas.
pub struct DeltaDownloader {
    store: Arc<Mutex<Store>>,
    api: Arc<dyn SyncApi>,
    scope: SyncScope,
    strategy: CollisionStrategy,
    page_limit: usize,
}

impl DeltaDownloader {
    pub fn new(store: Arc<Mutex<Store>>, api: Arc<dyn SyncApi>, scope: SyncScope) -> Self {
        DeltaDownloader {
            store,
            api,
            scope,
            strategy: CollisionStrategy::default(),
            page_limit: DOWNLOAD_PAGE_LIMIT,
        }
    }

    pub fn with_strategy(mut self, strategy: CollisionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit;
        self
    }

    /// Downloads changes past the cursor and applies them in order.
    ///
    /// Re-running after a partial failure is idempotent: the cursor never
    /// advanced past unapplied work, and already-applied sequences are
    /// detected and skipped.
    pub async fn download(&self, token: &str) -> Result<DownloadOutcome, SyncError> {
        let since = {
            let store = self.store.lock().expect("store mutex poisoned");
            store.sync_cursor(&self.scope.tenant_id)?.last_synced_sequence
        };

        let response = self
            .api
            .download(token, &self.scope, since, self.page_limit)
            .await?;

        let mut outcome = DownloadOutcome {
            current_sequence: response.current_sequence,
            ..Default::default()
        };

        if response.changes.is_empty() {
            // Nothing past the cursor; only advance if the server moved on
            // without content for us (e.g. other-entity changes filtered).
            if response.current_sequence > since {
                let store = self.store.lock().expect("store mutex poisoned");
                store.advance_cursor(&self.scope.tenant_id, response.current_sequence)?;
            }
            return Ok(outcome);
        }

        let total = response.changes.len();
        for (index, change) in response.changes.iter().enumerate() {
            let is_last = index + 1 == total;
            let cursor_target = if is_last {
                Some(response.current_sequence)
            } else {
                None
            };

            let applied = self.apply_change(change, cursor_target, &mut outcome)?;
            if applied {
                outcome.applied += 1;
            }
        }

        log::debug!(
            "downloaded {} changes for tenant {}, cursor now {}",
            outcome.applied,
            self.scope.tenant_id,
            outcome.current_sequence
        );

        Ok(outcome)
    }

    /// Applies one remote change, handling collisions with pending local
    /// edits for the same entity. Returns false for duplicates.
    fn apply_change(
        &self,
        change: &RemoteChange,
        cursor_target: Option<u64>,
        outcome: &mut DownloadOutcome,
    ) -> Result<bool, SyncError> {
        let mut store = self.store.lock().expect("store mutex poisoned");

        let pending =
            store.pending_for_entity(&self.scope.tenant_id, &change.entity_type, &change.entity_id)?;

        let mut apply_to_domain = true;
        let mut data = change.data.clone();

        if !pending.is_empty() {
            outcome.conflicts += 1;
            match self.strategy {
                CollisionStrategy::ServerWins => {
                    for row in &pending {
                        store.resolve_pending_server_wins(&row.local_id, &change.data)?;
                    }
                }
                CollisionStrategy::ClientWins => {
                    for row in &pending {
                        store.raise_pending_retry(&row.local_id)?;
                    }
                    apply_to_domain = false;
                }
                CollisionStrategy::Merge => {
                    // Deep-merge remote onto the newest local pending data.
                    if let Some(local) = pending.last() {
                        data = merge_remote_onto_local(&local.data, &change.data);
                    }
                }
            }
        }

        let entry = ChangeLogEntry {
            change_id: change.change_id.clone(),
            sequence_number: change.sequence_number,
            tenant_id: self.scope.tenant_id.clone(),
            organization_id: self.scope.organization_id.clone(),
            clinic_id: self.scope.clinic_id.clone(),
            entity_type: change.entity_type.clone(),
            entity_id: change.entity_id.clone(),
            operation: ChangeOperation::parse(&change.operation)
                .unwrap_or(ChangeOperation::Update),
            data,
            previous_data: change.previous_data.clone(),
            version: change.version,
            timestamp: change.timestamp,
            source_device_id: change.source_device_id.clone(),
            synced_at: Some(super::envelope::now_millis()),
        };

        let applied = store.apply_remote_change(&entry, apply_to_domain, cursor_target)?;
        Ok(applied == crate::storage::AppliedChange::Applied)
    }

    /// Entity kinds this downloader materializes.
    pub fn known_kinds() -> &'static [EntityKind] {
        &EntityKind::ALL
    }
}

/// Recursive merge of remote onto local for the merge collision strategy.
/// Plain objects merge key-wise; everything else takes the remote side.
fn merge_remote_onto_local(local: &Value, remote: &Value) -> Value {
    match (local, remote) {
        (Value::Object(l), Value::Object(r)) => {
            let mut merged = l.clone();
            for (k, rv) in r {
                let combined = match l.get(k) {
                    Some(lv) => merge_remote_onto_local(lv, rv),
                    None => rv.clone(),
                };
                merged.insert(k.clone(), combined);
            }
            Value::Object(merged)
        }
        _ => remote.clone(),
    }
}
