// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Upload Queue
//!
//! Batches locally originated changes, posts them, and reconciles
//! server-assigned sequence numbers. The server commits each batch as an
//! ordered prefix: a rejection at position i never lets i+1 land.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use uuid::Uuid;

use super::client::{SyncApi, SyncError, SyncScope, UploadChange, UploadRequest};
use super::entity::EntityKind;
use super::envelope::{now_millis, RecordMeta};
use crate::storage::{ChangeOperation, PendingChange, Store};

/// Maximum rows per upload batch.
pub const MAX_BATCH_SIZE: usize = 50;

/// Retry ceiling; rows at or past it are permanent failures.
pub const MAX_RETRIES: u32 = 5;

/// Counters for one batch cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub uploaded: usize,
    pub failed: usize,
}

/// Batches pending changes and posts them to the sync service.
pub struct UploadQueue {
    store: Arc<Mutex<Store>>,
    api: Arc<dyn SyncApi>,
    scope: SyncScope,
    batch_size: usize,
    max_retries: u32,
    /// Single-flight guard; a second concurrent call is a no-op.
    in_flight: AtomicBool,
}

impl UploadQueue {
    pub fn new(store: Arc<Mutex<Store>>, api: Arc<dyn SyncApi>, scope: SyncScope) -> Self {
        UploadQueue {
            store,
            api,
            scope,
            batch_size: MAX_BATCH_SIZE,
            max_retries: MAX_RETRIES,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_limits(mut self, batch_size: usize, max_retries: u32) -> Self {
        self.batch_size = batch_size;
        self.max_retries = max_retries;
        self
    }

    /// Records a local mutation: domain write plus queue row, atomically.
    pub fn enqueue(
        &self,
        kind: EntityKind,
        entity_id: &str,
        operation: ChangeOperation,
        data: Value,
        previous_data: Option<Value>,
    ) -> Result<(PendingChange, RecordMeta), SyncError> {
        let change = PendingChange {
            local_id: Uuid::new_v4().to_string(),
            tenant_id: self.scope.tenant_id.clone(),
            organization_id: self.scope.organization_id.clone(),
            clinic_id: self.scope.clinic_id.clone(),
            entity_type: kind.leaf_name().to_string(),
            entity_id: entity_id.to_string(),
            operation,
            data,
            previous_data,
            created_at: now_millis(),
            retry_count: 0,
            last_error: None,
            synced: false,
        };

        let meta = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .record_local_change(kind, &change, &self.scope.device_id)?;

        Ok((change, meta))
    }

    /// Uploads one batch of pending changes.
    ///
    /// Single-flight per queue instance: a concurrent call returns
    /// immediately with zero counters. An empty queue also returns zero
    /// counters, without an HTTP call.
    pub async fn process_batch(&self, token: &str) -> Result<BatchOutcome, SyncError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            log::debug!("upload batch already in flight; skipping");
            return Ok(BatchOutcome::default());
        }

        let result = self.process_batch_inner(token).await;
        self.in_flight.store(false, Ordering::Release);
        result
    }

    async fn process_batch_inner(&self, token: &str) -> Result<BatchOutcome, SyncError> {
        let (rows, last_sequence) = {
            let store = self.store.lock().expect("store mutex poisoned");
            let rows =
                store.oldest_unsynced(&self.scope.tenant_id, self.max_retries, self.batch_size)?;
            let cursor = store.sync_cursor(&self.scope.tenant_id)?;
            (rows, cursor.last_synced_sequence)
        };

        if rows.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let request = UploadRequest {
            device_id: self.scope.device_id.clone(),
            tenant_id: self.scope.tenant_id.clone(),
            organization_id: self.scope.organization_id.clone(),
            clinic_id: self.scope.clinic_id.clone(),
            last_sequence,
            changes: rows
                .iter()
                .map(|row| UploadChange {
                    local_id: row.local_id.clone(),
                    entity_type: row.entity_type.clone(),
                    entity_id: row.entity_id.clone(),
                    operation: row.operation.as_str().to_string(),
                    data: row.data.clone(),
                    previous_data: row.previous_data.clone(),
                    created_at: row.created_at,
                })
                .collect(),
            timestamp: now_millis(),
        };

        let response = self.api.upload(token, &request).await?;

        let accepted: Vec<String> = rows
            .iter()
            .take(response.accepted)
            .map(|r| r.local_id.clone())
            .collect();
        let rejected: Vec<(String, String)> = rows
            .iter()
            .skip(response.accepted)
            .map(|r| (r.local_id.clone(), "rejected by server".to_string()))
            .collect();

        {
            let mut store = self.store.lock().expect("store mutex poisoned");
            store.finalize_batch(&accepted, &rejected)?;

            // The server has just sequenced our own writes.
            if response.new_sequence > last_sequence {
                store.advance_cursor(&self.scope.tenant_id, response.new_sequence)?;
            }
        }

        log::debug!(
            "uploaded batch: {} accepted, {} rejected, sequence {}",
            response.accepted,
            response.rejected,
            response.new_sequence
        );

        Ok(BatchOutcome {
            uploaded: accepted.len(),
            failed: rejected.len(),
        })
    }

    /// Unsynced rows count for the active tenant.
    pub fn pending_count(&self) -> Result<usize, SyncError> {
        Ok(self
            .store
            .lock()
            .expect("store mutex poisoned")
            .count_pending(&self.scope.tenant_id)?)
    }

    /// Rows that exhausted their retries and need user intervention.
    pub fn permanent_failures(&self) -> Result<Vec<PendingChange>, SyncError> {
        Ok(self
            .store
            .lock()
            .expect("store mutex poisoned")
            .permanent_failures(&self.scope.tenant_id, self.max_retries)?)
    }
}
