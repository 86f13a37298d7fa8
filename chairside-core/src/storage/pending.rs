// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Pending-change (upload queue) storage operations.

use rusqlite::{params, Connection};
use serde_json::Value;

use super::error::{ChangeOperation, PendingChange};
use super::{StorageError, Store};

impl Store {
    // === Pending Change Operations ===

    /// Inserts a pending change row.
    pub fn insert_pending(&self, change: &PendingChange) -> Result<(), StorageError> {
        insert_pending(&self.conn, change)
    }

    /// Gets the oldest unsynced rows for a tenant, below the retry ceiling,
    /// in `created_at` order.
    pub fn oldest_unsynced(
        &self,
        tenant_id: &str,
        max_retries: u32,
        limit: usize,
    ) -> Result<Vec<PendingChange>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT local_id, tenant_id, organization_id, clinic_id, entity_type, entity_id,
                    operation, data, previous_data, created_at, retry_count, last_error, synced
             FROM pending_changes
             WHERE tenant_id = ?1 AND synced = 0 AND retry_count < ?2
             ORDER BY created_at, rowid LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            params![tenant_id, max_retries as i64, limit as i64],
            row_to_pending,
        )?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)
    }

    /// Gets the unsynced pending rows for an entity within a tenant.
    ///
    /// Used by the downloader's collision check; scoped by the incoming
    /// change's tenant only.
    pub fn pending_for_entity(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<PendingChange>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT local_id, tenant_id, organization_id, clinic_id, entity_type, entity_id,
                    operation, data, previous_data, created_at, retry_count, last_error, synced
             FROM pending_changes
             WHERE tenant_id = ?1 AND synced = 0 AND entity_type = ?2 AND entity_id = ?3
             ORDER BY created_at, rowid",
        )?;

        let rows = stmt.query_map(params![tenant_id, entity_type, entity_id], row_to_pending)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)
    }

    /// Finalizes an uploaded batch in one transaction: deletes the accepted
    /// prefix and bumps retry bookkeeping on the rejected remainder.
    pub fn finalize_batch(
        &mut self,
        accepted_ids: &[String],
        rejected: &[(String, String)],
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;

        for id in accepted_ids {
            tx.execute(
                "DELETE FROM pending_changes WHERE local_id = ?1",
                params![id],
            )?;
        }

        for (id, error) in rejected {
            tx.execute(
                "UPDATE pending_changes
                 SET retry_count = retry_count + 1, last_error = ?1
                 WHERE local_id = ?2",
                params![error, id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Marks a pending row as superseded by a server change (server-wins
    /// collision): its data is overwritten with the server value and the
    /// row leaves the upload queue.
    pub fn resolve_pending_server_wins(
        &self,
        local_id: &str,
        server_data: &Value,
    ) -> Result<bool, StorageError> {
        let data = serde_json::to_string(server_data)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let rows = self.conn.execute(
            "UPDATE pending_changes SET data = ?1, synced = 1 WHERE local_id = ?2",
            params![data, local_id],
        )?;
        Ok(rows > 0)
    }

    /// Increments the retry count of a pending row (client-wins collision).
    pub fn raise_pending_retry(&self, local_id: &str) -> Result<bool, StorageError> {
        let rows = self.conn.execute(
            "UPDATE pending_changes SET retry_count = retry_count + 1 WHERE local_id = ?1",
            params![local_id],
        )?;
        Ok(rows > 0)
    }

    /// Counts unsynced pending rows for a tenant.
    pub fn count_pending(&self, tenant_id: &str) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pending_changes WHERE tenant_id = ?1 AND synced = 0",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Rows at or past the retry ceiling. These are permanent failures:
    /// never retried, surfaced for user intervention, never silently
    /// dropped.
    pub fn permanent_failures(
        &self,
        tenant_id: &str,
        max_retries: u32,
    ) -> Result<Vec<PendingChange>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT local_id, tenant_id, organization_id, clinic_id, entity_type, entity_id,
                    operation, data, previous_data, created_at, retry_count, last_error, synced
             FROM pending_changes
             WHERE tenant_id = ?1 AND synced = 0 AND retry_count >= ?2
             ORDER BY created_at, rowid",
        )?;

        let rows = stmt.query_map(params![tenant_id, max_retries as i64], row_to_pending)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)
    }

    /// Gets a pending row by id.
    pub fn get_pending(&self, local_id: &str) -> Result<Option<PendingChange>, StorageError> {
        let result = self.conn.query_row(
            "SELECT local_id, tenant_id, organization_id, clinic_id, entity_type, entity_id,
                    operation, data, previous_data, created_at, retry_count, last_error, synced
             FROM pending_changes WHERE local_id = ?1",
            params![local_id],
            row_to_pending,
        );

        match result {
            Ok(change) => Ok(Some(change)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::Database(e)),
        }
    }
}

pub(crate) fn insert_pending(
    conn: &Connection,
    change: &PendingChange,
) -> Result<(), StorageError> {
    let data = serde_json::to_string(&change.data)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let previous = change
        .previous_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    conn.execute(
        "INSERT INTO pending_changes
         (local_id, tenant_id, organization_id, clinic_id, entity_type, entity_id,
          operation, data, previous_data, created_at, retry_count, last_error, synced)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            change.local_id,
            change.tenant_id,
            change.organization_id,
            change.clinic_id,
            change.entity_type,
            change.entity_id,
            change.operation.as_str(),
            data,
            previous,
            change.created_at,
            change.retry_count as i64,
            change.last_error,
            change.synced,
        ],
    )?;

    Ok(())
}

fn row_to_pending(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingChange> {
    let operation: String = row.get(6)?;
    let data: String = row.get(7)?;
    let previous: Option<String> = row.get(8)?;

    Ok(PendingChange {
        local_id: row.get(0)?,
        tenant_id: row.get(1)?,
        organization_id: row.get(2)?,
        clinic_id: row.get(3)?,
        entity_type: row.get(4)?,
        entity_id: row.get(5)?,
        operation: ChangeOperation::parse(&operation).unwrap_or(ChangeOperation::Update),
        data: serde_json::from_str(&data).unwrap_or(Value::Null),
        previous_data: previous.and_then(|p| serde_json::from_str(&p).ok()),
        created_at: row.get(9)?,
        retry_count: row.get::<_, i64>(10)? as u32,
        last_error: row.get(11)?,
        synced: row.get(12)?,
    })
}
