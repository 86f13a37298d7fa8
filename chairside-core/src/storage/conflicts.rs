// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Conflict-inbox storage operations.

use rusqlite::{params, Connection};
use serde_json::Value;

use super::error::ConflictRecord;
use super::{StorageError, Store};

impl Store {
    // === Conflict Inbox Operations ===

    /// Files a conflict record.
    pub fn file_conflict(&self, record: &ConflictRecord) -> Result<(), StorageError> {
        insert_conflict(&self.conn, record)
    }

    /// Gets a conflict record by id.
    pub fn get_conflict(&self, id: &str) -> Result<Option<ConflictRecord>, StorageError> {
        let result = self.conn.query_row(
            "SELECT id, tenant_id, resource_type, resource_id, conflicts, local_data,
                    remote_patch, created_at, resolved
             FROM conflicts WHERE id = ?1",
            params![id],
            row_to_conflict,
        );

        match result {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::Database(e)),
        }
    }

    /// Lists unresolved conflicts for a tenant, oldest first.
    pub fn unresolved_conflicts(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<ConflictRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tenant_id, resource_type, resource_id, conflicts, local_data,
                    remote_patch, created_at, resolved
             FROM conflicts WHERE tenant_id = ?1 AND resolved = 0
             ORDER BY created_at",
        )?;

        let rows = stmt.query_map(params![tenant_id], row_to_conflict)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)
    }

    /// Counts unresolved conflicts for a tenant.
    pub fn count_unresolved_conflicts(&self, tenant_id: &str) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conflicts WHERE tenant_id = ?1 AND resolved = 0",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Deletes a conflict record once the user has resolved it.
    pub fn delete_conflict(&self, id: &str) -> Result<bool, StorageError> {
        let rows = self
            .conn
            .execute("DELETE FROM conflicts WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

pub(crate) fn insert_conflict(
    conn: &Connection,
    record: &ConflictRecord,
) -> Result<(), StorageError> {
    let conflicts = serde_json::to_string(&record.conflicts)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let local_data = serde_json::to_string(&record.local_data)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let remote_patch = serde_json::to_string(&record.remote_patch)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    conn.execute(
        "INSERT INTO conflicts
         (id, tenant_id, resource_type, resource_id, conflicts, local_data,
          remote_patch, created_at, resolved)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.id,
            record.tenant_id,
            record.resource_type,
            record.resource_id,
            conflicts,
            local_data,
            remote_patch,
            record.created_at,
            record.resolved,
        ],
    )?;

    Ok(())
}

fn row_to_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConflictRecord> {
    let conflicts: String = row.get(4)?;
    let local_data: String = row.get(5)?;
    let remote_patch: String = row.get(6)?;

    Ok(ConflictRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        resource_type: row.get(2)?,
        resource_id: row.get(3)?,
        conflicts: serde_json::from_str(&conflicts).unwrap_or_default(),
        local_data: serde_json::from_str(&local_data).unwrap_or(Value::Null),
        remote_patch: serde_json::from_str(&remote_patch).unwrap_or(Value::Null),
        created_at: row.get(7)?,
        resolved: row.get(8)?,
    })
}
